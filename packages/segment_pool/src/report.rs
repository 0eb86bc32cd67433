use std::fmt;

use crate::TokenId;

/// Describes one segment of a [`SegmentPool`][crate::SegmentPool] at the time of a report.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct SegmentInfo {
    /// Position of the segment in the pool. Changes when `trim_excess()` drops segments.
    pub index: usize,

    /// Number of elements the segment buffer holds.
    pub capacity: usize,

    /// The used frontier: elements before it belong to active nodes or fragmented holes.
    pub used: usize,

    /// Whether this is the segment that tail growth currently bump-allocates from.
    pub is_current: bool,
}

impl SegmentInfo {
    /// Whether nothing in the segment is in use.
    #[must_use]
    pub fn is_inactive(&self) -> bool {
        self.used == 0
    }
}

/// Describes one tracked range of a segment: either rented out to a token or a fragmented hole.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct NodeInfo {
    /// The token that owns the range, or `None` for a fragmented hole.
    ///
    /// Compare with [`Token::id()`][crate::Token::id] to find out which token a node belongs to.
    pub token: Option<TokenId>,

    /// Index of the segment containing the range.
    pub segment_index: usize,

    /// Capacity of the segment containing the range.
    pub segment_capacity: usize,

    /// Offset of the first element of the range within its segment.
    pub start: usize,

    /// Number of elements in the range.
    pub length: usize,
}

impl NodeInfo {
    /// Whether the range is rented out to a token.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.token.is_some()
    }
}

/// Describes the unused capacity after the used frontier of a segment.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct FreeTailInfo {
    /// Index of the segment.
    pub segment_index: usize,

    /// Capacity of the segment.
    pub segment_capacity: usize,

    /// Offset at which the free tail starts (the used frontier).
    pub start: usize,

    /// Number of free elements in the tail.
    pub length: usize,
}

/// A read-only snapshot of the internal layout of a [`SegmentPool`][crate::SegmentPool].
///
/// The report exists for tests and operational inspection. Creating one does not change the
/// behavior of the pool.
///
/// All node lists are ordered by segment index, then by offset.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct ReportInfo {
    /// The standing segment length of the pool.
    pub segment_length: usize,

    /// Every segment of the pool, in index order.
    pub segments: Vec<SegmentInfo>,

    /// Ranges rented out to live tokens.
    pub active: Vec<NodeInfo>,

    /// Free ranges that are followed by an active range in the same segment.
    pub fragmented: Vec<NodeInfo>,

    /// Free tail space of segments that have something in use.
    pub free_tails: Vec<FreeTailInfo>,

    /// Segments with nothing in use, waiting to be reactivated or trimmed.
    pub inactive: Vec<SegmentInfo>,
}

impl ReportInfo {
    /// Finds the node rented out to the token with the given id.
    #[must_use]
    pub fn find(&self, token: TokenId) -> Option<&NodeInfo> {
        self.active.iter().find(|node| node.token == Some(token))
    }

    /// Total number of elements in fragmented holes.
    #[must_use]
    pub fn fragmented_len(&self) -> usize {
        self.fragmented.iter().map(|node| node.length).sum()
    }

    /// Total number of elements rented out to live tokens.
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.iter().map(|node| node.length).sum()
    }

    /// Total capacity of all segments.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.segments.iter().map(|segment| segment.capacity).sum()
    }
}

impl fmt::Display for ReportInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "segment pool: segment length {}, {} segments, capacity {}, {} active ({} elements), {} fragmented ({} elements)",
            self.segment_length,
            self.segments.len(),
            self.capacity(),
            self.active.len(),
            self.active_len(),
            self.fragmented.len(),
            self.fragmented_len(),
        )?;

        for segment in &self.segments {
            let marker = if segment.is_current { " (current)" } else { "" };

            if segment.is_inactive() {
                writeln!(
                    f,
                    "  segment {}{marker}: capacity {}, inactive",
                    segment.index, segment.capacity
                )?;
                continue;
            }

            writeln!(
                f,
                "  segment {}{marker}: capacity {}, used {}",
                segment.index, segment.capacity, segment.used
            )?;

            let mut nodes = self
                .active
                .iter()
                .chain(&self.fragmented)
                .filter(|node| node.segment_index == segment.index)
                .collect::<Vec<_>>();
            nodes.sort_by_key(|node| node.start);

            for node in nodes {
                match node.token {
                    Some(token) => writeln!(
                        f,
                        "    [{}..{}) active {token}",
                        node.start,
                        node.start.saturating_add(node.length)
                    )?,
                    None => writeln!(
                        f,
                        "    [{}..{}) hole",
                        node.start,
                        node.start.saturating_add(node.length)
                    )?,
                }
            }

            for tail in self
                .free_tails
                .iter()
                .filter(|tail| tail.segment_index == segment.index)
            {
                writeln!(
                    f,
                    "    [{}..{}) free tail",
                    tail.start,
                    tail.start.saturating_add(tail.length)
                )?;
            }
        }

        Ok(())
    }
}
