use std::collections::BTreeMap;

use crate::NodeId;

/// Position of a fragmented hole. Ordering is by segment first, then by offset, which is the
/// order in which rent requests search the holes.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub(crate) struct HoleKey {
    pub(crate) segment: usize,
    pub(crate) start: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Hole {
    pub(crate) node: NodeId,
    pub(crate) length: usize,
}

/// Pool-wide index of free nodes that are not at the tail of their segment.
///
/// Free space at the tail of a segment is not a hole - it is reclaimed by retracting the used
/// frontier of the segment and is never listed here.
#[derive(Debug, Default)]
pub(crate) struct FreeIndex {
    holes: BTreeMap<HoleKey, Hole>,
}

impl FreeIndex {
    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.holes.len()
    }

    pub(crate) fn insert(&mut self, segment: usize, start: usize, node: NodeId, length: usize) {
        let previous = self
            .holes
            .insert(HoleKey { segment, start }, Hole { node, length });

        debug_assert!(
            previous.is_none(),
            "two holes cannot start at the same position"
        );
    }

    pub(crate) fn remove(&mut self, segment: usize, start: usize) {
        let removed = self.holes.remove(&HoleKey { segment, start });

        debug_assert!(removed.is_some(), "removed hole must be indexed");
    }

    /// The first hole, in (segment, offset) order, that can hold `length` elements.
    ///
    /// This walks the holes in order, so it takes time linear in the number of holes.
    /// Greedy rents never call it.
    #[must_use]
    pub(crate) fn first_fit(&self, length: usize) -> Option<(HoleKey, Hole)> {
        self.holes
            .iter()
            .find(|(_, hole)| hole.length >= length)
            .map(|(key, hole)| (*key, *hole))
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = (HoleKey, Hole)> + '_ {
        self.holes.iter().map(|(key, hole)| (*key, *hole))
    }

    pub(crate) fn clear(&mut self) {
        self.holes.clear();
    }
}
