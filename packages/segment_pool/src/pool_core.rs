use std::cmp::Ordering;
use std::mem;
use std::ops::Range;

use tracing::{debug, trace};

use crate::{
    Binding, FreeIndex, FreeTailInfo, HandleTable, Node, NodeArena, NodeId, NodeInfo, NodeState,
    ReportInfo, Segment, SegmentInfo, TokenId, normalize_segment_length,
};

/// The allocator state shared by a [`SegmentPool`][crate::SegmentPool] and its tokens.
///
/// Every operation here is synchronous bookkeeping over owned buffers. The public types wrap
/// this in a `RefCell` and take care of borrowing; nothing in here knows about tokens as
/// objects, only about their ids.
pub(crate) struct PoolCore<T> {
    segments: Vec<Segment<T>>,
    nodes: NodeArena,

    /// Free nodes that are not at the tail of their segment.
    holes: FreeIndex,

    handles: HandleTable,

    /// Capacity of ordinary segments. Always normalized.
    segment_length: usize,

    /// The segment that tail growth bump-allocates from. This is the most recently acquired
    /// segment, so growth stays local instead of spreading over every free tail in the pool.
    current: Option<usize>,
}

impl<T> PoolCore<T>
where
    T: Copy + Default,
{
    #[must_use]
    pub(crate) fn new(min_segment_length: usize) -> Self {
        Self {
            segments: Vec::new(),
            nodes: NodeArena::default(),
            holes: FreeIndex::default(),
            handles: HandleTable::default(),
            segment_length: normalize_segment_length(min_segment_length),
            current: None,
        }
    }

    #[must_use]
    pub(crate) fn segment_length(&self) -> usize {
        self.segment_length
    }

    #[must_use]
    pub(crate) fn segment_count(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub(crate) fn capacity(&self) -> usize {
        self.segments.iter().map(Segment::capacity).sum()
    }

    #[must_use]
    pub(crate) fn token_count(&self) -> usize {
        self.handles.len()
    }

    /// Rents `length` elements, reusing a fragmented hole if one is large enough.
    ///
    /// # Panics
    ///
    /// Panics if `length` is zero. Empty requests never reach the core.
    pub(crate) fn rent(&mut self, length: usize) -> TokenId {
        self.rent_core(length, true)
    }

    /// Rents `length` elements from tail space only, never looking at fragmented holes.
    ///
    /// # Panics
    ///
    /// Panics if `length` is zero. Empty requests never reach the core.
    pub(crate) fn greedy_rent(&mut self, length: usize) -> TokenId {
        self.rent_core(length, false)
    }

    fn rent_core(&mut self, length: usize, search_holes: bool) -> TokenId {
        assert!(length > 0, "empty rent requests must be handled by the caller");

        // The node is tagged with its owner before the owner is registered, so we need to know
        // the id in advance.
        let token = self.handles.next_id();
        let node = self.allocate(length, search_holes, token);

        let registered = self.handles.insert(node);
        debug_assert_eq!(registered, token);

        token
    }

    fn allocate(&mut self, length: usize, search_holes: bool, token: TokenId) -> NodeId {
        if search_holes {
            if let Some(node) = self.take_hole(length, token) {
                return node;
            }
        }

        let segment_index = match self.current {
            Some(index) if segment(&self.segments, index).free_tail() >= length => index,
            _ => self.acquire_segment(length),
        };

        self.append_node(segment_index, length, NodeState::Active { token })
    }

    /// Converts the leading part of the first sufficiently large hole into an active node.
    fn take_hole(&mut self, length: usize, token: TokenId) -> Option<NodeId> {
        let (key, hole) = self.holes.first_fit(length)?;
        self.holes.remove(key.segment, key.start);

        let remainder = hole
            .length
            .checked_sub(length)
            .expect("first fit only returns holes that are large enough");

        if remainder > 0 {
            let rest_start = key
                .start
                .checked_add(length)
                .expect("hole lies within its segment, so its parts do too");

            let rest = self.insert_after(hole.node, rest_start, remainder, NodeState::Free);
            self.holes.insert(key.segment, rest_start, rest, remainder);
        }

        let node = self.nodes.get_mut(hole.node);
        node.length = length;
        node.state = NodeState::Active { token };

        Some(hole.node)
    }

    /// Picks the segment that tail growth continues in when the current one is out of room.
    ///
    /// An inactive segment that is large enough is reactivated whole before a new segment is
    /// appended. The chosen segment becomes the current segment.
    fn acquire_segment(&mut self, length: usize) -> usize {
        let reusable = self
            .segments
            .iter()
            .position(|segment| segment.is_inactive() && segment.capacity() >= length);

        let index = if let Some(index) = reusable {
            debug!(segment_index = index, length, "reactivated inactive segment");
            index
        } else {
            let oversized = length > self.segment_length;

            let capacity = if oversized {
                normalize_segment_length(length)
            } else {
                self.segment_length
            };

            assert!(
                capacity >= length,
                "requested length {length} exceeds the largest possible segment"
            );

            self.segments.push(Segment::new(capacity));

            let index = self
                .segments
                .len()
                .checked_sub(1)
                .expect("we just pushed a segment, so len >= 1");

            debug!(segment_index = index, capacity, oversized, "appended segment");
            index
        };

        self.current = Some(index);
        index
    }

    /// Bump-allocates a new last node in a segment.
    fn append_node(&mut self, segment_index: usize, length: usize, state: NodeState) -> NodeId {
        let segment = segment_mut(&mut self.segments, segment_index);

        let range = segment.bump(length);
        let prev = segment.tail;

        let id = self.nodes.insert(Node {
            segment: segment_index,
            start: range.start,
            length,
            state,
            prev,
            next: None,
        });

        match prev {
            Some(prev) => self.nodes.get_mut(prev).next = Some(id),
            None => segment.head = Some(id),
        }

        segment.tail = Some(id);

        id
    }

    /// Links a new node into the list of a segment directly after an existing node.
    fn insert_after(
        &mut self,
        anchor: NodeId,
        start: usize,
        length: usize,
        state: NodeState,
    ) -> NodeId {
        let anchor_node = *self.nodes.get(anchor);

        let id = self.nodes.insert(Node {
            segment: anchor_node.segment,
            start,
            length,
            state,
            prev: Some(anchor),
            next: anchor_node.next,
        });

        self.nodes.get_mut(anchor).next = Some(id);

        match anchor_node.next {
            Some(next) => self.nodes.get_mut(next).prev = Some(id),
            None => segment_mut(&mut self.segments, anchor_node.segment).tail = Some(id),
        }

        id
    }

    /// Removes a node from its segment list and from the arena.
    fn unlink(&mut self, id: NodeId) -> Node {
        let node = self.nodes.remove(id);

        match node.prev {
            Some(prev) => self.nodes.get_mut(prev).next = node.next,
            None => segment_mut(&mut self.segments, node.segment).head = node.next,
        }

        match node.next {
            Some(next) => self.nodes.get_mut(next).prev = node.prev,
            None => segment_mut(&mut self.segments, node.segment).tail = node.prev,
        }

        node
    }

    /// Releases the range of a token. Returns `false` if the id was no longer live.
    pub(crate) fn release(&mut self, token: TokenId) -> bool {
        let Some(binding) = self.handles.remove(token) else {
            return false;
        };

        if binding.clear_on_release {
            self.clear_node(binding.node);
        }

        self.nodes.get_mut(binding.node).state = NodeState::Free;
        self.coalesce(binding.node);

        true
    }

    /// Folds a free node into its free neighbours and then either indexes the result as a
    /// hole or, if it ends at the used frontier, gives it back to the free tail.
    fn coalesce(&mut self, id: NodeId) {
        let mut id = id;

        let following_hole = self
            .nodes
            .get(id)
            .next
            .filter(|&next| self.nodes.get(next).is_free());

        if let Some(next) = following_hole {
            let next_node = *self.nodes.get(next);
            self.holes.remove(next_node.segment, next_node.start);
            self.unlink(next);

            let node = self.nodes.get_mut(id);
            node.length = node
                .length
                .checked_add(next_node.length)
                .expect("adjacent ranges of one segment cannot overflow when merged");
        }

        let preceding_hole = self
            .nodes
            .get(id)
            .prev
            .filter(|&prev| self.nodes.get(prev).is_free());

        if let Some(prev) = preceding_hole {
            let prev_start = self.nodes.get(prev).start;
            let segment_index = self.nodes.get(prev).segment;
            self.holes.remove(segment_index, prev_start);

            let merged = self.unlink(id);

            let node = self.nodes.get_mut(prev);
            node.length = node
                .length
                .checked_add(merged.length)
                .expect("adjacent ranges of one segment cannot overflow when merged");

            id = prev;
        }

        let node = *self.nodes.get(id);

        if node.next.is_some() {
            self.holes.insert(node.segment, node.start, id, node.length);
            return;
        }

        self.unlink(id);

        let segment = segment_mut(&mut self.segments, node.segment);
        debug_assert_eq!(node.end(), segment.used);
        segment.used = node.start;

        if segment.is_inactive() {
            trace!(segment_index = node.segment, "segment became inactive");
        }
    }

    /// Changes the length of the range bound to a token. Does nothing if the id is not live.
    ///
    /// # Panics
    ///
    /// Panics if `new_length` is zero. Callers validate this.
    pub(crate) fn set_length(&mut self, token: TokenId, new_length: usize) {
        assert!(new_length > 0, "zero length must be rejected by the caller");

        let Some(binding) = self.handles.get(token) else {
            return;
        };

        let node = *self.nodes.get(binding.node);

        match new_length.cmp(&node.length) {
            Ordering::Equal => {}
            Ordering::Less => self.shrink(binding, &node, new_length),
            Ordering::Greater => {
                if !self.try_grow_in_place(binding, &node, new_length) {
                    self.relocate(token, binding, &node, new_length);
                }
            }
        }
    }

    fn shrink(&mut self, binding: Binding, node: &Node, new_length: usize) {
        let cut_start = node
            .start
            .checked_add(new_length)
            .expect("shrinking stays within the node");
        let cut_length = node
            .length
            .checked_sub(new_length)
            .expect("caller verified that the node is getting shorter");

        if binding.clear_on_release {
            segment_mut(&mut self.segments, node.segment).clear(cut_start..node.end());
        }

        self.nodes.get_mut(binding.node).length = new_length;

        let freed = self.insert_after(binding.node, cut_start, cut_length, NodeState::Free);
        self.coalesce(freed);
    }

    /// Extends a node over the free space directly after it, if there is enough.
    fn try_grow_in_place(&mut self, binding: Binding, node: &Node, new_length: usize) -> bool {
        let extra = new_length
            .checked_sub(node.length)
            .expect("caller verified that the node is getting longer");

        match node.next {
            None => {
                let segment = segment_mut(&mut self.segments, node.segment);

                if segment.free_tail() < extra {
                    return false;
                }

                segment.bump(extra);
            }
            Some(next) => {
                let next_node = *self.nodes.get(next);

                if !next_node.is_free() || next_node.length < extra {
                    return false;
                }

                self.holes.remove(next_node.segment, next_node.start);

                if next_node.length == extra {
                    self.unlink(next);
                } else {
                    let hole = self.nodes.get_mut(next);
                    hole.start = hole
                        .start
                        .checked_add(extra)
                        .expect("hole lies within its segment, so its parts do too");
                    hole.length = hole
                        .length
                        .checked_sub(extra)
                        .expect("guarded by the hole length check above");

                    let (start, length) = (hole.start, hole.length);
                    self.holes.insert(next_node.segment, start, next, length);
                }
            }
        }

        self.nodes.get_mut(binding.node).length = new_length;

        if binding.clear_on_release {
            let end = node
                .start
                .checked_add(new_length)
                .expect("we just verified the segment has room for the grown node");

            segment_mut(&mut self.segments, node.segment).clear(node.end()..end);
        }

        true
    }

    /// Moves the content of a token to a new, larger range and rebinds the token to it.
    fn relocate(&mut self, token: TokenId, binding: Binding, node: &Node, new_length: usize) {
        let target = self.allocate(new_length, true, token);
        let target_node = *self.nodes.get(target);

        self.copy_range(node.segment, node.range(), target_node.segment, target_node.start);

        if binding.clear_on_release {
            let copied_end = target_node
                .start
                .checked_add(node.length)
                .expect("target is larger than the source, so this is within the target");

            segment_mut(&mut self.segments, target_node.segment)
                .clear(copied_end..target_node.end());
            segment_mut(&mut self.segments, node.segment).clear(node.range());
        }

        self.nodes.get_mut(binding.node).state = NodeState::Free;
        self.coalesce(binding.node);

        let rebound = self.handles.rebind(token, target);
        debug_assert!(rebound, "token was live at the start of the resize");

        trace!(
            token = %token,
            from_segment = node.segment,
            from_start = node.start,
            to_segment = target_node.segment,
            to_start = target_node.start,
            new_length,
            "relocated range to grow it"
        );
    }

    fn copy_range(
        &mut self,
        source_segment: usize,
        source: Range<usize>,
        destination_segment: usize,
        destination_start: usize,
    ) {
        if source_segment == destination_segment {
            segment_mut(&mut self.segments, source_segment).copy_within(source, destination_start);
            return;
        }

        let destination_end = destination_start
            .checked_add(source.len())
            .expect("destination is at least as large as the source");

        let (source_segment, destination_segment) =
            segment_pair(&mut self.segments, source_segment, destination_segment);

        destination_segment
            .slice_mut(destination_start..destination_end)
            .copy_from_slice(source_segment.slice(source));
    }

    fn clear_node(&mut self, id: NodeId) {
        let node = *self.nodes.get(id);
        segment_mut(&mut self.segments, node.segment).clear(node.range());
    }

    /// Updates the clear-on-release flag of a token. Does nothing if the id is not live.
    pub(crate) fn set_clear_on_release(&mut self, token: TokenId, enabled: bool) {
        _ = self.handles.set_clear_on_release(token, enabled);
    }

    #[must_use]
    pub(crate) fn is_clearing(&self, token: TokenId) -> bool {
        self.handles
            .get(token)
            .is_some_and(|binding| binding.clear_on_release)
    }

    #[must_use]
    pub(crate) fn len_of(&self, token: TokenId) -> Option<usize> {
        let binding = self.handles.get(token)?;
        Some(self.nodes.get(binding.node).length)
    }

    #[must_use]
    pub(crate) fn span(&self, token: TokenId) -> Option<&[T]> {
        let binding = self.handles.get(token)?;
        let node = self.nodes.get(binding.node);

        Some(segment(&self.segments, node.segment).slice(node.range()))
    }

    #[must_use]
    pub(crate) fn span_mut(&mut self, token: TokenId) -> Option<&mut [T]> {
        let binding = self.handles.get(token)?;
        let node = *self.nodes.get(binding.node);

        Some(segment_mut(&mut self.segments, node.segment).slice_mut(node.range()))
    }

    #[must_use]
    pub(crate) fn info(&self, token: TokenId) -> Option<NodeInfo> {
        let binding = self.handles.get(token)?;
        Some(self.node_info(self.nodes.get(binding.node)))
    }

    /// Packs every segment's active ranges to the front of the segment, forgets all holes,
    /// moves whole segments' worth of ranges into the free tails of earlier segments and drops
    /// segments that have nothing in use.
    ///
    /// Tokens stay valid because only node records and segment positions change; the handle
    /// table keeps pointing at the same node records.
    pub(crate) fn trim_excess(&mut self) {
        let segments_before = self.segments.len();

        let compacted = (0..self.segments.len())
            .map(|index| self.compact_segment(index))
            .sum::<usize>();

        self.holes.clear();

        let evacuated = (1..self.segments.len())
            .map(|index| self.evacuate_segment(index))
            .sum::<usize>();

        let elements_moved = compacted
            .checked_add(evacuated)
            .expect("cannot move more elements than the pool holds");

        let previous_current = self.current.take();
        let old_segments = mem::take(&mut self.segments);

        for (old_index, segment) in old_segments.into_iter().enumerate() {
            if segment.is_inactive() {
                continue;
            }

            let new_index = self.segments.len();

            if new_index != old_index {
                let mut cursor = segment.head;

                while let Some(id) = cursor {
                    let node = self.nodes.get_mut(id);
                    node.segment = new_index;
                    cursor = node.next;
                }
            }

            if previous_current == Some(old_index) {
                self.current = Some(new_index);
            }

            self.segments.push(segment);
        }

        if self.current.is_none() {
            self.current = self.segments.len().checked_sub(1);
        }

        debug!(
            segments_before,
            segments_after = self.segments.len(),
            elements_moved,
            "trimmed excess capacity"
        );
    }

    /// Moves the active nodes of one segment to the front, in order, and drops its free nodes.
    /// Returns the number of elements that had to be moved.
    fn compact_segment(&mut self, index: usize) -> usize {
        let segment = segment_mut(&mut self.segments, index);

        let old_used = segment.used;
        let mut cursor = segment.head;
        let mut head = None;
        let mut tail: Option<NodeId> = None;
        let mut used = 0_usize;
        let mut moved = 0_usize;
        let mut vacated_needs_clear = false;

        while let Some(id) = cursor {
            let node = *self.nodes.get(id);
            cursor = node.next;

            let Some(token) = node.token() else {
                _ = self.nodes.remove(id);
                continue;
            };

            if node.start != used {
                segment.copy_within(node.range(), used);

                moved = moved
                    .checked_add(node.length)
                    .expect("cannot move more elements than the segment holds");

                vacated_needs_clear |= self
                    .handles
                    .get(token)
                    .is_some_and(|binding| binding.clear_on_release);
            }

            let compacted = self.nodes.get_mut(id);
            compacted.start = used;
            compacted.prev = tail;
            compacted.next = None;

            match tail {
                Some(prev) => self.nodes.get_mut(prev).next = Some(id),
                None => head = Some(id),
            }

            tail = Some(id);
            used = used
                .checked_add(node.length)
                .expect("active ranges of a segment fit in the segment");
        }

        // Moving data leaves a stale copy behind; ranges that ask to be cleared must not leak
        // their content into whatever rents the vacated space next.
        if vacated_needs_clear {
            segment.clear(used..old_used);
        }

        segment.head = head;
        segment.tail = tail;
        segment.used = used;

        moved
    }

    /// Moves every active node of a compacted segment into the free tails of earlier segments
    /// that are in use, keeping their order. Nothing moves unless all of them fit, because a
    /// partly emptied segment could not be dropped anyway. Returns the number of elements moved.
    fn evacuate_segment(&mut self, index: usize) -> usize {
        let source = segment(&self.segments, index);

        if source.is_inactive() {
            return 0;
        }

        // Inactive segments are about to be dropped, so they are not candidates.
        let mut tails = self
            .segments
            .iter()
            .take(index)
            .map(|segment| {
                if segment.is_inactive() {
                    0
                } else {
                    segment.free_tail()
                }
            })
            .collect::<Vec<_>>();

        let mut plan = Vec::new();
        let mut cursor = source.head;

        while let Some(id) = cursor {
            let node = self.nodes.get(id);
            cursor = node.next;

            let Some(destination) = tails.iter().position(|tail| *tail >= node.length) else {
                return 0;
            };

            let tail = tails
                .get_mut(destination)
                .expect("position() returned an index of this vector");
            *tail = tail
                .checked_sub(node.length)
                .expect("guarded by the position() predicate");

            plan.push((id, destination));
        }

        let mut moved = 0_usize;

        for (id, destination) in plan {
            moved = moved
                .checked_add(self.move_to_tail(id, destination))
                .expect("cannot move more elements than the segment holds");
        }

        segment_mut(&mut self.segments, index).used = 0;

        trace!(segment_index = index, moved, "evacuated segment");

        moved
    }

    /// Moves the first node of its segment to the free tail of another segment, reusing the
    /// node record so the handle table stays valid. Returns the number of elements moved.
    fn move_to_tail(&mut self, id: NodeId, destination: usize) -> usize {
        let node = *self.nodes.get(id);

        debug_assert!(node.prev.is_none(), "nodes are evacuated front to back");

        let source = segment_mut(&mut self.segments, node.segment);
        source.head = node.next;

        match node.next {
            Some(next) => self.nodes.get_mut(next).prev = None,
            None => source.tail = None,
        }

        let target = segment_mut(&mut self.segments, destination);
        let range = target.bump(node.length);
        let prev = target.tail;

        match prev {
            Some(prev) => self.nodes.get_mut(prev).next = Some(id),
            None => target.head = Some(id),
        }

        target.tail = Some(id);

        self.copy_range(node.segment, node.range(), destination, range.start);

        let moved = self.nodes.get_mut(id);
        moved.segment = destination;
        moved.start = range.start;
        moved.prev = prev;
        moved.next = None;

        node.length
    }

    /// Drops every segment and forgets every token. Ids handed out before stop resolving.
    pub(crate) fn close(&mut self) {
        if self.segments.is_empty() && self.token_count() == 0 {
            return;
        }

        debug!(
            segments = self.segments.len(),
            tokens = self.token_count(),
            "closing pool with outstanding tokens"
        );

        *self = Self::new(self.segment_length);
    }

    /// Creates a snapshot of the pool layout.
    #[must_use]
    pub(crate) fn report(&self) -> ReportInfo {
        let mut report = ReportInfo {
            segment_length: self.segment_length,
            ..ReportInfo::default()
        };

        for (index, segment) in self.segments.iter().enumerate() {
            let info = SegmentInfo {
                index,
                capacity: segment.capacity(),
                used: segment.used,
                is_current: self.current == Some(index),
            };

            report.segments.push(info);

            if segment.is_inactive() {
                report.inactive.push(info);
                continue;
            }

            let mut cursor = segment.head;

            while let Some(id) = cursor {
                let node = self.nodes.get(id);
                cursor = node.next;

                if node.is_free() {
                    report.fragmented.push(self.node_info(node));
                } else {
                    report.active.push(self.node_info(node));
                }
            }

            if segment.free_tail() > 0 {
                report.free_tails.push(FreeTailInfo {
                    segment_index: index,
                    segment_capacity: segment.capacity(),
                    start: segment.used,
                    length: segment.free_tail(),
                });
            }
        }

        report
    }

    fn node_info(&self, node: &Node) -> NodeInfo {
        NodeInfo {
            token: node.token(),
            segment_index: node.segment,
            segment_capacity: segment(&self.segments, node.segment).capacity(),
            start: node.start,
            length: node.length,
        }
    }

    /// Verifies every structural invariant of the pool. Panics on the first violation.
    #[cfg(test)]
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[allow(
        clippy::arithmetic_side_effects,
        reason = "counters in test logic cannot realistically overflow"
    )]
    pub(crate) fn integrity_check(&self) {
        let mut node_count = 0_usize;
        let mut hole_count = 0_usize;
        let mut active_count = 0_usize;

        for (index, segment) in self.segments.iter().enumerate() {
            assert!(segment.used <= segment.capacity());
            assert!(segment.capacity() >= 4);
            assert!(segment.capacity().is_power_of_two());

            let mut expected_start = 0;
            let mut prev: Option<NodeId> = None;
            let mut prev_free = false;
            let mut cursor = segment.head;

            while let Some(id) = cursor {
                let node = self.nodes.get(id);

                assert_eq!(node.segment, index, "node {id:?} is in the wrong segment");
                assert_eq!(node.start, expected_start, "node {id:?} leaves a gap");
                assert!(node.length > 0, "node {id:?} is empty");
                assert_eq!(node.prev, prev, "node {id:?} has a broken back link");

                match node.state {
                    NodeState::Free => {
                        assert!(!prev_free, "node {id:?} is an uncoalesced free neighbour");
                        assert!(node.next.is_some(), "node {id:?} is a free node at the tail");

                        let (_, hole) = self
                            .holes
                            .iter()
                            .find(|(key, _)| key.segment == index && key.start == node.start)
                            .expect("every free node must be indexed as a hole");
                        assert_eq!(hole.node, id);
                        assert_eq!(hole.length, node.length);

                        hole_count += 1;
                    }
                    NodeState::Active { token } => {
                        let binding = self
                            .handles
                            .get(token)
                            .expect("every active node must be owned by a live token");
                        assert_eq!(binding.node, id);

                        active_count += 1;
                    }
                }

                prev_free = node.is_free();
                expected_start = node.end();
                prev = Some(id);
                node_count += 1;
                cursor = node.next;
            }

            assert_eq!(segment.tail, prev, "segment {index} has a broken tail link");
            assert_eq!(expected_start, segment.used, "segment {index} frontier mismatch");
        }

        assert_eq!(node_count, self.nodes.len(), "node arena holds unlinked nodes");
        assert_eq!(hole_count, self.holes.len(), "free index holds stale holes");
        assert_eq!(active_count, self.handles.len(), "handle table holds stale tokens");

        for (token, binding) in self.handles.iter() {
            assert_eq!(self.nodes.get(binding.node).token(), Some(token));
        }

        if let Some(current) = self.current {
            assert!(current < self.segments.len(), "current segment does not exist");
        }
    }
}

impl<T> std::fmt::Debug for PoolCore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolCore")
            .field(
                "item_type",
                &std::format_args!("{}", std::any::type_name::<T>()),
            )
            .field("segment_length", &self.segment_length)
            .field("segments", &self.segments)
            .field("current", &self.current)
            .field("tokens", &self.handles.len())
            .field("holes", &self.holes.len())
            .finish_non_exhaustive()
    }
}

fn segment<T>(segments: &[Segment<T>], index: usize) -> &Segment<T> {
    segments
        .get(index)
        .expect("nodes only refer to segments that exist")
}

fn segment_mut<T>(segments: &mut [Segment<T>], index: usize) -> &mut Segment<T> {
    segments
        .get_mut(index)
        .expect("nodes only refer to segments that exist")
}

/// Borrows two different segments at once, the first shared and the second exclusive.
fn segment_pair<T>(
    segments: &mut [Segment<T>],
    first: usize,
    second: usize,
) -> (&Segment<T>, &mut Segment<T>) {
    assert_ne!(first, second, "segment pair must consist of two segments");

    if first < second {
        let (left, right) = segments.split_at_mut(second);

        (
            left.get(first).expect("first < second, so it is in the left half"),
            right.first_mut().expect("right half starts at second"),
        )
    } else {
        let (left, right) = segments.split_at_mut(first);

        (
            right.first().expect("right half starts at first"),
            left.get_mut(second).expect("second < first, so it is in the left half"),
        )
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    #![allow(
        clippy::indexing_slicing,
        clippy::arithmetic_side_effects,
        reason = "we do not need to worry about these things when writing test code"
    )]

    use super::*;

    #[test]
    fn release_is_idempotent() {
        let mut core = PoolCore::<u8>::new(16);

        let a = core.rent(4);
        let _b = core.rent(4);

        assert!(core.release(a));
        assert!(!core.release(a));
        core.integrity_check();
    }

    #[test]
    fn operations_on_dead_id_do_nothing() {
        let mut core = PoolCore::<u8>::new(16);

        let a = core.rent(4);
        assert!(core.release(a));

        core.set_length(a, 8);
        core.set_clear_on_release(a, true);

        assert!(!core.is_clearing(a));
        assert!(core.len_of(a).is_none());
        assert!(core.span(a).is_none());
        assert!(core.span_mut(a).is_none());
        assert!(core.info(a).is_none());
        core.integrity_check();
    }

    #[test]
    fn trim_keeps_current_segment_current() {
        let mut core = PoolCore::<u8>::new(8);

        let a = core.rent(8);
        let _b = core.rent(4);
        assert_eq!(core.current, Some(1));

        assert!(core.release(a));
        core.trim_excess();
        core.integrity_check();

        assert_eq!(core.segment_count(), 1);
        assert_eq!(core.current, Some(0));

        // The retained segment still has 4 elements of tail left.
        let c = core.rent(4);
        assert_eq!(core.info(c).unwrap().segment_index, 0);
        assert_eq!(core.segment_count(), 1);
    }

    #[test]
    fn trim_of_empty_core_clears_current() {
        let mut core = PoolCore::<u8>::new(8);

        let a = core.rent(8);
        assert!(core.release(a));

        core.trim_excess();

        assert_eq!(core.segment_count(), 0);
        assert!(core.current.is_none());
        core.integrity_check();
    }

    #[test]
    fn trim_collapses_sparse_segments_into_one() {
        let mut core = PoolCore::<u8>::new(8);

        let ids = [core.rent(8), core.rent(8), core.rent(8)];
        assert_eq!(core.segment_count(), 3);

        for (value, id) in (1_u8..).zip(ids) {
            core.set_length(id, 1);
            core.span_mut(id).unwrap()[0] = value;
        }

        core.trim_excess();
        core.integrity_check();

        assert_eq!(core.segment_count(), 1);
        assert_eq!(core.capacity(), 8);
        assert_eq!(core.current, Some(0));

        for (value, id) in (1_u8..).zip(ids) {
            let info = core.info(id).unwrap();
            assert_eq!(info.segment_index, 0);
            assert_eq!(usize::from(value - 1), info.start);
            assert_eq!(core.span(id).unwrap(), &[value]);
        }
    }

    #[test]
    fn trim_leaves_segment_in_place_if_its_ranges_do_not_all_fit() {
        let mut core = PoolCore::<u8>::new(8);

        let a = core.rent(8);
        let b = core.rent(8);
        let c = core.rent(8);

        core.set_length(a, 5);
        core.set_length(b, 2);

        // Three elements are free in the first segment, the last segment needs all eight.
        core.trim_excess();
        core.integrity_check();

        assert_eq!(core.segment_count(), 2);
        assert_eq!(core.info(a).unwrap().segment_index, 0);
        assert_eq!(core.info(b).unwrap().segment_index, 0);
        assert_eq!(core.info(b).unwrap().start, 5);
        assert_eq!(core.info(c).unwrap().segment_index, 1);
        assert_eq!(core.info(c).unwrap().start, 0);
    }

    #[test]
    fn close_forgets_tokens_and_segments() {
        let mut core = PoolCore::<u8>::new(8);

        let a = core.rent(4);
        let _b = core.rent(16);

        core.close();
        core.integrity_check();

        assert_eq!(core.segment_count(), 0);
        assert_eq!(core.token_count(), 0);
        assert_eq!(core.segment_length(), 8);
        assert!(core.info(a).is_none());
        assert!(!core.release(a));
    }

    #[test]
    fn oversized_request_gets_normalized_segment() {
        let mut core = PoolCore::<u8>::new(8);

        let a = core.rent(100);
        let info = core.info(a).unwrap();

        assert_eq!(info.segment_capacity, 128);
        assert_eq!(core.capacity(), 128);
        core.integrity_check();
    }

    #[test]
    fn debug_output_names_item_type() {
        let core = PoolCore::<u16>::new(8);

        let text = format!("{core:?}");
        assert!(text.contains("u16"));
        assert!(text.contains("segment_length: 8"));
    }
}
