use std::ops::Range;

use crate::TokenId;

/// Index of a node record in the [`NodeArena`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) struct NodeId(u32);

impl NodeId {
    #[cfg(test)]
    #[must_use]
    pub(crate) fn from_index(index: u32) -> Self {
        Self(index)
    }

    #[must_use]
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum NodeState {
    /// The range is rented out to the token with this id.
    Active { token: TokenId },

    Free,
}

/// A tracked range `[start, start + length)` of one segment.
///
/// Nodes of a segment form a doubly linked list in start order that partitions the used prefix
/// of the segment. The links are arena indexes, so merging neighbours is O(1).
#[derive(Clone, Copy, Debug)]
pub(crate) struct Node {
    pub(crate) segment: usize,
    pub(crate) start: usize,
    pub(crate) length: usize,
    pub(crate) state: NodeState,
    pub(crate) prev: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
}

impl Node {
    #[must_use]
    pub(crate) fn is_free(&self) -> bool {
        self.state == NodeState::Free
    }

    /// One past the last element of the range.
    #[must_use]
    pub(crate) fn end(&self) -> usize {
        self.start
            .checked_add(self.length)
            .expect("node ranges lie within a segment buffer, so they cannot overflow")
    }

    #[must_use]
    pub(crate) fn range(&self) -> Range<usize> {
        self.start..self.end()
    }

    #[must_use]
    pub(crate) fn token(&self) -> Option<TokenId> {
        match self.state {
            NodeState::Active { token } => Some(token),
            NodeState::Free => None,
        }
    }
}

#[derive(Debug)]
enum Entry {
    Occupied(Node),

    Vacant { next_free_index: Option<u32> },
}

/// Storage for node records of all segments of a pool.
///
/// Removed records leave a vacancy that is reused by the next insert, threaded into an
/// intrusive free list the same way the handle table tracks its vacant slots.
#[derive(Debug, Default)]
pub(crate) struct NodeArena {
    entries: Vec<Entry>,
    next_free_index: Option<u32>,
    count: usize,
}

impl NodeArena {
    #[must_use]
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.count
    }

    pub(crate) fn insert(&mut self, node: Node) -> NodeId {
        let id = if let Some(index) = self.next_free_index {
            let entry = self
                .entries
                .get_mut(index as usize)
                .expect("vacant list only refers to existing entries");

            let Entry::Vacant { next_free_index } = *entry else {
                panic!("entry at head of vacant list must be vacant");
            };

            *entry = Entry::Occupied(node);
            self.next_free_index = next_free_index;

            NodeId(index)
        } else {
            let index = u32::try_from(self.entries.len())
                .expect("more than u32::MAX nodes is not a supported scenario");

            self.entries.push(Entry::Occupied(node));

            NodeId(index)
        };

        self.count = self
            .count
            .checked_add(1)
            .expect("node count is bounded by the u32 index space");

        id
    }

    /// # Panics
    ///
    /// Panics if the id does not refer to a live node.
    #[must_use]
    pub(crate) fn get(&self, id: NodeId) -> &Node {
        match self.entries.get(id.index()) {
            Some(Entry::Occupied(node)) => node,
            _ => panic!("node {id:?} is not live - node links are out of sync"),
        }
    }

    /// # Panics
    ///
    /// Panics if the id does not refer to a live node.
    #[must_use]
    pub(crate) fn get_mut(&mut self, id: NodeId) -> &mut Node {
        match self.entries.get_mut(id.index()) {
            Some(Entry::Occupied(node)) => node,
            _ => panic!("node {id:?} is not live - node links are out of sync"),
        }
    }

    /// Removes a node record, returning its last contents. Links of neighbours are not touched;
    /// unlinking is the caller's job.
    ///
    /// # Panics
    ///
    /// Panics if the id does not refer to a live node.
    pub(crate) fn remove(&mut self, id: NodeId) -> Node {
        let next_free_index = self.next_free_index;

        let entry = self
            .entries
            .get_mut(id.index())
            .expect("removed node must exist in the arena");

        let Entry::Occupied(node) = *entry else {
            panic!("node {id:?} is not live - node links are out of sync");
        };

        *entry = Entry::Vacant { next_free_index };
        self.next_free_index = Some(id.0);
        self.count = self
            .count
            .checked_sub(1)
            .expect("we just removed a live node, so the count is at least 1");

        node
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn free_node(start: usize, length: usize) -> Node {
        Node {
            segment: 0,
            start,
            length,
            state: NodeState::Free,
            prev: None,
            next: None,
        }
    }

    #[test]
    fn insert_get_remove() {
        let mut arena = NodeArena::default();

        let a = arena.insert(free_node(0, 4));
        let b = arena.insert(free_node(4, 8));

        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a).length, 4);
        assert_eq!(arena.get(b).end(), 12);

        arena.get_mut(a).length = 3;
        assert_eq!(arena.get(a).length, 3);

        let removed = arena.remove(a);
        assert_eq!(removed.length, 3);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn vacancies_are_reused() {
        let mut arena = NodeArena::default();

        let a = arena.insert(free_node(0, 1));
        _ = arena.insert(free_node(1, 1));

        _ = arena.remove(a);
        let c = arena.insert(free_node(2, 1));

        assert_eq!(a, c);
    }

    #[test]
    #[should_panic]
    fn get_removed_panics() {
        let mut arena = NodeArena::default();

        let a = arena.insert(free_node(0, 1));
        _ = arena.remove(a);

        _ = arena.get(a);
    }

    #[test]
    #[should_panic]
    fn double_remove_panics() {
        let mut arena = NodeArena::default();

        let a = arena.insert(free_node(0, 1));
        _ = arena.remove(a);
        _ = arena.remove(a);
    }
}
