use std::fmt;
use std::ops::Range;

use crate::NodeId;

/// One fixed-capacity backing buffer of the pool.
///
/// The prefix `[0, used)` is partitioned by the segment's node list (from `head` to `tail`).
/// The suffix `[used, capacity)` is free tail space that is never represented by a node; renting
/// from it is a bump of `used`.
pub(crate) struct Segment<T> {
    buffer: Box<[T]>,

    /// The used frontier. Everything before it belongs to some node.
    pub(crate) used: usize,

    pub(crate) head: Option<NodeId>,
    pub(crate) tail: Option<NodeId>,
}

impl<T> Segment<T>
where
    T: Copy + Default,
{
    /// Allocates a segment of exactly `capacity` elements, all set to `T::default()`.
    #[must_use]
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![T::default(); capacity].into_boxed_slice(),
            used: 0,
            head: None,
            tail: None,
        }
    }

    #[must_use]
    pub(crate) fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// How many elements can still be bump-allocated from the tail.
    #[must_use]
    pub(crate) fn free_tail(&self) -> usize {
        self.capacity()
            .checked_sub(self.used)
            .expect("used frontier never exceeds capacity")
    }

    /// A segment with nothing in use. It keeps its buffer until the pool trims it.
    #[must_use]
    pub(crate) fn is_inactive(&self) -> bool {
        self.used == 0
    }

    /// Moves the used frontier forward by `length` and returns the range that was exposed.
    ///
    /// # Panics
    ///
    /// Panics if the free tail is smaller than `length`.
    pub(crate) fn bump(&mut self, length: usize) -> Range<usize> {
        assert!(
            length <= self.free_tail(),
            "bump of {length} exceeds free tail of {}",
            self.free_tail()
        );

        let start = self.used;
        self.used = start
            .checked_add(length)
            .expect("guarded by the free tail check above");

        start..self.used
    }

    #[must_use]
    pub(crate) fn slice(&self, range: Range<usize>) -> &[T] {
        self.buffer
            .get(range)
            .expect("node ranges always lie within their segment buffer")
    }

    #[must_use]
    pub(crate) fn slice_mut(&mut self, range: Range<usize>) -> &mut [T] {
        self.buffer
            .get_mut(range)
            .expect("node ranges always lie within their segment buffer")
    }

    /// Overwrites a range with `T::default()`.
    pub(crate) fn clear(&mut self, range: Range<usize>) {
        self.slice_mut(range).fill(T::default());
    }

    /// Copies a range to another position within the same buffer. The ranges may overlap.
    pub(crate) fn copy_within(&mut self, source: Range<usize>, destination: usize) {
        self.buffer.copy_within(source, destination);
    }
}

impl<T> fmt::Debug for Segment<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("capacity", &self.buffer.len())
            .field("used", &self.used)
            .field("head", &self.head)
            .field("tail", &self.tail)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn new_segment_is_default_filled_and_inactive() {
        let segment = Segment::<u32>::new(8);

        assert_eq!(segment.capacity(), 8);
        assert_eq!(segment.free_tail(), 8);
        assert!(segment.is_inactive());
        assert!(segment.slice(0..8).iter().all(|&x| x == 0));
    }

    #[test]
    fn bump_exposes_consecutive_ranges() {
        let mut segment = Segment::<u8>::new(8);

        assert_eq!(segment.bump(3), 0..3);
        assert_eq!(segment.bump(5), 3..8);
        assert_eq!(segment.free_tail(), 0);
        assert!(!segment.is_inactive());
    }

    #[test]
    #[should_panic]
    fn bump_beyond_capacity_panics() {
        let mut segment = Segment::<u8>::new(4);

        _ = segment.bump(5);
    }

    #[test]
    fn clear_and_copy_within() {
        let mut segment = Segment::<u8>::new(8);
        _ = segment.bump(8);

        segment.slice_mut(0..8).copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);

        segment.copy_within(4..8, 1);
        assert_eq!(segment.slice(0..8), &[1, 5, 6, 7, 8, 6, 7, 8]);

        segment.clear(5..8);
        assert_eq!(segment.slice(0..8), &[1, 5, 6, 7, 8, 0, 0, 0]);
    }
}
