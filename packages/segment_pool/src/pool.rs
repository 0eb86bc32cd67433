use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::mem;
use std::rc::Rc;

use crate::{NodeInfo, PoolCore, ReportInfo, SegmentPoolBuilder, Token, TokenId};

/// The segment length used by [`SegmentPool::default()`] and by a builder that is not told
/// otherwise.
pub const DEFAULT_MIN_SEGMENT_LENGTH: usize = 1024;

/// A pool that rents out resizable contiguous ranges of `T` carved out of a few large segments.
///
/// Ranges are handed out as [`Token`]s. A token gives access to its range through borrow
/// guards, can be resized and gives its range back to the pool when disposed or dropped.
/// Released ranges are coalesced with free neighbours and reused by later rents.
///
/// There are two ways to rent a range:
///
/// * [`rent()`][1] - first-fit over the holes left behind by released ranges, falling back to
///   growing the tail of the current segment or acquiring another segment.
/// * [`greedy_rent()`][2] - skips the search for holes and always allocates from tail space.
///   Use this when allocation latency matters more than memory utilization.
///
/// # Resource usage
///
/// The pool grows by adding segments as needed. Segments are sized to the normalized segment
/// length given at construction; a single request larger than that gets a dedicated segment
/// sized for it. Call [`trim_excess()`][3] to compact live ranges and release segments that end
/// up empty. Compaction moves data but tokens stay valid, because tokens refer to their range
/// indirectly.
///
/// # Element values
///
/// The pool does not construct or drop elements. Fresh segments are filled with `T::default()`;
/// reused ranges contain whatever was last written there, unless the previous owner enabled
/// [clearing][4].
///
/// # Dropping the pool
///
/// The pool owns every segment. Dropping it frees them even if tokens are still outstanding;
/// those tokens and their views then behave as if they had been disposed.
///
/// # Thread safety
///
/// The pool and its tokens are single-threaded.
///
/// # Example
///
/// ```rust
/// use segment_pool::SegmentPool;
///
/// let mut pool = SegmentPool::<u8>::new(16);
///
/// let mut token = pool.rent(4);
/// token.as_span_mut().copy_from_slice(b"abcd");
///
/// token.set_length(8).unwrap();
/// assert_eq!(&token.as_span()[..4], b"abcd");
///
/// token.dispose();
/// assert_eq!(pool.token_count(), 0);
/// ```
///
/// [1]: Self::rent
/// [2]: Self::greedy_rent
/// [3]: Self::trim_excess
/// [4]: Token::enable_clearing
pub struct SegmentPool<T>
where
    T: Copy + Default,
{
    shared: Rc<PoolShared<T>>,
}

impl<T> SegmentPool<T>
where
    T: Copy + Default,
{
    /// Creates a pool whose segments hold at least `min_segment_length` elements.
    ///
    /// The length is normalized to the smallest power of two that is at least
    /// `max(min_segment_length, 4)`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use segment_pool::SegmentPool;
    ///
    /// let pool = SegmentPool::<u32>::new(100);
    /// assert_eq!(pool.segment_length(), 128);
    /// assert_eq!(pool.segment_count(), 0);
    /// ```
    #[must_use]
    pub fn new(min_segment_length: usize) -> Self {
        Self::builder().min_segment_length(min_segment_length).build()
    }

    /// Starts building a new [`SegmentPool`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use segment_pool::SegmentPool;
    ///
    /// let pool = SegmentPool::<u8>::builder().min_segment_length(4096).build();
    /// assert_eq!(pool.segment_length(), 4096);
    /// ```
    pub fn builder() -> SegmentPoolBuilder<T> {
        SegmentPoolBuilder::new()
    }

    #[must_use]
    pub(crate) fn new_inner(min_segment_length: usize) -> Self {
        Self {
            shared: Rc::new(PoolShared {
                core: RefCell::new(PoolCore::new(min_segment_length)),
                deferred: RefCell::new(Vec::new()),
                closed: Cell::new(false),
            }),
        }
    }

    /// Rents a range of exactly `length` elements.
    ///
    /// A request for zero elements returns an empty token that is not attached to the pool.
    ///
    /// The first fragmented hole (lowest segment, then lowest offset) that is large enough is
    /// reused; the content of a reused range is whatever was last written there. Otherwise the
    /// range is bump-allocated from tail space, which reads as `T::default()` if it has never
    /// been written to.
    ///
    /// The search for a hole takes time linear in the number of holes, so a heavily fragmented
    /// pool makes this slower. [`greedy_rent()`][1] skips the search and [`trim_excess()`][2]
    /// removes the holes.
    ///
    /// # Example
    ///
    /// ```rust
    /// use segment_pool::SegmentPool;
    ///
    /// let mut pool = SegmentPool::<u16>::new(16);
    ///
    /// let token = pool.rent(5);
    /// assert_eq!(token.len(), 5);
    /// assert_eq!(&*token.as_span(), &[0; 5]);
    ///
    /// let empty = pool.rent(0);
    /// assert!(empty.id().is_none());
    /// assert_eq!(empty.len(), 0);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if a span of any token of this pool is borrowed at the time of the call.
    ///
    /// [1]: Self::greedy_rent
    /// [2]: Self::trim_excess
    #[must_use]
    pub fn rent(&mut self, length: usize) -> Token<T> {
        if length == 0 {
            return Token::default();
        }

        let id = self.shared.core_mut().rent(length);
        Token::new(Rc::clone(&self.shared), id)
    }

    /// Rents a range of exactly `length` elements without looking for fragmented holes.
    ///
    /// This is the constant-time path: the range always comes from the tail of the current
    /// segment or from another segment, however many holes the pool has. Existing holes stay
    /// available to later [`rent()`][1] calls.
    ///
    /// # Example
    ///
    /// ```rust
    /// use segment_pool::SegmentPool;
    ///
    /// let mut pool = SegmentPool::<u8>::new(16);
    ///
    /// let first = pool.rent(8);
    /// let _second = pool.rent(8);
    /// drop(first);
    ///
    /// // The hole left by `first` is skipped.
    /// let greedy = pool.greedy_rent(4);
    /// assert_eq!(greedy.try_get_info().unwrap().segment_index, 1);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if a span of any token of this pool is borrowed at the time of the call.
    ///
    /// [1]: Self::rent
    #[must_use]
    pub fn greedy_rent(&mut self, length: usize) -> Token<T> {
        if length == 0 {
            return Token::default();
        }

        let id = self.shared.core_mut().greedy_rent(length);
        Token::new(Rc::clone(&self.shared), id)
    }

    /// Compacts live ranges and releases unused capacity.
    ///
    /// Active ranges are packed to the start of their segment in their existing order and holes
    /// disappear. When all active ranges of a segment fit into the free tails of earlier
    /// segments, they are moved there, so sparsely used segments collapse into fewer ones.
    /// Segments with nothing in use are then dropped. Outstanding tokens keep working and see
    /// their content at its new location.
    ///
    /// # Example
    ///
    /// ```rust
    /// use segment_pool::SegmentPool;
    ///
    /// let mut pool = SegmentPool::<u8>::new(16);
    ///
    /// let first = pool.rent(8);
    /// let mut second = pool.rent(8);
    /// second.as_span_mut().fill(7);
    /// drop(first);
    ///
    /// pool.trim_excess();
    ///
    /// assert_eq!(second.try_get_info().unwrap().start, 0);
    /// assert_eq!(&*second.as_span(), &[7; 8]);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if a span of any token of this pool is borrowed at the time of the call.
    pub fn trim_excess(&mut self) {
        self.shared.core_mut().trim_excess();
    }

    /// Creates a snapshot of the internal layout of the pool.
    ///
    /// # Example
    ///
    /// ```rust
    /// use segment_pool::SegmentPool;
    ///
    /// let mut pool = SegmentPool::<u8>::new(16);
    /// let token = pool.rent(3);
    ///
    /// let report = pool.report();
    /// assert_eq!(report.segments.len(), 1);
    /// assert_eq!(report.active.len(), 1);
    /// assert_eq!(report.free_tails[0].length, 13);
    /// assert!(report.find(token.id().unwrap()).is_some());
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if a mutable span of any token of this pool is borrowed at the time of the call.
    #[must_use]
    pub fn report(&self) -> ReportInfo {
        self.shared.report()
    }

    /// The normalized capacity of ordinary segments.
    #[must_use]
    pub fn segment_length(&self) -> usize {
        self.shared.core().segment_length()
    }

    /// The number of segments the pool currently holds, including inactive ones.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.shared.core().segment_count()
    }

    /// The total number of elements across all segments.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.core().capacity()
    }

    /// The number of tokens that currently have a range rented from this pool.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.shared.token_count()
    }

    /// Whether no token currently has a range rented from this pool.
    ///
    /// An empty pool may still be holding segments. Use [`trim_excess()`][1] to release them.
    ///
    /// [1]: Self::trim_excess
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.token_count() == 0
    }

    #[cfg(test)]
    pub(crate) fn integrity_check(&self) {
        self.shared.core().integrity_check();
    }
}

impl<T> Default for SegmentPool<T>
where
    T: Copy + Default,
{
    /// Creates a pool with [`DEFAULT_MIN_SEGMENT_LENGTH`].
    fn default() -> Self {
        Self::builder().build()
    }
}

impl<T> Drop for SegmentPool<T>
where
    T: Copy + Default,
{
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl<T> fmt::Debug for SegmentPool<T>
where
    T: Copy + Default,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentPool")
            .field("shared", &self.shared)
            .finish()
    }
}

/// The state shared between a pool and its tokens.
///
/// Releases that arrive while the core is borrowed (a token dropped while another token's span
/// is held) are queued in `deferred` and applied before the next operation that borrows the
/// core, so dropping a token never panics. A queued id no longer resolves even though its node
/// is still in the core.
///
/// The pool closes the shared state when it is dropped. Tokens keep the allocation of this
/// struct alive but not the segments: the core is emptied as soon as it can be borrowed.
pub(crate) struct PoolShared<T> {
    core: RefCell<PoolCore<T>>,
    deferred: RefCell<Vec<TokenId>>,
    closed: Cell<bool>,
}

impl<T> PoolShared<T>
where
    T: Copy + Default,
{
    /// Borrows the core exclusively, applying queued releases first.
    ///
    /// # Panics
    ///
    /// Panics if the core is already borrowed.
    pub(crate) fn core_mut(&self) -> RefMut<'_, PoolCore<T>> {
        let mut core = self.core.borrow_mut();
        self.settle(&mut core);
        core
    }

    /// Borrows the core for reading, applying queued releases first if that is possible.
    ///
    /// # Panics
    ///
    /// Panics if the core is exclusively borrowed.
    pub(crate) fn core(&self) -> Ref<'_, PoolCore<T>> {
        if let Ok(mut core) = self.core.try_borrow_mut() {
            self.settle(&mut core);
        }

        self.core.borrow()
    }

    /// Borrows the core for reading on behalf of a token, or returns `None` if the token's
    /// range has been released or the pool is closed.
    ///
    /// # Panics
    ///
    /// Panics if the core is exclusively borrowed.
    pub(crate) fn live_core(&self, id: TokenId) -> Option<Ref<'_, PoolCore<T>>> {
        let core = self.core();
        self.resolves(id).then_some(core)
    }

    /// Borrows the core exclusively on behalf of a token, or returns `None` if the token's
    /// range has been released or the pool is closed.
    ///
    /// # Panics
    ///
    /// Panics if the core is already borrowed.
    pub(crate) fn live_core_mut(&self, id: TokenId) -> Option<RefMut<'_, PoolCore<T>>> {
        let core = self.core_mut();
        self.resolves(id).then_some(core)
    }

    fn resolves(&self, id: TokenId) -> bool {
        !self.closed.get() && !self.deferred.borrow().contains(&id)
    }

    /// The number of tokens with a range, not counting queued releases.
    pub(crate) fn token_count(&self) -> usize {
        let core = self.core();

        core.token_count()
            .checked_sub(self.deferred.borrow().len())
            .expect("every queued release refers to a token the core still counts")
    }

    /// Creates a snapshot of the pool layout. Ranges with a queued release are reported as
    /// holes.
    pub(crate) fn report(&self) -> ReportInfo {
        let core = self.core();
        let mut report = core.report();
        let pending = self.deferred.borrow();

        if !pending.is_empty() {
            let (released, active): (Vec<_>, Vec<_>) = mem::take(&mut report.active)
                .into_iter()
                .partition(|node| node.token.is_some_and(|token| pending.contains(&token)));

            report.active = active;
            report
                .fragmented
                .extend(released.into_iter().map(|node| NodeInfo {
                    token: None,
                    ..node
                }));
            report
                .fragmented
                .sort_unstable_by_key(|node| (node.segment_index, node.start));
        }

        report
    }

    /// Releases a range now if the core is available, or queues the release otherwise.
    pub(crate) fn release(&self, id: TokenId) {
        if self.closed.get() {
            // Everything is forgotten when the core is next settled.
            return;
        }

        if let Ok(mut core) = self.core.try_borrow_mut() {
            self.settle(&mut core);
            core.release(id);
        } else {
            self.deferred.borrow_mut().push(id);
        }
    }

    /// Detaches the shared state from its pool and frees the segments, now if the core is
    /// available or otherwise as soon as it is borrowed again.
    pub(crate) fn close(&self) {
        self.closed.set(true);

        if let Ok(mut core) = self.core.try_borrow_mut() {
            self.settle(&mut core);
        }
    }

    fn settle(&self, core: &mut PoolCore<T>) {
        let pending = mem::take(&mut *self.deferred.borrow_mut());

        if self.closed.get() {
            core.close();
            return;
        }

        for id in pending {
            core.release(id);
        }
    }
}

impl<T> fmt::Debug for PoolShared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolShared")
            .field("core", &self.core)
            .field("deferred", &self.deferred)
            .field("closed", &self.closed)
            .finish()
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

    use static_assertions::assert_not_impl_any;

    use super::*;

    assert_not_impl_any!(SegmentPool<u8>: Send, Sync);

    #[test]
    fn smoke_test() {
        let mut pool = SegmentPool::<u32>::new(16);

        assert!(pool.is_empty());
        assert_eq!(pool.segment_length(), 16);

        let mut a = pool.rent(3);
        let mut b = pool.rent(4);

        a.as_span_mut().copy_from_slice(&[1, 2, 3]);
        b.as_span_mut().copy_from_slice(&[4, 5, 6, 7]);

        assert_eq!(pool.token_count(), 2);
        assert_eq!(&*a.as_span(), &[1, 2, 3]);
        assert_eq!(&*b.as_span(), &[4, 5, 6, 7]);
        pool.integrity_check();

        a.dispose();
        pool.integrity_check();

        assert_eq!(pool.token_count(), 1);
        assert_eq!(&*b.as_span(), &[4, 5, 6, 7]);
    }

    #[test]
    fn default_uses_default_segment_length() {
        let pool = SegmentPool::<u8>::default();

        assert_eq!(pool.segment_length(), DEFAULT_MIN_SEGMENT_LENGTH);
    }

    #[test]
    fn rent_zero_is_empty_token() {
        let mut pool = SegmentPool::<u8>::new(16);

        let token = pool.rent(0);
        let greedy = pool.greedy_rent(0);

        assert!(token.id().is_none());
        assert!(greedy.id().is_none());
        assert_eq!(token.len(), 0);
        assert!(token.as_span().is_empty());
        assert_eq!(pool.segment_count(), 0);
        assert!(pool.is_empty());
    }

    #[test]
    fn rent_returns_exact_lengths() {
        let mut pool = SegmentPool::<u8>::new(16);

        let tokens = (1..=40).map(|length| pool.rent(length)).collect::<Vec<_>>();

        for (index, token) in tokens.iter().enumerate() {
            assert_eq!(token.len(), index + 1);
            assert_eq!(token.as_span().len(), index + 1);
        }

        pool.integrity_check();
    }

    #[test]
    fn scenario_distinct_segments_for_overflow() {
        let mut pool = SegmentPool::<u8>::new(16);

        let a = pool.rent(1);
        let b = pool.rent(16);
        let c = pool.rent(17);

        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 16);
        assert_eq!(c.len(), 17);

        let a_info = a.try_get_info().unwrap();
        let b_info = b.try_get_info().unwrap();
        let c_info = c.try_get_info().unwrap();

        assert_ne!(a_info.segment_index, b_info.segment_index);
        assert_ne!(a_info.segment_index, c_info.segment_index);
        assert_ne!(b_info.segment_index, c_info.segment_index);

        assert_eq!(b_info.segment_capacity, 16);
        assert_eq!(c_info.segment_capacity, 32);

        pool.integrity_check();
    }

    #[test]
    fn oversized_segment_becomes_current() {
        let mut pool = SegmentPool::<u8>::new(16);

        let big = pool.rent(17);
        let small = pool.rent(2);

        // The 32-element segment has 15 elements of tail left, which the next rent uses.
        assert_eq!(
            big.try_get_info().unwrap().segment_index,
            small.try_get_info().unwrap().segment_index
        );
        assert_eq!(small.try_get_info().unwrap().start, 17);
        assert_eq!(pool.segment_count(), 1);
    }

    #[test]
    fn scenario_hole_too_small_then_reused_exactly() {
        let mut pool = SegmentPool::<u8>::new(16);

        let mut first = pool.rent(8);
        let _second = pool.rent(8);

        first.as_span_mut().copy_from_slice(&[9; 8]);
        first.dispose();
        pool.integrity_check();

        let ten = pool.rent(10);
        assert_eq!(ten.try_get_info().unwrap().segment_index, 1);
        assert_eq!(pool.segment_count(), 2);

        let eight = pool.rent(8);
        let info = eight.try_get_info().unwrap();
        assert_eq!(info.segment_index, 0);
        assert_eq!(info.start, 0);
        assert_eq!(&*eight.as_span(), &[9; 8]);

        pool.integrity_check();
    }

    #[test]
    fn greedy_rent_skips_holes() {
        let mut pool = SegmentPool::<u8>::new(16);

        let first = pool.rent(4);
        let _second = pool.rent(4);
        drop(first);

        let greedy = pool.greedy_rent(4);
        assert_eq!(greedy.try_get_info().unwrap().start, 8);

        // The hole is still there for a normal rent.
        assert_eq!(pool.report().fragmented.len(), 1);

        let normal = pool.rent(4);
        assert_eq!(normal.try_get_info().unwrap().start, 0);
        assert!(pool.report().fragmented.is_empty());

        pool.integrity_check();
    }

    #[test]
    fn disposed_tail_is_reused_with_old_content() {
        let mut pool = SegmentPool::<u8>::new(16);

        let mut token = pool.rent(4);
        token.as_span_mut().copy_from_slice(&[1, 2, 3, 4]);
        token.dispose();

        assert_eq!(pool.report().inactive.len(), 1);

        let shorter = pool.rent(2);
        assert_eq!(&*shorter.as_span(), &[1, 2]);
        drop(shorter);

        // Beyond the previously written range, the tail is still untouched default memory.
        let longer = pool.rent(6);
        assert_eq!(&*longer.as_span(), &[1, 2, 3, 4, 0, 0]);

        pool.integrity_check();
    }

    #[test]
    fn adjacent_holes_coalesce_in_either_order() {
        for reverse in [false, true] {
            let mut pool = SegmentPool::<u8>::new(16);

            let a = pool.rent(4);
            let b = pool.rent(4);
            let _c = pool.rent(4);
            let _d = pool.rent(4);

            if reverse {
                drop(b);
                drop(a);
            } else {
                drop(a);
                drop(b);
            }

            pool.integrity_check();

            let report = pool.report();
            assert_eq!(report.fragmented.len(), 1);
            assert_eq!(report.fragmented[0].length, 8);

            let combined = pool.rent(8);
            assert_eq!(combined.try_get_info().unwrap().segment_index, 0);
            assert_eq!(pool.segment_count(), 1);

            pool.integrity_check();
        }
    }

    #[test]
    fn hole_between_two_holes_merges_all_three() {
        let mut pool = SegmentPool::<u8>::new(16);

        let a = pool.rent(2);
        let b = pool.rent(2);
        let c = pool.rent(2);
        let _d = pool.rent(2);

        drop(a);
        drop(c);
        assert_eq!(pool.report().fragmented.len(), 2);

        drop(b);
        pool.integrity_check();

        let report = pool.report();
        assert_eq!(report.fragmented.len(), 1);
        assert_eq!(report.fragmented[0].start, 0);
        assert_eq!(report.fragmented[0].length, 6);
    }

    #[test]
    fn hole_split_leaves_remainder() {
        let mut pool = SegmentPool::<u8>::new(16);

        let a = pool.rent(8);
        let _b = pool.rent(8);
        drop(a);

        let small = pool.rent(3);
        assert_eq!(small.try_get_info().unwrap().start, 0);

        let report = pool.report();
        assert_eq!(report.fragmented.len(), 1);
        assert_eq!(report.fragmented[0].start, 3);
        assert_eq!(report.fragmented[0].length, 5);

        pool.integrity_check();
    }

    #[test]
    fn first_fit_prefers_oldest_leftmost_hole() {
        let mut pool = SegmentPool::<u8>::new(8);

        // Segment 0: [a 2][keep 2][b 2][keep 2]
        let a = pool.rent(2);
        let _k1 = pool.rent(2);
        let b = pool.rent(2);
        let _k2 = pool.rent(2);

        // Segment 1: [c 4][keep 4]
        let c = pool.rent(4);
        let _k3 = pool.rent(4);

        drop(c);
        drop(b);
        drop(a);

        let first = pool.rent(2);
        assert_eq!(first.try_get_info().unwrap().segment_index, 0);
        assert_eq!(first.try_get_info().unwrap().start, 0);

        let second = pool.rent(2);
        assert_eq!(second.try_get_info().unwrap().segment_index, 0);
        assert_eq!(second.try_get_info().unwrap().start, 4);

        let third = pool.rent(3);
        assert_eq!(third.try_get_info().unwrap().segment_index, 1);

        pool.integrity_check();
    }

    #[test]
    fn inactive_segment_is_reactivated_before_appending() {
        let mut pool = SegmentPool::<u8>::new(8);

        let a = pool.rent(8);
        let b = pool.rent(8);
        assert_eq!(pool.segment_count(), 2);

        drop(a);
        assert_eq!(pool.report().inactive.len(), 1);

        // Current segment (1) is full, so the inactive segment 0 is reused whole.
        let c = pool.rent(6);
        assert_eq!(c.try_get_info().unwrap().segment_index, 0);
        assert_eq!(pool.segment_count(), 2);

        drop(b);
        pool.integrity_check();
    }

    #[test]
    fn trim_excess_drops_empty_segments() {
        let mut pool = SegmentPool::<u8>::new(8);

        let a = pool.rent(8);
        let b = pool.rent(8);
        let c = pool.rent(8);
        assert_eq!(pool.segment_count(), 3);

        drop(a);
        drop(c);

        pool.trim_excess();
        pool.integrity_check();

        assert_eq!(pool.segment_count(), 1);
        assert_eq!(b.try_get_info().unwrap().segment_index, 0);

        drop(b);
        pool.trim_excess();
        assert_eq!(pool.segment_count(), 0);
        assert_eq!(pool.capacity(), 0);
    }

    #[test]
    fn trim_excess_compacts_and_preserves_content() {
        let mut pool = SegmentPool::<u32>::new(16);

        let mut tokens = (0..8).map(|_| pool.rent(2)).collect::<Vec<_>>();

        for (index, token) in tokens.iter_mut().enumerate() {
            let value = u32::try_from(index).unwrap();
            token.as_span_mut().copy_from_slice(&[value, value + 100]);
        }

        // Leave every other token alive.
        let survivors = tokens
            .into_iter()
            .enumerate()
            .filter_map(|(index, token)| (index % 2 == 1).then_some((index, token)))
            .collect::<Vec<_>>();

        pool.integrity_check();
        assert_eq!(pool.report().fragmented.len(), 4);

        pool.trim_excess();
        pool.integrity_check();

        let report = pool.report();
        assert!(report.fragmented.is_empty());
        assert_eq!(report.active_len(), 8);

        let mut expected_start = 0;
        for (index, token) in &survivors {
            let value = u32::try_from(*index).unwrap();
            let info = token.try_get_info().unwrap();

            assert_eq!(info.start, expected_start);
            assert_eq!(token.len(), 2);
            assert_eq!(&*token.as_span(), &[value, value + 100]);

            expected_start += 2;
        }
    }

    #[test]
    fn report_classifies_everything() {
        let mut pool = SegmentPool::<u8>::new(8);

        let a = pool.rent(2);
        let _b = pool.rent(2);
        let c = pool.rent(8);
        drop(a);
        drop(c);

        let report = pool.report();

        assert_eq!(report.segment_length, 8);
        assert_eq!(report.segments.len(), 2);
        assert_eq!(report.active.len(), 1);
        assert_eq!(report.fragmented.len(), 1);
        assert_eq!(report.free_tails.len(), 1);
        assert_eq!(report.free_tails[0].start, 4);
        assert_eq!(report.free_tails[0].length, 4);
        assert_eq!(report.inactive.len(), 1);
        assert_eq!(report.inactive[0].index, 1);
        assert!(report.inactive[0].is_current);

        let text = report.to_string();
        assert!(text.contains("segment 0: capacity 8, used 4"));
        assert!(text.contains("[0..2) hole"));
        assert!(text.contains("[4..8) free tail"));
        assert!(text.contains("segment 1 (current): capacity 8, inactive"));
    }

    #[test]
    fn drop_while_other_span_is_borrowed_is_deferred() {
        let mut pool = SegmentPool::<u8>::new(16);

        let mut a = pool.rent(4);
        let b = pool.rent(4);

        {
            let mut span = a.as_span_mut();
            span[0] = 42;

            // The core is borrowed by `span`, so this release is queued.
            drop(b);
        }

        assert_eq!(pool.token_count(), 1);
        assert_eq!(a.as_span()[0], 42);
        pool.integrity_check();
    }

    #[test]
    fn queued_release_no_longer_resolves() {
        let mut pool = SegmentPool::<u8>::new(16);

        let a = pool.rent(4);
        let b = pool.rent(4);
        let c = pool.rent(4);
        let b_id = b.id().unwrap();

        {
            let _span = a.as_span();
            drop(b);

            assert_eq!(pool.token_count(), 2);
            assert!(!pool.is_empty());

            let report = pool.report();
            assert_eq!(report.active.len(), 2);
            assert!(report.find(b_id).is_none());
            assert!(report.find(c.id().unwrap()).is_some());
            assert_eq!(report.fragmented.len(), 1);
            assert_eq!(report.fragmented[0].start, 4);
            assert_eq!(report.fragmented[0].length, 4);
        }

        // Applying the queued release leaves the same layout behind.
        let report = pool.report();
        assert_eq!(report.active.len(), 2);
        assert_eq!(report.fragmented.len(), 1);
        assert_eq!(report.fragmented[0].start, 4);
        pool.integrity_check();
    }

    #[test]
    fn trim_excess_collapses_sparse_segments() {
        let mut pool = SegmentPool::<u8>::new(8);

        let mut tokens = (0..3).map(|_| pool.rent(8)).collect::<Vec<_>>();
        assert_eq!(pool.segment_count(), 3);

        for (value, token) in (1_u8..).zip(&mut tokens) {
            token.set_length(1).unwrap();
            token.as_span_mut()[0] = value;
        }

        pool.trim_excess();
        pool.integrity_check();

        assert_eq!(pool.segment_count(), 1);
        assert_eq!(pool.capacity(), 8);
        assert!(pool.report().fragmented.is_empty());

        for (value, token) in (1_u8..).zip(&tokens) {
            assert_eq!(token.try_get_info().unwrap().segment_index, 0);
            assert_eq!(&*token.as_span(), &[value]);
        }
    }

    #[test]
    fn dropping_pool_releases_outstanding_tokens() {
        let mut pool = SegmentPool::<u8>::new(16);

        let mut token = pool.rent(4);
        token.as_span_mut().fill(3);
        let weak = Rc::downgrade(&pool.shared);

        drop(pool);

        // The shared state lives as long as the token does, but holds no segments.
        let shared = weak.upgrade().unwrap();
        assert_eq!(shared.core().segment_count(), 0);
        assert_eq!(shared.core().token_count(), 0);
        drop(shared);

        token.set_length(20).unwrap();
        assert_eq!(token.len(), 0);
        assert!(token.try_get_info().is_none());

        drop(token);
        assert!(weak.upgrade().is_none());
    }
}
