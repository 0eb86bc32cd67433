use std::cell::{Ref, RefMut};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use crate::{Error, MemoryView, NodeInfo, PoolShared, Result, TokenId};

/// A range of elements rented from a [`SegmentPool`][crate::SegmentPool].
///
/// The token is a capability: it does not own the elements, it owns the right to use a range of
/// a pool segment until it is disposed. Dropping the token disposes it.
///
/// A token obtained by renting zero elements is *empty*. It is not attached to any pool, has a
/// length of zero and ignores every operation that would change it.
///
/// # Access
///
/// The range is accessed through borrow guards returned by [`as_span()`][1] and
/// [`as_span_mut()`][2]. While a guard is alive the pool is borrowed, so operations that change
/// the pool layout (renting, resizing, trimming) panic instead of moving data out from under
/// the guard. Drop guards before calling such operations.
///
/// # Relocation
///
/// The token refers to its range through a stable [`TokenId`]. Growing a token beyond the free
/// space after it and [`SegmentPool::trim_excess()`][3] may move the data to a different
/// place; the token keeps working and sees the moved data.
///
/// # Outliving the pool
///
/// The pool owns the segments, not the token. Once the [`SegmentPool`][crate::SegmentPool] is
/// dropped the token behaves as if it had been disposed: it has no elements, no info and
/// ignores resizing.
///
/// [1]: Self::as_span
/// [2]: Self::as_span_mut
/// [3]: crate::SegmentPool::trim_excess
pub struct Token<T>
where
    T: Copy + Default,
{
    inner: Option<Bound<T>>,
}

struct Bound<T> {
    pool: Rc<PoolShared<T>>,
    id: TokenId,
}

impl<T> Token<T>
where
    T: Copy + Default,
{
    #[must_use]
    pub(crate) fn new(pool: Rc<PoolShared<T>>, id: TokenId) -> Self {
        Self {
            inner: Some(Bound { pool, id }),
        }
    }

    /// The id of the rented range, or `None` for an empty or disposed token.
    ///
    /// The id matches [`NodeInfo::token`] in a pool [report][crate::SegmentPool::report].
    #[must_use]
    pub fn id(&self) -> Option<TokenId> {
        self.inner.as_ref().map(|bound| bound.id)
    }

    /// The number of elements in the range. Zero for an empty or disposed token.
    ///
    /// # Panics
    ///
    /// Panics if a mutable span of any token of the same pool is borrowed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |bound| {
            bound
                .pool
                .live_core(bound.id)
                .and_then(|core| core.len_of(bound.id))
                .unwrap_or(0)
        })
    }

    /// Whether the token has no elements, which is only the case for empty or disposed tokens.
    ///
    /// # Panics
    ///
    /// Panics if a mutable span of any token of the same pool is borrowed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrows the range for reading.
    ///
    /// # Example
    ///
    /// ```rust
    /// use segment_pool::SegmentPool;
    ///
    /// let mut pool = SegmentPool::<i32>::new(16);
    /// let token = pool.rent(3);
    ///
    /// assert_eq!(&*token.as_span(), &[0, 0, 0]);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if a mutable span of any token of the same pool is borrowed.
    #[must_use]
    pub fn as_span(&self) -> SpanRef<'_, T> {
        let inner = self.inner.as_ref().and_then(|bound| {
            let core = bound.pool.live_core(bound.id)?;
            Ref::filter_map(core, |core| core.span(bound.id)).ok()
        });

        SpanRef { inner }
    }

    /// Borrows the range for writing.
    ///
    /// # Example
    ///
    /// ```rust
    /// use segment_pool::SegmentPool;
    ///
    /// let mut pool = SegmentPool::<i32>::new(16);
    /// let mut token = pool.rent(3);
    ///
    /// token.as_span_mut().copy_from_slice(&[1, 2, 3]);
    /// assert_eq!(&*token.as_span(), &[1, 2, 3]);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if a span of any token of the same pool is borrowed.
    #[must_use]
    pub fn as_span_mut(&mut self) -> SpanMut<'_, T> {
        let inner = self.inner.as_ref().and_then(|bound| {
            let core = bound.pool.live_core_mut(bound.id)?;
            RefMut::filter_map(core, |core| core.span_mut(bound.id)).ok()
        });

        SpanMut { inner }
    }

    /// Creates a detached view of the range that can be stored and cloned independently of the
    /// token.
    ///
    /// The view follows the range through relocation and stops resolving once the token has
    /// been disposed.
    #[must_use]
    pub fn as_memory(&self) -> MemoryView<T> {
        match &self.inner {
            Some(bound) => MemoryView::new(Rc::clone(&bound.pool), bound.id),
            None => MemoryView::default(),
        }
    }

    /// Changes the number of elements in the range.
    ///
    /// Existing content up to the smaller of the old and new lengths is preserved. Growing
    /// happens in place when the free space directly after the range suffices; otherwise the
    /// content is moved to a new range and the token follows it. New trailing elements are set
    /// to `T::default()` only if [clearing][1] is enabled, otherwise they hold whatever was
    /// last written to that memory.
    ///
    /// Empty and disposed tokens ignore this call, as do tokens whose pool has been dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLength`] if `new_length` is zero. Use [`dispose()`][2] to give
    /// back the whole range.
    ///
    /// # Example
    ///
    /// ```rust
    /// use segment_pool::SegmentPool;
    ///
    /// let mut pool = SegmentPool::<u8>::new(16);
    /// let mut token = pool.rent(2).enable_clearing(true);
    /// token.as_span_mut().copy_from_slice(&[1, 2]);
    ///
    /// token.set_length(4)?;
    /// assert_eq!(&*token.as_span(), &[1, 2, 0, 0]);
    ///
    /// token.set_length(1)?;
    /// assert_eq!(&*token.as_span(), &[1]);
    ///
    /// assert!(token.set_length(0).is_err());
    /// # Ok::<(), segment_pool::Error>(())
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if a span of any token of the same pool is borrowed.
    ///
    /// [1]: Self::enable_clearing
    /// [2]: Self::dispose
    pub fn set_length(&mut self, new_length: usize) -> Result<()> {
        if new_length == 0 {
            return Err(Error::InvalidLength {
                requested: new_length,
            });
        }

        if let Some(bound) = &self.inner {
            if let Some(mut core) = bound.pool.live_core_mut(bound.id) {
                core.set_length(bound.id, new_length);
            }
        }

        Ok(())
    }

    /// Sets whether the range is overwritten with `T::default()` when it is given back to the
    /// pool and when it grows. Returns the same token, for chaining after a rent.
    ///
    /// # Example
    ///
    /// ```rust
    /// use segment_pool::SegmentPool;
    ///
    /// let mut pool = SegmentPool::<u8>::new(16);
    ///
    /// let mut secret = pool.rent(4).enable_clearing(true);
    /// secret.as_span_mut().copy_from_slice(b"pass");
    /// drop(secret);
    ///
    /// let reused = pool.rent(4);
    /// assert_eq!(&*reused.as_span(), &[0; 4]);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if a span of any token of the same pool is borrowed.
    #[must_use]
    pub fn enable_clearing(self, enabled: bool) -> Self {
        if let Some(bound) = &self.inner {
            if let Some(mut core) = bound.pool.live_core_mut(bound.id) {
                core.set_clear_on_release(bound.id, enabled);
            }
        }

        self
    }

    /// Whether the range is cleared on release and growth.
    ///
    /// # Panics
    ///
    /// Panics if a mutable span of any token of the same pool is borrowed.
    #[must_use]
    pub fn is_clearing(&self) -> bool {
        self.inner.as_ref().is_some_and(|bound| {
            bound
                .pool
                .live_core(bound.id)
                .is_some_and(|core| core.is_clearing(bound.id))
        })
    }

    /// Describes where the range currently lives, or `None` for an empty or disposed token.
    ///
    /// # Panics
    ///
    /// Panics if a mutable span of any token of the same pool is borrowed.
    #[must_use]
    pub fn try_get_info(&self) -> Option<NodeInfo> {
        let bound = self.inner.as_ref()?;
        bound.pool.live_core(bound.id)?.info(bound.id)
    }

    /// Gives the range back to the pool. Calling this more than once does nothing.
    ///
    /// If a span of another token of the same pool is borrowed at the time, the release is
    /// completed by the next pool operation.
    pub fn dispose(&mut self) {
        if let Some(bound) = self.inner.take() {
            bound.pool.release(bound.id);
        }
    }
}

impl<T> Default for Token<T>
where
    T: Copy + Default,
{
    /// Creates an empty token that is not attached to any pool.
    fn default() -> Self {
        Self { inner: None }
    }
}

impl<T> Drop for Token<T>
where
    T: Copy + Default,
{
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T> fmt::Debug for Token<T>
where
    T: Copy + Default,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token").field("id", &self.id()).finish()
    }
}

/// Shared access to the range of a [`Token`]. Dereferences to `[T]`.
pub struct SpanRef<'a, T> {
    inner: Option<Ref<'a, [T]>>,
}

impl<'a, T> SpanRef<'a, T> {
    pub(crate) fn new(inner: Option<Ref<'a, [T]>>) -> Self {
        Self { inner }
    }
}

impl<T> Deref for SpanRef<'_, T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        match &self.inner {
            Some(span) => span,
            None => &[],
        }
    }
}

impl<T> fmt::Debug for SpanRef<'_, T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Exclusive access to the range of a [`Token`]. Dereferences to `[T]`.
pub struct SpanMut<'a, T> {
    inner: Option<RefMut<'a, [T]>>,
}

impl<T> Deref for SpanMut<'_, T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        match &self.inner {
            Some(span) => span,
            None => &[],
        }
    }
}

impl<T> DerefMut for SpanMut<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.inner {
            Some(span) => span,
            None => &mut [],
        }
    }
}

impl<T> fmt::Debug for SpanMut<'_, T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
