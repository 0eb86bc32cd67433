use std::cell::Ref;
use std::fmt;
use std::rc::Rc;

use crate::{PoolShared, SpanRef, TokenId};

/// A detached, cloneable view of the range rented by a [`Token`][crate::Token].
///
/// Unlike a span, a view does not borrow the pool while it is stored. It is resolved on every
/// access, so it follows the range when the pool moves it and stops resolving once the token has
/// been disposed or its pool has been dropped. A view of an empty token never resolves.
///
/// # Example
///
/// ```rust
/// use segment_pool::SegmentPool;
///
/// let mut pool = SegmentPool::<u8>::new(16);
/// let mut token = pool.rent(2);
/// token.as_span_mut().copy_from_slice(&[4, 2]);
///
/// let view = token.as_memory();
/// assert_eq!(view.to_vec(), Some(vec![4, 2]));
///
/// token.dispose();
/// assert!(!view.is_live());
/// assert_eq!(view.to_vec(), None);
/// ```
pub struct MemoryView<T> {
    inner: Option<(Rc<PoolShared<T>>, TokenId)>,
}

impl<T> MemoryView<T>
where
    T: Copy + Default,
{
    #[must_use]
    pub(crate) fn new(pool: Rc<PoolShared<T>>, id: TokenId) -> Self {
        Self {
            inner: Some((pool, id)),
        }
    }

    /// The id of the token the view was created from, if it was not empty.
    #[must_use]
    pub fn token_id(&self) -> Option<TokenId> {
        self.inner.as_ref().map(|(_, id)| *id)
    }

    /// Whether the token behind the view still has its range.
    ///
    /// # Panics
    ///
    /// Panics if a mutable span of any token of the same pool is borrowed.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.resolved_len().is_some()
    }

    /// The current length of the range, or zero if the view no longer resolves.
    ///
    /// # Panics
    ///
    /// Panics if a mutable span of any token of the same pool is borrowed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resolved_len().unwrap_or(0)
    }

    fn resolved_len(&self) -> Option<usize> {
        let (pool, id) = self.inner.as_ref()?;
        pool.live_core(*id)?.len_of(*id)
    }

    /// Whether the view currently resolves to no elements.
    ///
    /// # Panics
    ///
    /// Panics if a mutable span of any token of the same pool is borrowed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrows the range for reading, or returns `None` if the view no longer resolves.
    ///
    /// # Panics
    ///
    /// Panics if a mutable span of any token of the same pool is borrowed.
    #[must_use]
    pub fn try_span(&self) -> Option<SpanRef<'_, T>> {
        let (pool, id) = self.inner.as_ref()?;
        let span = Ref::filter_map(pool.live_core(*id)?, |core| core.span(*id)).ok()?;

        Some(SpanRef::new(Some(span)))
    }

    /// Copies the range into a new vector, or returns `None` if the view no longer resolves.
    ///
    /// # Panics
    ///
    /// Panics if a mutable span of any token of the same pool is borrowed.
    #[must_use]
    pub fn to_vec(&self) -> Option<Vec<T>> {
        self.try_span().map(|span| span.to_vec())
    }
}

impl<T> Clone for MemoryView<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self
                .inner
                .as_ref()
                .map(|(pool, id)| (Rc::clone(pool), *id)),
        }
    }
}

impl<T> Default for MemoryView<T> {
    /// Creates a view that never resolves.
    fn default() -> Self {
        Self { inner: None }
    }
}

impl<T> fmt::Debug for MemoryView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryView")
            .field("token", &self.inner.as_ref().map(|(_, id)| *id))
            .finish()
    }
}
