use std::marker::PhantomData;

use crate::{DEFAULT_MIN_SEGMENT_LENGTH, SegmentPool};

/// Builder for creating an instance of [`SegmentPool`].
///
/// You only need to use this builder if you want to customize the pool configuration.
/// [`SegmentPool::new()`][1] covers the common case of only choosing a segment length.
///
/// # Examples
///
/// ```
/// use segment_pool::SegmentPool;
///
/// let pool = SegmentPool::<u64>::builder()
///     .min_segment_length(300)
///     .build();
///
/// assert_eq!(pool.segment_length(), 512);
/// ```
///
/// [1]: SegmentPool::new
#[must_use]
pub struct SegmentPoolBuilder<T> {
    min_segment_length: usize,

    _item: PhantomData<T>,
}

impl<T> std::fmt::Debug for SegmentPoolBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentPoolBuilder")
            .field(
                "item_type",
                &std::format_args!("{}", std::any::type_name::<T>()),
            )
            .field("min_segment_length", &self.min_segment_length)
            .finish()
    }
}

impl<T> SegmentPoolBuilder<T>
where
    T: Copy + Default,
{
    pub(crate) fn new() -> Self {
        Self {
            min_segment_length: DEFAULT_MIN_SEGMENT_LENGTH,
            _item: PhantomData,
        }
    }

    /// Sets the minimum number of elements in an ordinary segment.
    ///
    /// The value is normalized to the smallest power of two that is at least `max(length, 4)`.
    /// Requests longer than the segment length still succeed - they get a dedicated segment.
    ///
    /// # Examples
    ///
    /// ```
    /// use segment_pool::SegmentPool;
    ///
    /// let pool = SegmentPool::<u8>::builder().min_segment_length(1).build();
    /// assert_eq!(pool.segment_length(), 4);
    /// ```
    pub fn min_segment_length(mut self, length: usize) -> Self {
        self.min_segment_length = length;
        self
    }

    /// Builds the segment pool with the specified configuration.
    ///
    /// No segment is allocated until the first range is rented.
    ///
    /// # Examples
    ///
    /// ```
    /// use segment_pool::SegmentPool;
    ///
    /// let pool = SegmentPool::<u32>::builder().build();
    /// assert_eq!(pool.capacity(), 0);
    /// ```
    #[must_use]
    pub fn build(self) -> SegmentPool<T> {
        SegmentPool::new_inner(self.min_segment_length)
    }
}
