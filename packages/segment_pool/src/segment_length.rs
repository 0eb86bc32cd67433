/// The smallest capacity any segment is allowed to have.
pub const MIN_SEGMENT_LENGTH: usize = 4;

/// The largest power of two that fits in `usize`. Segment lengths saturate here instead of
/// overflowing when normalizing absurdly large requests.
pub const MAX_SEGMENT_LENGTH: usize = 1 << (usize::BITS - 1);

/// Normalizes a requested minimum length into a segment capacity.
///
/// The result is the smallest power of two that is at least `max(length, 4)`. Requests beyond
/// the largest power of two representable in `usize` saturate to [`MAX_SEGMENT_LENGTH`].
///
/// The same normalization is used for the standing segment length of a pool and for segments
/// that are created to satisfy a single oversized rent request.
///
/// # Examples
///
/// ```
/// use segment_pool::normalize_segment_length;
///
/// assert_eq!(normalize_segment_length(0), 4);
/// assert_eq!(normalize_segment_length(5), 8);
/// assert_eq!(normalize_segment_length(16), 16);
/// assert_eq!(normalize_segment_length(17), 32);
/// ```
#[must_use]
pub fn normalize_segment_length(length: usize) -> usize {
    length
        .max(MIN_SEGMENT_LENGTH)
        .checked_next_power_of_two()
        .unwrap_or(MAX_SEGMENT_LENGTH)
}
