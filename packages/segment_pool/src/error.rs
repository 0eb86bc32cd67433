use thiserror::Error;

/// Errors that can occur when using a [`SegmentPool`][crate::SegmentPool] or its tokens.
#[derive(Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// A token was asked to take on a length that a rented range cannot have.
    ///
    /// Rented ranges always contain at least one element. To give back the range, dispose of
    /// the token instead.
    #[error("invalid token length {requested}: a rented range must contain at least one element")]
    InvalidLength {
        /// The length that was requested.
        requested: usize,
    },
}

/// A specialized `Result` type for segment pool operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
