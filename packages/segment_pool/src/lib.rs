#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A pool of resizable contiguous ranges of `T` carved out of a small number of large segments.
//!
//! This crate provides [`SegmentPool`], an allocator for many short-lived buffers of plain data
//! that would otherwise each be a separate heap allocation. Callers rent a range of exactly the
//! length they need and receive a [`Token`] that grants access to it. When the token is disposed
//! or dropped, the range goes back to the pool and is merged with free neighbours so that later
//! requests can reuse it.
//!
//! # Key Features
//!
//! - **Few allocations**: ranges are carved out of segments of a configurable length
//! - **Exact lengths**: a token always covers exactly the number of elements requested
//! - **Coalescing**: adjacent free ranges merge immediately, in either release order
//! - **Resizing**: tokens grow in place when the space after them is free, otherwise they move
//! - **Compaction**: [`SegmentPool::trim_excess()`] packs live ranges and frees empty segments
//! - **Stable handles**: tokens keep working when their data is moved by the pool
//! - **Optional clearing**: ranges can be overwritten with `T::default()` on release
//! - **Introspection**: [`SegmentPool::report()`] describes every segment and range
//!
//! # Element requirements
//!
//! Elements must be `Copy + Default`. The pool moves elements with plain copies and fills fresh
//! memory with `T::default()`; it never runs destructors.
//!
//! # Access model
//!
//! A token does not hold a reference into the pool. Its range is reached through borrow guards
//! ([`SpanRef`] and [`SpanMut`]) that keep the pool layout fixed while they are alive. Any
//! operation that would move data (renting, resizing, trimming) panics if a guard of the same pool
//! is alive at the time. Dropping or disposing a token never panics; if the pool is borrowed at
//! that moment, the release is completed by the next pool operation.
//!
//! The pool owns its segments. Tokens that outlive the [`SegmentPool`] behave as if they had
//! been disposed.
//!
//! # Example
//!
//! ```rust
//! use segment_pool::SegmentPool;
//!
//! let mut pool = SegmentPool::<u8>::new(64);
//!
//! let mut greeting = pool.rent(5);
//! greeting.as_span_mut().copy_from_slice(b"hello");
//!
//! let mut name = pool.rent(5).enable_clearing(true);
//! name.as_span_mut().copy_from_slice(b"world");
//!
//! // Growing past the active `name` range moves `greeting` to free space after it.
//! greeting.set_length(10)?;
//! greeting.as_span_mut()[5..].copy_from_slice(b", all");
//! assert_eq!(&*greeting.as_span(), b"hello, all");
//!
//! // The range `greeting` used to occupy is now a hole that the next fitting rent reuses.
//! let reused = pool.rent(3);
//! assert_eq!(reused.try_get_info().unwrap().start, 0);
//!
//! drop(name);
//! drop(reused);
//! drop(greeting);
//!
//! pool.trim_excess();
//! assert_eq!(pool.segment_count(), 0);
//! # Ok::<(), segment_pool::Error>(())
//! ```

mod builder;
mod error;
mod free_index;
mod handle;
mod memory;
mod node;
mod pool;
mod pool_core;
mod report;
mod segment;
mod segment_length;
mod token;

pub use builder::*;
pub use error::{Error, Result};
pub(crate) use free_index::*;
pub(crate) use handle::{Binding, HandleTable};
pub use handle::TokenId;
pub use memory::*;
pub(crate) use node::*;
pub use pool::{DEFAULT_MIN_SEGMENT_LENGTH, SegmentPool};
pub(crate) use pool::PoolShared;
pub(crate) use pool_core::*;
pub use report::*;
pub(crate) use segment::*;
pub use segment_length::*;
pub use token::*;
