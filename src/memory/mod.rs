//! The allocation seam every resource payload goes through.
//!
//! Managers never call the global allocator directly. They ask an
//! `Allocator` for a `Buffer`, which makes exhaustion an ordinary, recoverable
//! error instead of an abort, and lets tests account for every byte.

pub mod allocator;
pub mod buffer;

pub mod prelude {
    pub use super::allocator::{AllocFlags, Allocator, SystemAllocator, TrackingAllocator};
    pub use super::buffer::Buffer;
}
