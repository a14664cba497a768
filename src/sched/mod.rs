//! Primitives to run work off the calling thread: value latches and a fixed
//! size worker pool.

pub mod latch;
pub mod scheduler;

mod unwind;

pub mod prelude {
    pub use super::latch::{Latch, LockLatch};
    pub use super::scheduler::ThreadPool;
}
