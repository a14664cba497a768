//! Host file access: positional file handles and asynchronous reads.

pub mod file;
pub mod request;

pub use self::request::{inflight, read_async, setup};

pub mod prelude {
    pub use super::file::FileHandle;
    pub use super::request::{IoParams, ReadRequest};
}
