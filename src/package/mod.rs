//! Pluggable packages which map logical resource names onto byte ranges of
//! host files, optionally compressed.
//!
//! A `PackageModule` is registered once under a path prefix. While it is
//! registered, every resource name starting with that prefix is resolved by
//! the module, with the most recently registered module winning. Modules
//! which store compressed entries also provide the decompressor: either
//! one-shot, or incremental through a `Decompressor` state object so that
//! large entries can be inflated block by block on a worker thread.

pub mod archive;
pub mod deflate;
pub mod registry;

pub use self::registry::{register, unregister};

use crate::errors::*;
use crate::io::prelude::FileHandle;

/// Where the bytes of one package entry live.
#[derive(Debug, Clone)]
pub struct PackageFileInfo {
    /// The host file holding the entry.
    pub file: FileHandle,
    /// Offset of the first byte of the entry inside `file`.
    pub offset: u64,
    /// Number of bytes the entry occupies inside `file`.
    pub length: u64,
    /// True if the stored bytes need to be decompressed.
    pub compressed: bool,
    /// Size of the entry once decompressed. Equals `length` for stored entries.
    pub size: u64,
}

/// Outcome of feeding bytes to a decompressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecompressResult {
    /// The stream ended and the output is complete.
    Complete,
    /// All input was consumed, more is needed to finish the stream.
    Incomplete,
    /// The stream is corrupt or does not fit the output.
    Failed,
}

/// An incremental decompression state. One state is created per entry being
/// decompressed, and is fed the compressed stream in order.
pub trait Decompressor: Send {
    /// Consumes `input` and writes decompressed bytes into `output`, which is
    /// the complete destination of the stream. The state keeps track of how
    /// much of `output` has been written already.
    fn feed(&mut self, input: &[u8], output: &mut [u8]) -> DecompressResult;
}

pub trait PackageModule: Send + Sync + 'static {
    /// The path prefix this module claims, e.g. `"pkg:"`. An empty prefix
    /// claims every resource name.
    fn prefix(&self) -> &str;

    /// Called exactly once when the module is registered. If this fails the
    /// module is never registered, and no other method is called.
    fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Called exactly once when the module is unregistered.
    fn cleanup(&self) {}

    /// Enumerates every entry of the package exactly once, in any order.
    fn list(&self) -> Box<dyn Iterator<Item = String> + '_>;

    /// Locates an entry by its path, relative to the prefix.
    fn file_info(&self, path: &str) -> Option<PackageFileInfo>;

    /// The stack size a worker thread needs to run this module's decompressor.
    fn decompress_stack_size(&self) -> usize {
        0
    }

    /// Creates a new incremental decompression state, or `None` if the module
    /// does not support incremental decompression.
    fn decompress_init(&self) -> Option<Box<dyn Decompressor>> {
        None
    }

    /// Releases a state created by `decompress_init`.
    fn decompress_finish(&self, state: Box<dyn Decompressor>) {
        drop(state);
    }

    /// Decompresses a complete stream in one call. Anything other than a
    /// stream exactly filling `output` is a failure.
    fn decompress(&self, input: &[u8], output: &mut [u8]) -> DecompressResult {
        let mut state = match self.decompress_init() {
            Some(state) => state,
            None => return DecompressResult::Failed,
        };

        let mut result = state.feed(input, output);
        if result == DecompressResult::Incomplete {
            result = state.feed(&[], output);
        }

        self.decompress_finish(state);
        match result {
            DecompressResult::Complete => DecompressResult::Complete,
            _ => DecompressResult::Failed,
        }
    }
}

pub mod prelude {
    pub use super::archive::{ArchiveBuilder, ArchivePackage};
    pub use super::deflate::Inflater;
    pub use super::{DecompressResult, Decompressor, PackageFileInfo, PackageModule};
}
