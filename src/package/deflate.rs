//! Raw deflate streams, as written by `ArchiveBuilder`.

use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};

use super::{DecompressResult, Decompressor};
use crate::errors::*;

/// Compresses `bytes` into a raw deflate stream.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

/// Incremental raw deflate decompressor.
pub struct Inflater {
    inner: Decompress,
}

impl Inflater {
    pub fn new() -> Self {
        Inflater {
            inner: Decompress::new(false),
        }
    }
}

impl Default for Inflater {
    fn default() -> Self {
        Inflater::new()
    }
}

impl Decompressor for Inflater {
    fn feed(&mut self, mut input: &[u8], output: &mut [u8]) -> DecompressResult {
        loop {
            let out_pos = self.inner.total_out() as usize;
            if out_pos > output.len() {
                return DecompressResult::Failed;
            }

            let in_before = self.inner.total_in();
            let status =
                match self
                    .inner
                    .decompress(input, &mut output[out_pos..], FlushDecompress::None)
                {
                    Ok(v) => v,
                    Err(err) => {
                        debug!("Corrupted deflate stream: {}", err);
                        return DecompressResult::Failed;
                    }
                };

            let consumed = (self.inner.total_in() - in_before) as usize;
            let produced = self.inner.total_out() as usize - out_pos;
            input = &input[consumed..];

            if status == Status::StreamEnd {
                return if self.inner.total_out() as usize == output.len() {
                    DecompressResult::Complete
                } else {
                    DecompressResult::Failed
                };
            }

            if consumed == 0 && produced == 0 {
                // No progress: either we need more input, or the output is
                // too small for the stream.
                return if input.is_empty() {
                    DecompressResult::Incomplete
                } else {
                    DecompressResult::Failed
                };
            }
        }
    }
}
