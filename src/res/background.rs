//! Background decompression.
//!
//! When enabled, compressed entries of at least `threshold` bytes are
//! inflated on a dedicated pool of worker threads instead of on the thread
//! calling `sync` or `wait`. A worker streams the entry through one block
//! buffer of `block_size` bytes, so only a single compressed block is
//! resident at any time next to the decompressed output. This costs one
//! read per block.
//!
//! Workers issue their reads through the same bounded async read table as
//! every manager. If that table is full of reads nobody collects, for example
//! those of another manager which is never synchronized, a worker keeps
//! retrying and `wait` on its resource blocks until entries are freed.
//!
//! The configuration is process-wide. The number of worker threads is fixed
//! by the first call enabling background decompression; later calls may
//! change the other parameters, but not the thread count.

use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::resolve::Source;
use crate::errors::*;
use crate::io;
use crate::io::prelude::ReadRequest;
use crate::memory::prelude::{AllocFlags, Allocator, Buffer};
use crate::package::{self, DecompressResult};
use crate::sched::prelude::{LockLatch, ThreadPool};

/// Worker threads never get less stack than this, regardless of what
/// package modules ask for.
pub const MIN_STACK_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompressionParams {
    pub enabled: bool,
    /// Compressed size from which entries are inflated in the background.
    pub threshold: u64,
    /// Size of the compressed blocks workers read at once.
    pub block_size: usize,
    /// Number of worker threads.
    pub threads: usize,
}

impl Default for DecompressionParams {
    fn default() -> Self {
        DecompressionParams {
            enabled: false,
            threshold: 64 * 1024,
            block_size: 64 * 1024,
            threads: 1,
        }
    }
}

struct Background {
    params: DecompressionParams,
    pool: Option<Arc<ThreadPool>>,
}

lazy_static! {
    static ref BACKGROUND: RwLock<Background> = RwLock::new(Background {
        params: DecompressionParams::default(),
        pool: None,
    });
}

/// Changes the background decompression configuration. The worker pool is
/// started on the first call with `enabled` set.
pub fn set_background_decompression(params: DecompressionParams) -> Result<()> {
    let mut bg = BACKGROUND.write().unwrap();

    if params.enabled && bg.pool.is_none() {
        let stack_size = match package::registry::max_decompress_stack_size() {
            0 => None,
            v => Some(v.max(MIN_STACK_SIZE)),
        };

        let pool = ThreadPool::new("lodestone-inflate", params.threads, stack_size)?;
        info!(
            "Started background decompression with {} threads.",
            pool.len()
        );

        bg.pool = Some(Arc::new(pool));
    } else if let Some(ref pool) = bg.pool {
        if params.threads != pool.len() {
            warn!(
                "Background decompression runs {} threads already, ignores {}.",
                pool.len(),
                params.threads
            );
        }
    }

    bg.params = DecompressionParams {
        threads: bg.pool.as_ref().map(|v| v.len()).unwrap_or(params.threads),
        block_size: params.block_size.max(1),
        ..params
    };

    Ok(())
}

/// Returns the current background decompression configuration.
pub fn background_decompression() -> DecompressionParams {
    BACKGROUND.read().unwrap().params
}

pub(crate) type Latch = Arc<LockLatch<Result<Buffer>>>;

/// Hands a compressed entry of `length` bytes to a worker, if background
/// decompression applies to it. The decompressed bytes are delivered through
/// the returned latch.
pub(crate) fn dispatch(
    name: &str,
    source: &Source,
    align: usize,
    flags: AllocFlags,
    allocator: &Arc<dyn Allocator>,
) -> Option<Latch> {
    let (pool, block_size) = {
        let bg = BACKGROUND.read().unwrap();
        if !bg.params.enabled || source.info.length < bg.params.threshold {
            return None;
        }

        (bg.pool.clone()?, bg.params.block_size)
    };

    let latch = Arc::new(LockLatch::new());
    let job = Job {
        name: name.to_owned(),
        source: source.clone(),
        align,
        flags,
        block_size,
        allocator: allocator.clone(),
    };

    let tx = latch.clone();
    pool.spawn(move || {
        let rsp = job.run();
        if let Err(ref err) = rsp {
            warn!("Failed to inflate '{}' in background: {}", job.name, err);
        }

        tx.set(rsp);
    });

    trace!("Dispatched '{}' to background decompression.", name);
    Some(latch)
}

struct Job {
    name: String,
    source: Source,
    align: usize,
    flags: AllocFlags,
    block_size: usize,
    allocator: Arc<dyn Allocator>,
}

impl Job {
    fn run(&self) -> Result<Buffer> {
        let module = self
            .source
            .module
            .as_ref()
            .ok_or_else(|| Error::Decompression(self.name.clone()))?;

        let size = self.source.info.size as usize;
        let mut output = self
            .allocator
            .allocate(size, self.align, self.flags)
            .ok_or(Error::OutOfMemory(size))?;

        let mut state = match module.decompress_init() {
            Some(state) => state,
            None => return self.run_oneshot(output),
        };

        let length = self.source.info.length;
        let block_size = (self.block_size as u64).min(length) as usize;
        let mut block = self
            .allocator
            .allocate(block_size, 1, AllocFlags::temporary())
            .ok_or(Error::OutOfMemory(block_size))?;

        let mut pos = 0;
        let mut result = DecompressResult::Incomplete;
        while pos < length {
            let n = (length - pos).min(block_size as u64) as usize;
            let req = self.read(pos, n, block);
            block = match req.wait() {
                Ok(block) => block,
                Err(err) => {
                    module.decompress_finish(state);
                    return Err(err);
                }
            };

            pos += n as u64;
            result = state.feed(&block[..n], &mut output);
            if result != DecompressResult::Incomplete {
                break;
            }
        }

        if result == DecompressResult::Incomplete {
            result = state.feed(&[], &mut output);
        }

        module.decompress_finish(state);
        match result {
            DecompressResult::Complete => Ok(output),
            _ => Err(Error::Decompression(self.name.clone())),
        }
    }

    /// Issues a read, retrying until the read table has room for it.
    fn read(&self, pos: u64, n: usize, mut block: Buffer) -> ReadRequest {
        let file = &self.source.info.file;
        let offset = self.source.info.offset + pos;

        let mut ms = 1;
        loop {
            match io::read_async(file, offset, n, block) {
                Ok(req) => return req,
                Err(v) => {
                    block = v;
                    thread::sleep(Duration::from_millis(ms));
                    ms = (ms * 2).min(16);
                }
            }
        }
    }

    /// For modules without incremental decompression: reads the whole entry
    /// and inflates it in one go.
    fn run_oneshot(&self, mut output: Buffer) -> Result<Buffer> {
        let length = self.source.info.length as usize;
        let input = self
            .allocator
            .allocate(length, 1, AllocFlags::temporary())
            .ok_or(Error::OutOfMemory(length))?;

        let input = self.read(0, length, input).wait()?;
        let module = self
            .source
            .module
            .as_ref()
            .ok_or_else(|| Error::Decompression(self.name.clone()))?;

        match module.decompress(&input, &mut output) {
            DecompressResult::Complete => Ok(output),
            _ => Err(Error::Decompression(self.name.clone())),
        }
    }
}
