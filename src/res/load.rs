//! Loads in flight.
//!
//! A load goes through one of three paths, decided when it is issued:
//!
//! * Stored entries are read straight into their destination buffer.
//! * Compressed entries below the background threshold are read as they are,
//!   and inflated by whoever completes the load in `sync` or `wait`.
//! * Larger compressed entries are streamed through a background worker.
//!
//! When the async read table is full, the read itself is deferred and done
//! synchronously at completion time instead.

use std::mem;
use std::sync::{Arc, Mutex};

use super::background::{self, Latch};
use super::factory::TextureParams;
use super::id::ResourceKind;
use super::resolve::Source;
use crate::errors::*;
use crate::io;
use crate::io::prelude::ReadRequest;
use crate::memory::prelude::{AllocFlags, Allocator, Buffer};
use crate::package::DecompressResult;
use crate::sched::prelude::Latch as _;

/// What a load produces once its bytes are available.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum LoadKind {
    Data,
    Texture(TextureParams),
    BitmapFont,
    FreeTypeFont(u32),
    Sound,
}

impl LoadKind {
    pub fn resource_kind(&self) -> ResourceKind {
        match *self {
            LoadKind::Data => ResourceKind::Data,
            LoadKind::Texture(_) => ResourceKind::Texture,
            LoadKind::BitmapFont | LoadKind::FreeTypeFont(_) => ResourceKind::Font,
            LoadKind::Sound => ResourceKind::Sound,
        }
    }
}

/// Where and how the loaded bytes are allocated.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoadSpec {
    pub kind: LoadKind,
    pub align: usize,
    pub flags: AllocFlags,
}

impl LoadSpec {
    /// Bytes which only feed a typed constructor are temporary.
    pub fn intermediate(kind: LoadKind) -> Self {
        LoadSpec {
            kind,
            align: 1,
            flags: AllocFlags::temporary(),
        }
    }
}

enum Stage {
    Reading { request: ReadRequest, source: Source },
    Deferred { source: Source, buf: Buffer },
    Worker(Latch),
    Taken,
}

pub(crate) struct LoadTask {
    pub name: String,
    pub spec: LoadSpec,
    stage: Mutex<Stage>,
}

impl LoadTask {
    /// Issues the load of `source`. Fails right away if the first buffer can
    /// not be allocated.
    pub fn start(
        name: &str,
        source: Source,
        spec: LoadSpec,
        allocator: &Arc<dyn Allocator>,
    ) -> Result<Arc<LoadTask>> {
        let stage = if source.info.compressed {
            match background::dispatch(name, &source, spec.align, spec.flags, allocator) {
                Some(latch) => Stage::Worker(latch),
                None => read(name, source, 1, AllocFlags::temporary(), allocator)?,
            }
        } else {
            read(name, source, spec.align, spec.flags, allocator)?
        };

        Ok(Arc::new(LoadTask {
            name: name.to_owned(),
            spec,
            stage: Mutex::new(stage),
        }))
    }

    /// Completes the load and returns its bytes. Only the first caller gets
    /// the result; everyone else gets `None`, as does a non-blocking call on
    /// a load which is not ready yet.
    ///
    /// Deferred reads and inflation of compressed entries run on the calling
    /// thread.
    pub fn finish(&self, allocator: &dyn Allocator, block: bool) -> Option<Result<Buffer>> {
        let stage = {
            let mut stage = self.stage.lock().unwrap();
            let ready = match *stage {
                Stage::Reading { ref request, .. } => request.poll(),
                Stage::Deferred { .. } => true,
                Stage::Worker(ref latch) => latch.is_set(),
                Stage::Taken => return None,
            };

            if !ready && !block {
                return None;
            }

            mem::replace(&mut *stage, Stage::Taken)
        };

        let rsp = match stage {
            Stage::Reading { request, source } => request
                .wait()
                .and_then(|input| self.inflate(&source, input, allocator)),
            Stage::Deferred { source, mut buf } => {
                let len = source.info.length as usize;
                source
                    .info
                    .file
                    .read_exact_at(&mut buf[..len], source.info.offset)
                    .and_then(|_| self.inflate(&source, buf, allocator))
            }
            Stage::Worker(latch) => {
                latch.wait();
                latch
                    .take()
                    .unwrap_or_else(|| Err(Error::Decompression(self.name.clone())))
            }
            Stage::Taken => return None,
        };

        Some(rsp)
    }

    fn inflate(&self, source: &Source, input: Buffer, allocator: &dyn Allocator) -> Result<Buffer> {
        if !source.info.compressed {
            return Ok(input);
        }

        let module = source
            .module
            .as_ref()
            .ok_or_else(|| Error::Decompression(self.name.clone()))?;

        let size = source.info.size as usize;
        let mut output = allocator
            .allocate(size, self.spec.align, self.spec.flags)
            .ok_or(Error::OutOfMemory(size))?;

        match module.decompress(&input, &mut output) {
            DecompressResult::Complete => Ok(output),
            _ => Err(Error::Decompression(self.name.clone())),
        }
    }
}

fn read(
    name: &str,
    source: Source,
    align: usize,
    flags: AllocFlags,
    allocator: &Arc<dyn Allocator>,
) -> Result<Stage> {
    let len = source.info.length as usize;
    let buf = allocator
        .allocate(len, align, flags)
        .ok_or(Error::OutOfMemory(len))?;

    match io::read_async(&source.info.file, source.info.offset, len, buf) {
        Ok(request) => Ok(Stage::Reading { request, source }),
        Err(buf) => {
            debug!("Async read table is full, defers reading '{}'.", name);
            Ok(Stage::Deferred { source, buf })
        }
    }
}
