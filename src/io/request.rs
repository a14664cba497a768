//! The asynchronous read table.
//!
//! Reads are executed by a small pool of I/O threads. Every queued read holds
//! an entry of a bounded table until its `ReadRequest` is dropped, so a table
//! can be full of reads which completed long ago but were never collected by
//! their owner.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::errors::*;
use crate::memory::prelude::Buffer;
use crate::sched::prelude::{Latch, LockLatch, ThreadPool};

use super::file::FileHandle;

/// Setup parameters of the process-wide read table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoParams {
    /// Maximum number of reads which could be outstanding at the same time.
    pub max_requests: usize,
    /// Number of threads servicing reads.
    pub threads: usize,
}

impl Default for IoParams {
    fn default() -> Self {
        IoParams {
            max_requests: 64,
            threads: 2,
        }
    }
}

struct AsyncReader {
    pool: ThreadPool,
    max_requests: usize,
    inflight: Arc<AtomicUsize>,
}

lazy_static! {
    static ref PARAMS: Mutex<IoParams> = Mutex::new(IoParams::default());
    static ref READER: Mutex<Option<Arc<AsyncReader>>> = Mutex::new(None);
}

/// Configures the read table. This must happen before the first read is
/// issued; afterwards the table is latched and this fails.
pub fn setup(params: IoParams) -> Result<()> {
    let reader = READER.lock().unwrap();
    if reader.is_some() {
        return Err(Error::Malformed(
            "the async read table has been started already".into(),
        ));
    }

    *PARAMS.lock().unwrap() = params;
    Ok(())
}

fn reader() -> Result<Arc<AsyncReader>> {
    let mut reader = READER.lock().unwrap();
    if let Some(ref v) = *reader {
        return Ok(v.clone());
    }

    let params = *PARAMS.lock().unwrap();
    let v = Arc::new(AsyncReader {
        pool: ThreadPool::new("lodestone-io", params.threads, None)?,
        max_requests: params.max_requests.max(1),
        inflight: Arc::new(AtomicUsize::new(0)),
    });

    info!(
        "Started async read table with {} entries and {} threads.",
        v.max_requests,
        v.pool.len()
    );

    *reader = Some(v.clone());
    Ok(v)
}

/// Returns the number of table entries currently held.
pub fn inflight() -> usize {
    READER
        .lock()
        .unwrap()
        .as_ref()
        .map(|v| v.inflight.load(Ordering::SeqCst))
        .unwrap_or(0)
}

struct Ticket(Arc<AtomicUsize>);

impl Drop for Ticket {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A read in flight. You should check the completion status with `poll`, or
/// block on it with `wait`.
pub struct ReadRequest {
    latch: Arc<LockLatch<Result<Buffer>>>,
    aborted: Arc<AtomicBool>,
    _ticket: Ticket,
}

impl ReadRequest {
    /// Returns true if the read has finished, successfully or not.
    #[inline]
    pub fn poll(&self) -> bool {
        self.latch.is_set()
    }

    /// Blocks until the read has finished and returns the filled buffer.
    pub fn wait(self) -> Result<Buffer> {
        self.latch.wait();
        self.latch.take().unwrap_or_else(|| {
            Err(Error::Malformed("read result has been taken".into()))
        })
    }

    /// Cancels the read if it has not started yet. A read which is already
    /// executing runs to completion.
    #[inline]
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }
}

/// Queues a read of `len` bytes at `offset` of `file` into the front of `buf`.
/// When the table is full (or could not be started) the buffer is handed back
/// untouched.
pub fn read_async(
    file: &FileHandle,
    offset: u64,
    len: usize,
    buf: Buffer,
) -> ::std::result::Result<ReadRequest, Buffer> {
    if len > buf.len() {
        return Err(buf);
    }

    let reader = match reader() {
        Ok(v) => v,
        Err(err) => {
            error!("{}", err);
            return Err(buf);
        }
    };

    let claimed = reader
        .inflight
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            if n < reader.max_requests {
                Some(n + 1)
            } else {
                None
            }
        })
        .is_ok();

    if !claimed {
        trace!("Async read table is full ({} entries).", reader.max_requests);
        return Err(buf);
    }

    let latch = Arc::new(LockLatch::new());
    let aborted = Arc::new(AtomicBool::new(false));
    let req = ReadRequest {
        latch: latch.clone(),
        aborted: aborted.clone(),
        _ticket: Ticket(reader.inflight.clone()),
    };

    let file = file.clone();
    let mut buf = buf;
    reader.pool.spawn(move || {
        if aborted.load(Ordering::SeqCst) {
            latch.set(Err(Error::IO(::std::io::Error::new(
                ::std::io::ErrorKind::Interrupted,
                "read aborted",
            ))));
            return;
        }

        let rsp = file.read_exact_at(&mut buf[..len], offset).map(|_| buf);
        latch.set(rsp);
    });

    Ok(req)
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    #[test]
    fn read_and_wait() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello, async world").unwrap();
        tmp.flush().unwrap();

        let file = FileHandle::open(tmp.path()).unwrap();
        let buf = Buffer::try_new(16, 1).unwrap();
        let req = read_async(&file, 7, 5, buf).unwrap();

        let buf = req.wait().unwrap();
        assert_eq!(&buf[..5], b"async");
        assert!(buf[5..].iter().all(|&v| v == 0));
    }

    #[test]
    fn abort_before_run() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"never read").unwrap();
        tmp.flush().unwrap();
        let file = FileHandle::open(tmp.path()).unwrap();

        // Parks every reader so the read below stays queued.
        let pool = reader().unwrap();
        let gate = Arc::new(LockLatch::new());
        let parked = Arc::new(AtomicUsize::new(0));
        for _ in 0..pool.pool.len() {
            let gate = gate.clone();
            let parked = parked.clone();
            pool.pool.spawn(move || {
                parked.fetch_add(1, Ordering::SeqCst);
                gate.wait();
            });
        }

        while parked.load(Ordering::SeqCst) < pool.pool.len() {
            ::std::thread::yield_now();
        }

        let buf = Buffer::try_new(5, 1).unwrap();
        let req = read_async(&file, 0, 5, buf).unwrap();
        assert!(!req.poll());
        req.abort();
        gate.set(());

        match req.wait() {
            Err(Error::IO(err)) => assert_eq!(err.kind(), ::std::io::ErrorKind::Interrupted),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn short_read_fails() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"tiny").unwrap();
        tmp.flush().unwrap();

        let file = FileHandle::open(tmp.path()).unwrap();
        let buf = Buffer::try_new(8, 1).unwrap();
        let req = read_async(&file, 0, 8, buf).unwrap();
        assert!(req.wait().is_err());
    }

    #[test]
    fn oversized_length_is_rejected() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"tiny").unwrap();
        tmp.flush().unwrap();

        let file = FileHandle::open(tmp.path()).unwrap();
        let buf = Buffer::try_new(2, 1).unwrap();
        let buf = read_async(&file, 0, 4, buf).err().unwrap();
        assert_eq!(buf.len(), 2);
    }
}
