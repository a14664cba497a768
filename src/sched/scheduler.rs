use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_deque::{Injector, Steal};

use super::unwind;
use crate::errors::*;

/// A unit of work executed by a `ThreadPool`.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed set of worker threads pulling jobs from a shared FIFO queue. The
/// number of threads is decided at creation and never changes.
pub struct ThreadPool {
    shared: Arc<Shared>,
    threads: Vec<thread::JoinHandle<()>>,
}

struct Shared {
    injector: Injector<Job>,
    watcher: Watcher,
    terminated: AtomicBool,
}

impl ThreadPool {
    /// Spawns `num` worker threads named after `name`. `stack_size` overrides
    /// the platform's default thread stack size.
    pub fn new(name: &str, num: usize, stack_size: Option<usize>) -> Result<Self> {
        let shared = Arc::new(Shared {
            injector: Injector::new(),
            watcher: Watcher(Mutex::new(()), Condvar::new()),
            terminated: AtomicBool::new(false),
        });

        let mut pool = ThreadPool {
            shared,
            threads: Vec::with_capacity(num),
        };

        for i in 0..num.max(1) {
            let mut b = thread::Builder::new().name(format!("{}-{}", name, i));
            if let Some(stack_size) = stack_size {
                b = b.stack_size(stack_size);
            }

            let shared = pool.shared.clone();
            // Dropping a partially constructed pool joins the started threads.
            let handle = b.spawn(move || ThreadPool::main_loop(&shared))?;
            pool.threads.push(handle);
        }

        debug!("Spawned thread pool {} with {} workers.", name, pool.threads.len());
        Ok(pool)
    }

    /// Returns the number of worker threads.
    #[inline]
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// Push a job into the queue; it will be taken by whatever worker has
    /// nothing to do.
    pub fn spawn<F>(&self, func: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.injector.push(Box::new(func));
        self.shared.watcher.notify_one();
    }

    fn main_loop(shared: &Shared) {
        let mut ms = 1;

        loop {
            match shared.injector.steal() {
                Steal::Success(job) => {
                    if let Err(err) = unwind::halt_unwinding(job) {
                        error!(
                            "Job panicked on {:?}: {}",
                            thread::current().name(),
                            unwind::panic_message(err.as_ref())
                        );
                    }

                    ms = 1;
                }
                Steal::Retry => {}
                Steal::Empty => {
                    if shared.terminated.load(Ordering::SeqCst) {
                        return;
                    }

                    shared.watcher.wait_timeout(ms);
                    ms = (ms * 2).min(48);
                }
            }
        }
    }
}

impl Drop for ThreadPool {
    /// Blocks current thread until all the workers drained the queue.
    fn drop(&mut self) {
        self.shared.terminated.store(true, Ordering::SeqCst);
        self.shared.watcher.notify_all();

        for v in self.threads.drain(..) {
            let _ = v.join();
        }
    }
}

struct Watcher(Mutex<()>, Condvar);

impl Watcher {
    #[inline]
    fn wait_timeout(&self, ms: u64) {
        let duration = Duration::from_millis(ms);
        let v = self.0.lock().unwrap();
        let _ = self.1.wait_timeout(v, duration);
    }

    #[inline]
    fn notify_one(&self) {
        self.1.notify_one()
    }

    #[inline]
    fn notify_all(&self) {
        self.1.notify_all()
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicUsize;

    use super::super::latch::LockLatch;
    use super::*;

    #[test]
    fn run_jobs() {
        let pool = ThreadPool::new("test", 3, None).unwrap();
        assert_eq!(pool.len(), 3);

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..64 {
            let counter = counter.clone();
            pool.spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 64);
    }

    #[test]
    fn survive_panics() {
        let pool = ThreadPool::new("panic", 1, None).unwrap();
        pool.spawn(|| panic!("expected"));

        let latch = Arc::new(LockLatch::new());
        let tx = latch.clone();
        pool.spawn(move || tx.set(()));
        latch.wait();
    }
}
