use std::sync::{Condvar, Mutex};

/// We define various kinds of latches, which are all a primitive signaling
/// mechanism. A latch starts as unset. Eventually someone calls `set()` and
/// it becomes set. You can test if it has been set by calling `is_set()`.
pub trait Latch {
    /// Test if the latch is set.
    fn is_set(&self) -> bool;
}

enum LatchState<T> {
    NotReady,
    Ok(T),
    Taken,
}

/// A latch which carries a value from the thread that sets it to the thread
/// that consumes it. You can block until it becomes set.
pub struct LockLatch<T> {
    m: Mutex<LatchState<T>>,
    v: Condvar,
}

impl<T> LockLatch<T> {
    #[inline]
    pub fn new() -> Self {
        LockLatch {
            m: Mutex::new(LatchState::NotReady),
            v: Condvar::new(),
        }
    }

    /// Set the latch with `value`, waking up all the waiting threads.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.m.lock().unwrap();
            *guard = LatchState::Ok(value);
        }

        self.v.notify_all();
    }

    /// Block until latch is set.
    pub fn wait(&self) {
        let mut guard = self.m.lock().unwrap();
        while let LatchState::NotReady = *guard {
            guard = self.v.wait(guard).unwrap();
        }
    }

    /// Takes the value out of a set latch. Returns `None` if the latch is not
    /// set yet, or if the value has been taken already.
    pub fn take(&self) -> Option<T> {
        let mut guard = self.m.lock().unwrap();
        match ::std::mem::replace(&mut *guard, LatchState::Taken) {
            LatchState::Ok(value) => Some(value),
            LatchState::NotReady => {
                *guard = LatchState::NotReady;
                None
            }
            LatchState::Taken => None,
        }
    }
}

impl<T> Latch for LockLatch<T> {
    #[inline]
    fn is_set(&self) -> bool {
        let guard = self.m.lock().unwrap();
        match *guard {
            LatchState::NotReady => false,
            _ => true,
        }
    }
}

impl<T> Default for LockLatch<T> {
    fn default() -> Self {
        LockLatch::new()
    }
}
