use std::alloc::{self, Layout};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::slice;
use std::sync::Arc;

use super::allocator::Tracker;

/// An owned, fixed-size block of bytes with a guaranteed alignment.
pub struct Buffer {
    ptr: NonNull<u8>,
    len: usize,
    align: usize,
    tracker: Option<Arc<Tracker>>,
}

// `Buffer` owns its memory exclusively, like a `Box<[u8]>`.
unsafe impl Send for Buffer {}
unsafe impl Sync for Buffer {}

impl Buffer {
    /// Allocates `len` zero-filled bytes aligned to `align`, which must be a
    /// power of two. Returns `None` if the system allocator fails.
    pub fn try_new(len: usize, align: usize) -> Option<Self> {
        let align = align.max(1);
        if !align.is_power_of_two() {
            return None;
        }

        if len == 0 {
            return Some(Buffer {
                // An aligned, non-null address which is never dereferenced.
                ptr: NonNull::new(align as *mut u8)?,
                len: 0,
                align,
                tracker: None,
            });
        }

        let layout = Layout::from_size_align(len, align).ok()?;
        // Every byte is initialized, so the slice views below are sound.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };

        NonNull::new(ptr).map(|ptr| Buffer {
            ptr,
            len,
            align,
            tracker: None,
        })
    }

    /// Adopts the bytes of `v` without copying them.
    pub fn from_vec(v: Vec<u8>) -> Self {
        let boxed = v.into_boxed_slice();
        let len = boxed.len();

        if len == 0 {
            return Buffer {
                ptr: NonNull::dangling(),
                len: 0,
                align: 1,
                tracker: None,
            };
        }

        let ptr = Box::into_raw(boxed) as *mut u8;
        Buffer {
            ptr: unsafe { NonNull::new_unchecked(ptr) },
            len,
            align: 1,
            tracker: None,
        }
    }

    /// Copies `bytes` into a new buffer aligned to `align`.
    pub fn try_copy_from(bytes: &[u8], align: usize) -> Option<Self> {
        let mut buf = Buffer::try_new(bytes.len(), align)?;
        buf.copy_from_slice(bytes);
        Some(buf)
    }

    pub(crate) fn attach(&mut self, tracker: Arc<Tracker>) {
        self.tracker = Some(tracker);
    }

    /// Returns the number of bytes in this buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the alignment this buffer was allocated with.
    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }

    /// Returns the address of the first byte.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }
}

impl Deref for Buffer {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        if self.len == 0 {
            &[]
        } else {
            unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
        }
    }
}

impl DerefMut for Buffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        if self.len == 0 {
            &mut []
        } else {
            unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if self.len > 0 {
            unsafe {
                let layout = Layout::from_size_align_unchecked(self.len, self.align);
                alloc::dealloc(self.ptr.as_ptr(), layout);
            }
        }

        if let Some(tracker) = self.tracker.take() {
            tracker.release(self.len);
        }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len)
            .field("align", &self.align)
            .finish()
    }
}
