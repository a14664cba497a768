use smallvec::SmallVec;

use super::handle::HandleLike;
use super::handle_pool::{HandlePool, Iter};

/// Number of entries an `ObjectPool` stores inline before spilling onto the heap.
pub const INLINE_ENTRIES: usize = 16;

/// A named object collections. Every time u create or free a handle, a
/// attached instance `T` will be created/ freed.
///
/// The first `INLINE_ENTRIES` entries live inside the pool itself, larger pools
/// transparently move their entries onto the heap.
pub struct ObjectPool<H: HandleLike, T: Sized> {
    handles: HandlePool<H>,
    entries: SmallVec<[Option<T>; INLINE_ENTRIES]>,
}

impl<H: HandleLike, T: Sized> ObjectPool<H, T> {
    /// Constructs a new, empty `ObjectPool`.
    pub fn new() -> Self {
        ObjectPool {
            handles: HandlePool::new(),
            entries: SmallVec::new(),
        }
    }

    /// Constructs a new `ObjectPool` with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        ObjectPool {
            handles: HandlePool::with_capacity(capacity),
            entries: SmallVec::with_capacity(capacity),
        }
    }

    /// Creates a `T` and named it with `Handle`.
    pub fn create(&mut self, value: T) -> H {
        let handle = self.handles.create();

        if handle.index() as usize >= self.entries.len() {
            self.entries.push(Some(value));
        } else {
            self.entries[handle.index() as usize] = Some(value);
        }

        handle
    }

    /// Creates a `T` like `create`, but hands the value back instead of
    /// aborting when the backing storage can not grow.
    pub fn try_create(&mut self, value: T) -> Result<H, T> {
        if !self.handles.try_reserve(1) {
            return Err(value);
        }

        if self.entries.len() == self.handles.len() && self.entries.try_reserve(1).is_err() {
            return Err(value);
        }

        Ok(self.create(value))
    }

    /// Returns mutable reference to internal value with name `Handle`.
    #[inline]
    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        if self.handles.contains(handle) {
            self.entries[handle.index() as usize].as_mut()
        } else {
            None
        }
    }

    /// Returns immutable reference to internal value with name `Handle`.
    #[inline]
    pub fn get(&self, handle: H) -> Option<&T> {
        if self.handles.contains(handle) {
            self.entries[handle.index() as usize].as_ref()
        } else {
            None
        }
    }

    /// Returns true if this `Handle` was created by `ObjectPool`, and has not been
    /// freed yet.
    #[inline]
    pub fn contains(&self, handle: H) -> bool {
        self.handles.contains(handle)
    }

    /// Recycles the value with name `Handle`.
    #[inline]
    pub fn free(&mut self, handle: H) -> Option<T> {
        if self.handles.free(handle) {
            self.entries[handle.index() as usize].take()
        } else {
            None
        }
    }

    /// Returns the total number of alive handle in this `ObjectPool`.
    #[inline]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Checks if the pool is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if the entries have spilled out of the inline storage.
    #[inline]
    pub fn spilled(&self) -> bool {
        self.entries.spilled()
    }

    /// Drops every entry and gives heap storage back, returning to the
    /// inline buffer. Outstanding handles become invalid.
    pub fn reset(&mut self) {
        self.handles.clear();
        self.entries.clear();
        self.entries.shrink_to_fit();
    }

    /// Returns an iterator over the alive handles of this `ObjectPool`.
    #[inline]
    pub fn iter(&self) -> Iter<H> {
        self.handles.iter()
    }
}

impl<H: HandleLike, T: Sized> Default for ObjectPool<H, T> {
    fn default() -> Self {
        ObjectPool::new()
    }
}

#[cfg(test)]
mod test {
    use super::super::handle::Handle;
    use super::*;

    #[test]
    fn basic() {
        let mut set = ObjectPool::<Handle, i32>::new();

        let e1 = set.create(3);
        assert_eq!(set.get(e1), Some(&3));
        assert_eq!(set.len(), 1);
        assert_eq!(set.free(e1), Some(3));
        assert_eq!(set.len(), 0);
        assert_eq!(set.get(e1), None);
        assert_eq!(set.free(e1), None);
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn reuse_rejects_old_handles() {
        let mut set = ObjectPool::<Handle, &'static str>::new();

        let e1 = set.create("a");
        set.free(e1);
        let e2 = set.create("b");

        assert_eq!(e1.index(), e2.index());
        assert_ne!(e1.version(), e2.version());
        assert_eq!(set.get(e1), None);
        assert_eq!(set.get(e2), Some(&"b"));
    }

    #[test]
    fn spill_and_reset() {
        let mut set = ObjectPool::<Handle, usize>::new();
        for i in 0..INLINE_ENTRIES {
            set.try_create(i).unwrap();
        }
        assert!(!set.spilled());

        let last = set.try_create(INLINE_ENTRIES).unwrap();
        assert!(set.spilled());
        assert_eq!(set.get(last), Some(&INLINE_ENTRIES));

        set.reset();
        assert!(set.is_empty());
        assert!(!set.spilled());
        assert_eq!(set.get(last), None);
    }
}
