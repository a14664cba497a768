use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

impl_handle!(ResourceId);
impl_handle!(RecordHandle);

/// Identifies one `ResourceManager` for the lifetime of the process. Ids are
/// never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManagerId(u32);

impl ManagerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        ManagerId(NEXT.fetch_add(1, Ordering::SeqCst))
    }
}

impl fmt::Display for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ResourceManager #{}", self.0)
    }
}

/// What a resource holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Data,
    Texture,
    Font,
    Sound,
    File,
}

/// Observable state of a resource id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// The load has been issued but not synchronized yet.
    Loading,
    Loaded,
    Failed,
    /// A weak link whose target has been released.
    Stale,
}

/// A watermark returned by `ResourceManager::mark`.
pub type Mark = u64;
