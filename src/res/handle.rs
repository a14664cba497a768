//! Guards which free their resource id when the last clone is dropped.

use std::fmt;
use std::sync::Arc;

use super::factory::{FontHandle, SoundHandle, TextureHandle};
use super::id::{ResourceId, ResourceState};
use super::manager::{ResourceManager, Shared};
use super::payload::Data;
use crate::errors::*;

struct Guard {
    manager: Arc<Shared>,
    id: ResourceId,
}

impl Drop for Guard {
    fn drop(&mut self) {
        self.manager.free(self.id);
    }
}

/// A strong reference to a resource. Clones share the same id, which is
/// freed when the last clone is dropped.
#[derive(Clone)]
pub struct Resource {
    guard: Arc<Guard>,
}

impl Resource {
    pub(crate) fn adopt(manager: Arc<Shared>, id: ResourceId) -> Self {
        Resource {
            guard: Arc::new(Guard { manager, id }),
        }
    }

    #[inline]
    pub fn id(&self) -> ResourceId {
        self.guard.id
    }

    pub fn state(&self) -> Option<ResourceState> {
        self.guard.manager.state(self.guard.id)
    }

    pub fn get_data(&self) -> Option<Data> {
        self.guard.manager.try_get_data(self.guard.id).ok()
    }

    pub fn get_texture(&self) -> Option<TextureHandle> {
        self.guard.manager.try_get_texture(self.guard.id).ok()
    }

    pub fn get_font(&self) -> Option<FontHandle> {
        self.guard.manager.try_get_font(self.guard.id).ok()
    }

    pub fn get_sound(&self) -> Option<SoundHandle> {
        self.guard.manager.try_get_sound(self.guard.id).ok()
    }

    /// Creates a strong link to this resource in `dst`.
    pub fn link_into(&self, dst: &ResourceManager) -> Result<Resource> {
        let id = dst.link_from_shared(&self.guard.manager, self.guard.id)?;
        dst.guard(id)
    }

    /// Creates a weak link to this resource in the same manager.
    pub fn downgrade(&self) -> Result<WeakResource> {
        let manager = &self.guard.manager;
        let id = manager.link_weak(manager, self.guard.id)?;
        Ok(WeakResource::adopt(manager.clone(), id))
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Resource").field(&self.guard.id).finish()
    }
}

/// A weak reference to a resource, which does not keep it alive.
#[derive(Clone)]
pub struct WeakResource {
    guard: Arc<Guard>,
}

impl WeakResource {
    pub(crate) fn adopt(manager: Arc<Shared>, id: ResourceId) -> Self {
        WeakResource {
            guard: Arc::new(Guard { manager, id }),
        }
    }

    #[inline]
    pub fn id(&self) -> ResourceId {
        self.guard.id
    }

    /// Returns true once the resource has been released.
    pub fn is_stale(&self) -> bool {
        self.guard.manager.is_stale(self.guard.id)
    }

    /// Creates a new strong reference, unless the resource has been released.
    pub fn upgrade(&self) -> Result<Resource> {
        let manager = &self.guard.manager;
        let id = manager.link(manager, self.guard.id)?;
        Ok(Resource::adopt(manager.clone(), id))
    }
}

impl fmt::Debug for WeakResource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("WeakResource").field(&self.guard.id).finish()
    }
}
