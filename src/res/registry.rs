//! Process-wide lookup of live resource managers.
//!
//! Links between managers are stored as `{manager, record}` pairs and
//! resolved here. A manager enters the registry when it is created and leaves
//! it once it has been destroyed *and* its last record has been released,
//! which may be later than its destruction if other managers still hold
//! strong links to its records.

use std::sync::{Arc, RwLock};

use super::id::ManagerId;
use super::manager::Shared;
use crate::utils::prelude::FastHashMap;

lazy_static! {
    static ref MANAGERS: RwLock<FastHashMap<ManagerId, Arc<Shared>>> =
        RwLock::new(FastHashMap::default());
}

pub(crate) fn add(manager: Arc<Shared>) {
    MANAGERS.write().unwrap().insert(manager.id, manager);
}

pub(crate) fn remove(id: ManagerId) {
    if MANAGERS.write().unwrap().remove(&id).is_some() {
        debug!("{} left the manager registry.", id);
    }
}

#[inline]
pub(crate) fn get(id: ManagerId) -> Option<Arc<Shared>> {
    MANAGERS.read().unwrap().get(&id).cloned()
}

/// Number of managers which are still resolvable.
pub fn len() -> usize {
    MANAGERS.read().unwrap().len()
}
