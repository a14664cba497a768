//! # Lodestone
//!
//! An asynchronous resource manager for games. It loads raw data, textures,
//! fonts and sounds from the host filesystem or from pluggable packages,
//! shares them between independently owned managers with strong and weak
//! links, and optionally inflates compressed package entries on background
//! worker threads.
//!
//! The building blocks, leaves first:
//!
//! * `memory`: the allocation seam every payload goes through.
//! * `io`: host files and the bounded async read table.
//! * `package`: package modules and their decompressors.
//! * `res`: resource managers, links, loads and synchronization marks.
//!
//! ```rust,ignore
//! use lodestone::prelude::*;
//!
//! let manager = ResourceManager::new(ResourceParams::default());
//! let id = manager.load_data("host:/tmp/level.bin", 16, AllocFlags::default())?;
//! manager.wait(manager.mark());
//! assert!(manager.get_data(id).is_some());
//! ```

#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

#[macro_use]
pub mod utils;
pub mod errors;
pub mod io;
pub mod memory;
pub mod package;
pub mod res;
pub mod sched;

pub mod prelude {
    pub use crate::errors::{Error, Result};
    pub use crate::memory::prelude::*;
    pub use crate::package::prelude::*;
    pub use crate::res::prelude::*;
}
