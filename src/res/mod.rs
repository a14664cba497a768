//! The resource manager: loading, sharing and releasing game resources.
//!
//! # Resource
//!
//! A resource is any piece of data a program needs at runtime: raw bytes, a
//! texture, a font or a sound. Resources live in a `ResourceManager`, which
//! names every resource with a `ResourceId`. Ids are small generational
//! handles, which makes it safe to keep them around after the resource has
//! been freed: a stale id is rejected instead of pointing at something else.
//!
//! # Names
//!
//! Resources are loaded by name. A name is resolved through the registered
//! package modules first, then as a host path (see `resolve`). For example,
//! with an archive registered under `"pkg:"`,
//!
//! ```sh
//! "pkg:textures/crate.png"   => entry "textures/crate.png" of the archive
//! "host:/tmp/crate.png"      => the host file "/tmp/crate.png"
//! "textures/crate.png"       => "<resource root>/textures/crate.png"
//! ```
//!
//! # Loading
//!
//! Loads are asynchronous. `load_*` returns an id immediately; the resource
//! becomes usable once a `sync` or `wait` with a mark taken after the load
//! has been issued completes it:
//!
//! ```rust,ignore
//! let id = manager.load_data("level.bin", 16, AllocFlags::default())?;
//! let mark = manager.mark();
//! manager.wait(mark);
//! let data = manager.get_data(id);
//! ```
//!
//! # Ownership & Lifetime
//!
//! Every resource keeps a count of its strong references: the id returned
//! by the call which created it, plus every strong link. Links may live in
//! other managers. The resource is released when the last strong reference
//! is freed, at which point all weak links to it turn stale.
//!
//! `Resource` and `WeakResource` wrap ids into guards which free them when
//! dropped.

pub mod background;
pub mod factory;
pub mod id;
pub mod manager;
pub mod registry;
pub mod resolve;
pub mod settings;

mod handle;
mod load;
mod payload;
mod table;

pub use self::background::{background_decompression, set_background_decompression};
pub use self::id::{ManagerId, Mark, ResourceId, ResourceKind, ResourceState};

pub mod prelude {
    pub use super::background::DecompressionParams;
    pub use super::factory::{
        Factory, FontDesc, FontHandle, HeadlessFactory, SoundHandle, TextureDesc, TextureFormat,
        TextureHandle, TextureParams,
    };
    pub use super::handle::{Resource, WeakResource};
    pub use super::id::{ManagerId, Mark, ResourceId, ResourceKind, ResourceState};
    pub use super::manager::{ResourceManager, ResourceParams};
    pub use super::payload::Data;
    pub use super::settings::Settings;
}
