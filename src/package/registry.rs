//! The process-wide list of registered package modules.
//!
//! The registry is created on first use and lives until the process exits;
//! `shutdown` unregisters everything explicitly. Resolution walks the list
//! from the most recently registered module. Registering or unregistering
//! modules while loads are being resolved on other threads is allowed by the
//! lock, but a module being unregistered may still be used by loads which
//! resolved through it earlier.

use std::sync::{Arc, RwLock};

use super::PackageModule;
use crate::errors::*;

struct PackageRegistry {
    modules: RwLock<Vec<Arc<dyn PackageModule>>>,
}

lazy_static! {
    static ref REGISTRY: PackageRegistry = PackageRegistry {
        modules: RwLock::new(Vec::new()),
    };
}

#[inline]
fn addr<T: ?Sized>(v: &Arc<T>) -> *const u8 {
    Arc::as_ptr(v) as *const u8
}

/// Registers a package module. Its `init` is called first; a module whose
/// `init` fails is not registered.
///
/// `init` runs with the registry locked, so it must not register, unregister
/// or resolve anything itself.
pub fn register<T: PackageModule>(module: Arc<T>) -> Result<()> {
    let module: Arc<dyn PackageModule> = module;

    let mut modules = REGISTRY.modules.write().unwrap();
    if modules.iter().any(|v| addr(v) == addr(&module)) {
        return Err(Error::Package(format!(
            "module with prefix '{}' has been registered already",
            module.prefix()
        )));
    }

    module.init()?;

    info!("Registers package module with prefix '{}'.", module.prefix());
    modules.push(module);
    Ok(())
}

/// Unregisters a package module and calls its `cleanup`. Returns false if the
/// module was not registered.
pub fn unregister<T: PackageModule>(module: &Arc<T>) -> bool {
    let removed = {
        let mut modules = REGISTRY.modules.write().unwrap();
        modules
            .iter()
            .position(|v| addr(v) == addr(module))
            .map(|index| modules.remove(index))
    };

    match removed {
        Some(module) => {
            info!("Unregisters package module with prefix '{}'.", module.prefix());
            module.cleanup();
            true
        }
        None => false,
    }
}

/// Unregisters every module, newest first.
pub fn shutdown() {
    let modules: Vec<_> = REGISTRY.modules.write().unwrap().drain(..).collect();
    for v in modules.into_iter().rev() {
        v.cleanup();
    }
}

/// Finds the module claiming `name`, most recently registered first. Returns
/// the module and the remainder of `name` after its prefix.
pub fn find(name: &str) -> Option<(Arc<dyn PackageModule>, &str)> {
    let modules = REGISTRY.modules.read().unwrap();
    modules
        .iter()
        .rev()
        .find(|v| name.starts_with(v.prefix()))
        .map(|v| (v.clone(), &name[v.prefix().len()..]))
}

/// The largest worker stack any registered module asks for.
pub fn max_decompress_stack_size() -> usize {
    REGISTRY
        .modules
        .read()
        .unwrap()
        .iter()
        .map(|v| v.decompress_stack_size())
        .max()
        .unwrap_or(0)
}
