//! Maps resource names onto the bytes behind them.
//!
//! Names are resolved in this order, the first matching rule wins:
//!
//! 1. Registered packages, the most recently registered first. A name
//!    starting with the prefix of a package is looked up inside that package
//!    only.
//! 2. `host:` followed by a host path, relative or absolute.
//! 3. An absolute host path, starting with `/`.
//! 4. Anything else is relative to the resource root.
//!
//! Since packages come first, a package registered with an empty prefix
//! shadows all of the other rules, including `host:` and `/`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::*;
use crate::io::prelude::FileHandle;
use crate::package::{self, PackageFileInfo, PackageModule};

/// The environment variable that overrides the default resource root.
pub const ROOT_ENV: &str = "LODESTONE_RESOURCE_ROOT";

/// The prefix for names that are host paths.
pub const HOST_PREFIX: &str = "host:";

/// A resolved resource name.
#[derive(Clone)]
pub(crate) struct Source {
    pub info: PackageFileInfo,
    /// The package the bytes come from, which also decompresses them.
    pub module: Option<Arc<dyn PackageModule>>,
}

pub(crate) enum Location {
    Package(Arc<dyn PackageModule>, String),
    Host(PathBuf),
}

/// The root used when a manager is not given one: `LODESTONE_RESOURCE_ROOT`
/// if set, otherwise the directory of the executable.
pub fn default_root() -> PathBuf {
    if let Some(v) = env::var_os(ROOT_ENV) {
        return PathBuf::from(v);
    }

    env::current_exe()
        .ok()
        .and_then(|v| v.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub(crate) fn locate(root: &Path, name: &str) -> Location {
    if let Some((module, rest)) = package::registry::find(name) {
        return Location::Package(module, rest.to_owned());
    }

    if name.starts_with(HOST_PREFIX) {
        return Location::Host(PathBuf::from(&name[HOST_PREFIX.len()..]));
    }

    if name.starts_with('/') {
        return Location::Host(PathBuf::from(name));
    }

    Location::Host(root.join(name))
}

pub(crate) fn resolve(root: &Path, name: &str) -> Result<Source> {
    match locate(root, name) {
        Location::Package(module, path) => match module.file_info(&path) {
            Some(info) => Ok(Source {
                info,
                module: Some(module),
            }),
            None => Err(Error::NotFound(name.to_owned())),
        },
        Location::Host(path) => {
            let file = FileHandle::open(&path).map_err(|err| {
                trace!("Could not open {:?}: {}", path, err);
                Error::NotFound(name.to_owned())
            })?;

            let size = file.size();
            Ok(Source {
                info: PackageFileInfo {
                    file,
                    offset: 0,
                    length: size,
                    compressed: false,
                    size,
                },
                module: None,
            })
        }
    }
}

/// Lists the names of the files under `dir`, recursively. Every returned name
/// resolves to its file with the same rules.
pub(crate) fn list(root: &Path, dir: &str) -> Result<Vec<String>> {
    match locate(root, dir) {
        Location::Package(module, path) => {
            let base = &dir[..dir.len() - path.len()];
            let mut path = path.trim_start_matches('/').to_owned();
            if !path.is_empty() && !path.ends_with('/') {
                path.push('/');
            }

            let mut names: Vec<_> = module
                .list()
                .filter(|v| v.trim_start_matches('/').starts_with(&path))
                .map(|v| format!("{}{}", base, v))
                .collect();

            names.sort();
            Ok(names)
        }
        Location::Host(path) => {
            if !path.is_dir() {
                return Err(Error::NotFound(dir.to_owned()));
            }

            let prefix = if dir.is_empty() || dir.ends_with('/') || dir.ends_with(':') {
                dir.to_owned()
            } else {
                format!("{}/", dir)
            };

            let mut names = Vec::new();
            let mut dirs = vec![(path, prefix)];
            while let Some((path, prefix)) = dirs.pop() {
                for entry in fs::read_dir(&path)? {
                    let entry = entry?;
                    let name = match entry.file_name().to_str() {
                        Some(v) => format!("{}{}", prefix, v),
                        None => continue,
                    };

                    if entry.file_type()?.is_dir() {
                        dirs.push((entry.path(), format!("{}/", name)));
                    } else {
                        names.push(name);
                    }
                }
            }

            names.sort();
            Ok(names)
        }
    }
}
