#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A package prefix no other test in this binary uses.
pub fn unique_prefix(name: &str) -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!("{}{}:", name, COUNTER.fetch_add(1, Ordering::SeqCst))
}

pub fn write<P: AsRef<Path>>(dir: P, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.as_ref().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }

    fs::write(&path, bytes).unwrap();
    path
}

/// Bytes which compress well, but not trivially.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 7) ^ (i >> 5)) as u8).collect()
}

pub fn host(path: &Path) -> String {
    format!("host:{}", path.display())
}
