//! A minimal archive package.
//!
//! ```text
//! +----------+------------------+-------+-------+-----+----------------+
//! | MAGIC    | index offset     | blob  | blob  | ... | index          |
//! | [u8; 8]  | u64 little-endian|       |       |     | bincode        |
//! +----------+------------------+-------+-------+-----+----------------+
//! ```
//!
//! Every blob is either stored as is, or as a raw deflate stream.

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use super::deflate::{self, Inflater};
use super::{Decompressor, PackageFileInfo, PackageModule};
use crate::errors::*;
use crate::io::prelude::FileHandle;
use crate::utils::prelude::FastHashMap;

pub const MAGIC: [u8; 8] = [
    'L' as u8, 'D' as u8, 'S' as u8, 'T' as u8, ' ' as u8, 0, 0, 1,
];

const HEADER_SIZE: u64 = 16;

/// Stack size a thread needs to inflate an archive entry.
pub const DECOMPRESS_STACK_SIZE: usize = 64 * 1024;

/// One entry of the archive index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub path: String,
    pub offset: u64,
    pub length: u64,
    pub compressed: bool,
    pub size: u64,
}

/// Writes archives readable by `ArchivePackage`.
#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    entries: Vec<ArchiveEntry>,
    blobs: Vec<u8>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        ArchiveBuilder::default()
    }

    /// Appends an entry. Compressed entries are stored as raw deflate streams.
    pub fn add<T: Into<String>>(&mut self, path: T, bytes: &[u8], compress: bool) -> Result<&mut Self> {
        let path = path.into();
        if self.entries.iter().any(|v| v.path == path) {
            return Err(Error::Package(format!("duplicated archive entry '{}'", path)));
        }

        let stored = if compress {
            deflate::compress(bytes)?
        } else {
            bytes.to_vec()
        };

        self.entries.push(ArchiveEntry {
            path,
            offset: HEADER_SIZE + self.blobs.len() as u64,
            length: stored.len() as u64,
            compressed: compress,
            size: bytes.len() as u64,
        });

        self.blobs.extend_from_slice(&stored);
        Ok(self)
    }

    /// Writes the whole archive into `w`.
    pub fn finish<W: Write>(&self, mut w: W) -> Result<()> {
        w.write_all(&MAGIC)?;
        w.write_u64::<LittleEndian>(HEADER_SIZE + self.blobs.len() as u64)?;
        w.write_all(&self.blobs)?;
        bincode::serialize_into(&mut w, &self.entries)?;
        w.flush()?;
        Ok(())
    }

    /// Writes the whole archive into a file at `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = fs::File::create(path)?;
        self.finish(::std::io::BufWriter::new(file))
    }
}

struct Index {
    file: FileHandle,
    entries: Vec<ArchiveEntry>,
    lookup: FastHashMap<String, usize>,
}

/// A package backed by an archive file on the host. The index is read when
/// the package is registered, and dropped when it is unregistered.
pub struct ArchivePackage {
    prefix: String,
    path: PathBuf,
    index: RwLock<Option<Index>>,
}

impl ArchivePackage {
    pub fn new<T: Into<String>, P: Into<PathBuf>>(prefix: T, path: P) -> Self {
        ArchivePackage {
            prefix: prefix.into(),
            path: path.into(),
            index: RwLock::new(None),
        }
    }

    /// Returns the host path of the archive.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_index(&self) -> Result<Index> {
        let file = FileHandle::open(&self.path)?;
        if file.size() < HEADER_SIZE {
            return Err(Error::Malformed(format!(
                "{:?} is too small to be an archive",
                self.path
            )));
        }

        let mut header = [0; HEADER_SIZE as usize];
        file.read_exact_at(&mut header, 0)?;

        // MAGIC: [u8; 8]
        if header[0..8] != MAGIC[..] {
            return Err(Error::Malformed(format!(
                "{:?} MAGIC number not match",
                self.path
            )));
        }

        let offset = Cursor::new(&header[8..]).read_u64::<LittleEndian>()?;
        if offset < HEADER_SIZE || offset > file.size() {
            return Err(Error::Malformed(format!(
                "{:?} index offset {} is out of bounds",
                self.path, offset
            )));
        }

        let mut bytes = vec![0; (file.size() - offset) as usize];
        file.read_exact_at(&mut bytes, offset)?;
        let entries: Vec<ArchiveEntry> = bincode::deserialize(&bytes)?;

        let mut lookup = FastHashMap::default();
        for (i, v) in entries.iter().enumerate() {
            let end = v.offset.checked_add(v.length);
            if v.offset < HEADER_SIZE || end.map_or(true, |end| end > offset) {
                return Err(Error::Malformed(format!(
                    "{:?} entry '{}' is out of bounds",
                    self.path, v.path
                )));
            }

            lookup.insert(v.path.clone(), i);
        }

        Ok(Index {
            file,
            entries,
            lookup,
        })
    }
}

impl PackageModule for ArchivePackage {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn init(&self) -> Result<()> {
        let index = self.read_index()?;
        info!(
            "Mounted archive {:?} with {} entries.",
            self.path,
            index.entries.len()
        );

        *self.index.write().unwrap() = Some(index);
        Ok(())
    }

    fn cleanup(&self) {
        *self.index.write().unwrap() = None;
    }

    fn list(&self) -> Box<dyn Iterator<Item = String> + '_> {
        let names: Vec<_> = self
            .index
            .read()
            .unwrap()
            .as_ref()
            .map(|v| v.entries.iter().map(|e| e.path.clone()).collect())
            .unwrap_or_default();

        Box::new(names.into_iter())
    }

    fn file_info(&self, path: &str) -> Option<PackageFileInfo> {
        let index = self.index.read().unwrap();
        let index = index.as_ref()?;
        let entry = &index.entries[*index.lookup.get(path.trim_start_matches('/'))?];

        Some(PackageFileInfo {
            file: index.file.clone(),
            offset: entry.offset,
            length: entry.length,
            compressed: entry.compressed,
            size: entry.size,
        })
    }

    fn decompress_stack_size(&self) -> usize {
        DECOMPRESS_STACK_SIZE
    }

    fn decompress_init(&self) -> Option<Box<dyn Decompressor>> {
        Some(Box::new(Inflater::new()))
    }
}
