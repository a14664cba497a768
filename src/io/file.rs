use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::errors::*;

/// A shareable handle to an opened host file. Reads take an explicit offset
/// and never disturb each other, but reads through one handle are serialized.
#[derive(Clone)]
pub struct FileHandle(Arc<HostFile>);

struct HostFile {
    path: PathBuf,
    file: Mutex<File>,
    size: u64,
}

impl FileHandle {
    /// Opens the host file at `path` for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        let metadata = file.metadata()?;
        if metadata.is_dir() {
            return Err(Error::NotFound(path.display().to_string()));
        }

        Ok(FileHandle(Arc::new(HostFile {
            path: path.to_owned(),
            file: Mutex::new(file),
            size: metadata.len(),
        })))
    }

    /// Returns the host path this handle was opened from.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.0.path
    }

    /// Returns the size of the file at the time it was opened.
    #[inline]
    pub fn size(&self) -> u64 {
        self.0.size
    }

    /// Reads up to `buf.len()` bytes starting at `offset`. Returns the number
    /// of bytes read, which is only short at the end of the file.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut file = self.0.file.lock().unwrap();
        file.seek(SeekFrom::Start(offset))?;

        let mut total = 0;
        while total < buf.len() {
            match file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }

        Ok(total)
    }

    /// Fills `buf` completely from `offset`, failing on a short read.
    pub fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        let n = self.read_at(buf, offset)?;
        if n < buf.len() {
            let err = io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "short read from {:?}: {} of {} bytes at offset {}",
                    self.path(),
                    n,
                    buf.len(),
                    offset
                ),
            );

            return Err(err.into());
        }

        Ok(())
    }

    /// Returns true if both handles refer to the same opened file.
    #[inline]
    pub fn same(&self, rhs: &FileHandle) -> bool {
        Arc::ptr_eq(&self.0, &rhs.0)
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.0.path)
            .field("size", &self.0.size)
            .finish()
    }
}
