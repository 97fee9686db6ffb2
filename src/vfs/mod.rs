//! Virtual file-system abstraction the storage core is written against, so fault injection
//! (`faulty`, behind `test-utils`) is a drop-in substitution rather than a parallel code path.

#[cfg(feature = "test-utils")]
mod faulty;
mod os;

#[cfg(feature = "test-utils")]
pub use faulty::{FailKind, FaultSchedule, FaultyVfs};
pub use os::OsVfs;

use crate::error::Result;
use std::path::Path;

/// A single open file handle, abstracted over the underlying storage.
pub trait VfsFile: Send {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    fn len(&mut self) -> Result<u64>;
    fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
    fn truncate(&mut self, len: u64) -> Result<()>;

    /// Positional read that fails if fewer than `buf.len()` bytes are available.
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let n = self.read_at(offset, buf)?;
        if n != buf.len() {
            return Err(crate::error::DecentError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "short read",
            )));
        }
        Ok(())
    }
}

/// Open mode for `Vfs::open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Fail if the file already exists.
    CreateNew,
    /// Open an existing file for read/write; fail if missing.
    OpenExisting,
}

/// Swappable file-I/O layer. The storage core never calls `std::fs` directly above this trait.
pub trait Vfs: Send + Sync {
    type File: VfsFile;

    fn open(&self, path: &Path, mode: OpenMode) -> Result<Self::File>;
    fn exists(&self, path: &Path) -> bool;
    fn remove(&self, path: &Path) -> Result<()>;
}
