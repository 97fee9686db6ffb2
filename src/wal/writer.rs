//! Append-only WAL writer: length-prefixed frames, one `fsync` per `sync()` call. Frame
//! checksums use `crc32c`, the same crate as the page header.
//!
//! Frame layout: `[frame_len: u32][record bytes][crc32c: u32]`. `frame_len` covers the record
//! bytes only; the reader validates the trailing checksum before trusting the frame.

use crate::error::Result;
use crate::vfs::{OpenMode, Vfs, VfsFile};
use crate::wal::record::{Lsn, WalRecord};
use std::path::Path;

pub struct WalWriter<V: Vfs> {
    file: V::File,
    current_lsn: Lsn,
    next_offset: u64,
}

impl<V: Vfs> WalWriter<V> {
    /// Create a fresh, empty WAL file.
    pub fn create(vfs: &V, path: &Path) -> Result<Self> {
        let file = vfs.open(path, OpenMode::CreateNew)?;
        Ok(WalWriter {
            file,
            current_lsn: 0,
            next_offset: 0,
        })
    }

    /// Open an existing WAL file for appending, continuing from `start_lsn`/`start_offset`
    /// (as determined by a prior recovery pass).
    pub fn open_for_append(
        vfs: &V,
        path: &Path,
        start_lsn: Lsn,
        start_offset: u64,
    ) -> Result<Self> {
        let file = vfs.open(path, OpenMode::OpenExisting)?;
        Ok(WalWriter {
            file,
            current_lsn: start_lsn,
            next_offset: start_offset,
        })
    }

    /// Append a record. Returns `(lsn, frame_offset)`; `frame_offset` is what the WAL index
    /// should key on to find this frame again during a snapshot read.
    pub fn append(&mut self, record: &WalRecord) -> Result<(Lsn, u64)> {
        let lsn = self.current_lsn;
        let offset = self.next_offset;

        let record_bytes = record.serialize();
        let crc = crc32c::crc32c(&record_bytes);

        let mut frame = Vec::with_capacity(4 + record_bytes.len() + 4);
        frame.extend_from_slice(&(record_bytes.len() as u32).to_le_bytes());
        frame.extend_from_slice(&record_bytes);
        frame.extend_from_slice(&crc.to_le_bytes());

        self.file.write_at(offset, &frame)?;

        self.current_lsn += 1;
        self.next_offset += frame.len() as u64;
        Ok((lsn, offset))
    }

    /// Fsync the WAL file. `WalSyncMode::Off` callers may skip this for a batch of appends.
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()
    }

    pub fn current_lsn(&self) -> Lsn {
        self.current_lsn
    }

    pub fn current_offset(&self) -> u64 {
        self.next_offset
    }

    /// Truncate the WAL back to empty after a successful checkpoint.
    pub fn reset(&mut self) -> Result<()> {
        self.file.truncate(0)?;
        self.file.flush()?;
        self.current_lsn = 0;
        self.next_offset = 0;
        Ok(())
    }
}
