//! Writer admission and reader-snapshot registration. This core is single-process, so there is
//! no cross-process file lock to coordinate, and read transactions never block on anything —
//! they register a snapshot LSN instead of taking a shared lock, so a writer's commit never
//! waits on a slow reader. Only one `writer_lock` (exclusive, timeout-bounded) gates writers
//! against each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::error::{DecentError, Result};
use crate::wal::Lsn;

type ReaderId = u64;

/// Tracks the single writer admission lock and the table of registered reader snapshots used
/// to bound checkpoint truncation (`safe_lsn = min(registered snapshots)`).
pub struct Concurrency {
    writer_lock: Mutex<()>,
    readers: Mutex<HashMap<ReaderId, Lsn>>,
    next_reader_id: AtomicU64,
    busy_timeout: Duration,
}

impl Concurrency {
    pub fn new(busy_timeout: Duration) -> Self {
        Concurrency {
            writer_lock: Mutex::new(()),
            readers: Mutex::new(HashMap::new()),
            next_reader_id: AtomicU64::new(1),
            busy_timeout,
        }
    }

    /// Block until the writer lock is free, up to the configured busy timeout.
    pub fn begin_write(&self) -> Result<WriterGuard<'_>> {
        match self.writer_lock.try_lock_for(self.busy_timeout) {
            Some(guard) => Ok(WriterGuard { _guard: guard }),
            None => Err(DecentError::Busy(format!(
                "writer lock not acquired within {:?}",
                self.busy_timeout
            ))),
        }
    }

    /// Register a reader snapshotting at `snapshot_lsn`. The returned handle must be dropped (or
    /// explicitly passed to `end_read`) when the read transaction ends, or it will keep the
    /// checkpoint from truncating WAL frames at or below its snapshot forever.
    pub fn begin_read(&self, snapshot_lsn: Lsn) -> ReaderHandle<'_> {
        let id = self.next_reader_id.fetch_add(1, Ordering::Relaxed);
        self.readers.lock().insert(id, snapshot_lsn);
        ReaderHandle {
            concurrency: self,
            id,
        }
    }

    /// The oldest snapshot any registered reader still depends on, if there are any readers.
    pub fn min_registered_snapshot(&self) -> Option<Lsn> {
        self.readers.lock().values().copied().min()
    }

    pub fn registered_reader_count(&self) -> usize {
        self.readers.lock().len()
    }

    fn end_read(&self, id: ReaderId) {
        self.readers.lock().remove(&id);
    }
}

pub struct WriterGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// A registered reader's snapshot. Unregisters itself on drop so a forgotten `ReaderHandle`
/// cannot permanently block checkpoint truncation beyond its own lifetime.
pub struct ReaderHandle<'a> {
    concurrency: &'a Concurrency,
    id: ReaderId,
}

impl<'a> ReaderHandle<'a> {
    pub fn snapshot_lsn(&self) -> Lsn {
        *self
            .concurrency
            .readers
            .lock()
            .get(&self.id)
            .expect("reader handle outlived its registration")
    }
}

impl<'a> Drop for ReaderHandle<'a> {
    fn drop(&mut self) {
        self.concurrency.end_read(self.id);
    }
}
