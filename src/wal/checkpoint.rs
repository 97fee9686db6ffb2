//! Checkpointing: bound WAL size by copying durable page images into the main file and, when
//! no registered reader still needs the WAL's current contents, truncating it.
//!
//! Simplification versus shrinking the WAL file in place to retain only the frames newer than
//! `safe_lsn` (which this core's frame format, lacking self-describing offsets from the tail,
//! does not support truncating from the front of): a checkpoint either truncates the whole WAL
//! (when `safe_lsn` covers every registered reader) or leaves the WAL file untouched (when an
//! old reader snapshot still needs frames at or below `safe_lsn`). Either way no frame a
//! registered reader depends on is ever discarded; the cost is that a long-lived reader delays
//! WAL truncation entirely rather than allowing a partial shrink.

use crate::concurrency::Concurrency;
use crate::error::Result;
use crate::storage::page::Page;
use crate::storage::pager::Pager;
use crate::vfs::{OpenMode, Vfs};
use crate::wal::index::WalIndex;
use crate::wal::reader::read_frame_at;
use crate::wal::record::WalRecord;
use crate::wal::writer::WalWriter;
use std::path::Path;

/// Outcome of one checkpoint pass, surfaced for logging.
pub struct CheckpointReport {
    pub safe_lsn: u64,
    pub pages_copied: usize,
    pub wal_truncated: bool,
}

/// Run one checkpoint. Acquires the writer lock for the duration (readers are never blocked).
pub fn checkpoint<V: Vfs>(
    vfs: &V,
    wal_path: &Path,
    pager: &mut Pager<V>,
    wal: &mut WalWriter<V>,
    index: &mut WalIndex,
    concurrency: &Concurrency,
) -> Result<CheckpointReport> {
    let _writer_guard = concurrency.begin_write()?;

    let current_wal_end = wal.current_lsn();
    let safe_lsn = match concurrency.min_registered_snapshot() {
        Some(reader_lsn) => reader_lsn.min(current_wal_end),
        None => current_wal_end,
    };

    let mut wal_file = vfs.open(wal_path, OpenMode::OpenExisting)?;
    let page_ids: Vec<_> = index.page_ids_at_or_below(safe_lsn);
    let mut pages_copied = 0;
    for page_id in &page_ids {
        if let Some(offset) = index.lookup(*page_id, safe_lsn) {
            if let Some(WalRecord::PagePut { data, .. }) = read_frame_at(&mut wal_file, offset)? {
                let page = Page::from_bytes(data);
                pager.install_checkpointed_page(&page, safe_lsn)?;
                pages_copied += 1;
            }
        }
    }
    pager.flush_header()?;
    pager.sync()?;

    index.retain_above(safe_lsn);

    let wal_truncated = safe_lsn == current_wal_end && concurrency.registered_reader_count() == 0;
    if wal_truncated {
        wal.reset()?;
        index.clear();
    }

    Ok(CheckpointReport {
        safe_lsn,
        pages_copied,
        wal_truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::DEFAULT_PAGE_SIZE;
    use crate::vfs::OsVfs;
    use tempfile::TempDir;

    #[test]
    fn checkpoint_copies_committed_pages_and_truncates_without_readers() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("t.db");
        let wal_path = dir.path().join("t.wal");
        let vfs = OsVfs::new();

        let mut pager = Pager::create(&vfs, &db_path, DEFAULT_PAGE_SIZE, 16).unwrap();
        let mut ledger = pager.begin_txn_tracking();
        let mut page = pager.allocate_page(&mut ledger).unwrap();
        let page_id = page.page_id();
        page.insert_cell(b"durable").unwrap();

        let mut wal = WalWriter::create(&vfs, &wal_path).unwrap();
        let mut index = WalIndex::new();
        wal.append(&WalRecord::Begin { txid: 1 }).unwrap();
        let (_, offset) = wal
            .append(&WalRecord::PagePut {
                txid: 1,
                page_id,
                data: page.as_bytes().to_vec(),
            })
            .unwrap();
        let commit_lsn = wal.current_lsn();
        wal.append(&WalRecord::Commit {
            txid: 1,
            lsn: commit_lsn,
        })
        .unwrap();
        wal.sync().unwrap();
        index.record(page_id, offset, commit_lsn);

        let concurrency = Concurrency::new(std::time::Duration::from_secs(1));
        let report =
            checkpoint(&vfs, &wal_path, &mut pager, &mut wal, &mut index, &concurrency).unwrap();

        assert_eq!(report.pages_copied, 1);
        assert!(report.wal_truncated);
        assert!(index.is_empty());

        let read_back = pager.read_page(page_id).unwrap();
        assert_eq!(read_back.cell(0), Some(b"durable".as_slice()));
    }

    #[test]
    fn registered_reader_blocks_truncation() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("t.db");
        let wal_path = dir.path().join("t.wal");
        let vfs = OsVfs::new();

        let mut pager = Pager::create(&vfs, &db_path, DEFAULT_PAGE_SIZE, 16).unwrap();
        let mut ledger = pager.begin_txn_tracking();
        let mut page = pager.allocate_page(&mut ledger).unwrap();
        let page_id = page.page_id();
        page.insert_cell(b"v1").unwrap();

        let mut wal = WalWriter::create(&vfs, &wal_path).unwrap();
        let mut index = WalIndex::new();
        wal.append(&WalRecord::Begin { txid: 1 }).unwrap();
        let (_, offset) = wal
            .append(&WalRecord::PagePut {
                txid: 1,
                page_id,
                data: page.as_bytes().to_vec(),
            })
            .unwrap();
        let commit_lsn = wal.current_lsn();
        wal.append(&WalRecord::Commit {
            txid: 1,
            lsn: commit_lsn,
        })
        .unwrap();
        wal.sync().unwrap();
        index.record(page_id, offset, commit_lsn);

        let concurrency = Concurrency::new(std::time::Duration::from_secs(1));
        let _reader = concurrency.begin_read(0); // snapshot before the commit above

        let report =
            checkpoint(&vfs, &wal_path, &mut pager, &mut wal, &mut index, &concurrency).unwrap();
        assert!(!report.wal_truncated);
        assert_eq!(report.pages_copied, 0, "safe_lsn pinned at reader's snapshot 0");
    }
}
