//! Crash recovery: buffer a transaction's frames, apply them atomically at `Commit`, discard
//! at `Abort`. Generalized over `Vfs`.
//!
//! Recovery reads every well-formed frame up to the torn tail (`reader::read_all_frames` already
//! drops anything after the last good frame), replays each *complete* transaction (one whose
//! `Commit` record was itself read successfully) against the pager, and returns the `WalIndex`
//! covering those commits so readers opened against the reopened database see them without
//! waiting for a checkpoint.

use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;
use crate::storage::page::Page;
use crate::storage::pager::Pager;
use crate::vfs::{OpenMode, Vfs, VfsFile};
use crate::wal::index::WalIndex;
use crate::wal::reader::read_all_frames;
use crate::wal::record::{TxId, WalRecord};

#[derive(Default)]
struct PendingTxn {
    pages: Vec<(u64, Vec<u8>)>,
    meta: Option<WalRecord>,
}

/// Replay `wal_path` against `pager`, returning the index of every commit replayed. The caller
/// is responsible for truncating/recreating the WAL file once this returns successfully; leaving
/// it in place is also safe (the next recovery pass would simply replay the same commits again
/// over already-installed pages, which is idempotent).
pub fn recover<V: Vfs>(vfs: &V, wal_path: &Path, pager: &mut Pager<V>) -> Result<WalIndex> {
    let mut index = WalIndex::new();
    if !vfs.exists(wal_path) {
        return Ok(index);
    }

    let mut file = vfs.open(wal_path, OpenMode::OpenExisting)?;
    let frames = read_all_frames(&mut file)?;

    let mut pending: HashMap<TxId, PendingTxn> = HashMap::new();

    for frame in &frames {
        match &frame.record {
            WalRecord::Begin { txid } => {
                pending.entry(*txid).or_default();
            }
            WalRecord::PagePut { txid, page_id, data } => {
                pending
                    .entry(*txid)
                    .or_default()
                    .pages
                    .push((*page_id, data.clone()));
            }
            WalRecord::MetaUpdate { txid, .. } => {
                let record = frame.record.clone();
                pending.entry(*txid).or_default().meta = Some(record);
            }
            WalRecord::Abort { txid } => {
                pending.remove(txid);
            }
            WalRecord::Commit { txid, lsn } => {
                let lsn = *lsn;
                let Some(txn) = pending.remove(txid) else {
                    continue; // Commit with no buffered Begin: nothing to replay.
                };
                for (page_id, data) in &txn.pages {
                    let page = Page::from_bytes(data.clone());
                    pager.install_checkpointed_page(&page, lsn)?;
                    index.record(*page_id, frame.offset, lsn);
                }
                if let Some(WalRecord::MetaUpdate {
                    catalog_root,
                    page_count,
                    schema_cookie,
                    freelist_head,
                    freelist_count,
                    ..
                }) = txn.meta
                {
                    pager.apply_recovered_meta(
                        catalog_root,
                        page_count,
                        schema_cookie,
                        freelist_head,
                        freelist_count,
                    );
                }
            }
        }
    }

    pager.flush_header()?;
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::DEFAULT_PAGE_SIZE;
    use crate::vfs::OsVfs;
    use crate::wal::writer::WalWriter;
    use tempfile::TempDir;

    #[test]
    fn replays_committed_transaction() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("t.db");
        let wal_path = dir.path().join("t.wal");
        let vfs = OsVfs::new();

        let mut pager = Pager::create(&vfs, &db_path, DEFAULT_PAGE_SIZE, 16).unwrap();
        let mut ledger = pager.begin_txn_tracking();
        let mut page = pager.allocate_page(&mut ledger).unwrap();
        let page_id = page.page_id();
        page.insert_cell(b"payload").unwrap();

        let mut writer = WalWriter::create(&vfs, &wal_path).unwrap();
        writer.append(&WalRecord::Begin { txid: 1 }).unwrap();
        writer
            .append(&WalRecord::PagePut {
                txid: 1,
                page_id,
                data: page.as_bytes().to_vec(),
            })
            .unwrap();
        writer.append(&WalRecord::Commit { txid: 1, lsn: 2 }).unwrap();
        writer.sync().unwrap();

        let index = recover(&vfs, &wal_path, &mut pager).unwrap();
        assert!(index.lookup(page_id, 2).is_some());

        let read_back = pager.read_page(page_id).unwrap();
        assert_eq!(read_back.cell(0), Some(b"payload".as_slice()));
    }

    #[test]
    fn discards_uncommitted_transaction() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("t.db");
        let wal_path = dir.path().join("t.wal");
        let vfs = OsVfs::new();

        let mut pager = Pager::create(&vfs, &db_path, DEFAULT_PAGE_SIZE, 16).unwrap();
        let mut ledger = pager.begin_txn_tracking();
        let page = pager.allocate_page(&mut ledger).unwrap();
        let page_id = page.page_id();

        let mut writer = WalWriter::create(&vfs, &wal_path).unwrap();
        writer.append(&WalRecord::Begin { txid: 1 }).unwrap();
        writer
            .append(&WalRecord::PagePut {
                txid: 1,
                page_id,
                data: page.as_bytes().to_vec(),
            })
            .unwrap();
        // No Commit: simulates a crash before the transaction finished.
        writer.sync().unwrap();

        let index = recover(&vfs, &wal_path, &mut pager).unwrap();
        assert!(index.is_empty());
    }
}
