//! Write-transaction state: a dirty-page buffer plus the WAL-commit sequence that makes it
//! durable, built against the generic `Vfs`/`Pager`/`WalWriter`/`WalIndex` stack and the
//! no-merge-on-delete freelist bookkeeping in `Pager`.

use std::collections::HashMap;

use crate::error::{DecentError, Result};
use crate::storage::page::{Page, PageId};
use crate::storage::pager::{AllocationLedger, Pager};
use crate::vfs::Vfs;
use crate::wal::index::WalIndex;
use crate::wal::record::{Lsn, TxId, WalRecord};
use crate::wal::writer::WalWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Active,
    Committed,
    Aborted,
}

/// A single writer transaction: a dirty-page overlay plus the pager's own allocation ledger, so
/// a rollback can undo both new allocations and the pages this transaction touched.
pub struct Writer {
    txid: TxId,
    snapshot_lsn: Lsn,
    state: TxState,
    dirty_pages: HashMap<PageId, Page>,
    ledger: AllocationLedger,
}

impl Writer {
    pub fn begin(txid: TxId, snapshot_lsn: Lsn) -> Self {
        Writer {
            txid,
            snapshot_lsn,
            state: TxState::Active,
            dirty_pages: HashMap::new(),
            ledger: AllocationLedger::default(),
        }
    }

    pub fn txid(&self) -> TxId {
        self.txid
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn snapshot_lsn(&self) -> Lsn {
        self.snapshot_lsn
    }

    pub fn dirty_page_count(&self) -> usize {
        self.dirty_pages.len()
    }

    /// Read a page: the dirty buffer first (this transaction's own uncommitted writes), then
    /// the pager's clean cache/file. A writer never needs the WAL overlay for its own reads
    /// because anything it wrote itself is already in the dirty buffer.
    pub(crate) fn read_page<V: Vfs>(&self, pager: &mut Pager<V>, page_id: PageId) -> Result<Page> {
        if let Some(page) = self.dirty_pages.get(&page_id) {
            return Ok(page.clone());
        }
        pager.read_page(page_id)
    }

    pub(crate) fn write_page(&mut self, page: Page) {
        self.dirty_pages.insert(page.page_id(), page);
    }

    pub(crate) fn allocate_page<V: Vfs>(&mut self, pager: &mut Pager<V>) -> Result<Page> {
        pager.allocate_page(&mut self.ledger)
    }

    pub(crate) fn free_page<V: Vfs>(&mut self, pager: &Pager<V>, page_id: PageId) {
        pager.stage_free(page_id, &mut self.ledger);
    }

    /// Commit: append every dirty page plus a `MetaUpdate` snapshot of the pager's current
    /// header fields to the WAL, fsync once, then index the new page versions so snapshot
    /// readers can see them without waiting for a checkpoint. Durability ends at the `fsync`;
    /// the main database file is untouched until the next checkpoint copies these pages back.
    pub fn commit<V: Vfs>(
        &mut self,
        pager: &mut Pager<V>,
        wal: &mut WalWriter<V>,
        index: &mut WalIndex,
    ) -> Result<Lsn> {
        if self.state != TxState::Active {
            return Err(DecentError::Transaction(
                "cannot commit a non-active transaction".into(),
            ));
        }

        wal.append(&WalRecord::Begin { txid: self.txid })?;

        // Fold the freed pages' new freelist-chain links into this commit's dirty set so they
        // reach the main file only through the same WAL-indexed path as every other page, never
        // a direct write ahead of the commit's own fsync.
        let (freed_pages, freelist_head, freelist_count) = pager.plan_commit_frees(&self.ledger);
        for page in freed_pages {
            self.dirty_pages.insert(page.page_id(), page);
        }

        let mut page_offsets = Vec::with_capacity(self.dirty_pages.len());
        for (page_id, page) in &self.dirty_pages {
            let (_, offset) = wal.append(&WalRecord::PagePut {
                txid: self.txid,
                page_id: *page_id,
                data: page.as_bytes().to_vec(),
            })?;
            page_offsets.push((*page_id, offset));
        }

        let mut page_count = pager.page_count();
        for &page_id in self.dirty_pages.keys() {
            page_count = page_count.max(page_id + 1);
        }

        wal.append(&WalRecord::MetaUpdate {
            txid: self.txid,
            catalog_root: pager.catalog_root(),
            page_count,
            schema_cookie: pager.schema_cookie(),
            freelist_head,
            freelist_count,
        })?;

        let commit_lsn = wal.current_lsn();
        wal.append(&WalRecord::Commit {
            txid: self.txid,
            lsn: commit_lsn,
        })?;
        wal.sync()?;

        for (page_id, offset) in page_offsets {
            index.record(page_id, offset, commit_lsn);
        }
        pager.apply_recovered_meta(
            pager.catalog_root(),
            page_count,
            pager.schema_cookie(),
            freelist_head,
            freelist_count,
        );

        self.state = TxState::Committed;
        self.dirty_pages.clear();
        Ok(commit_lsn)
    }

    /// Rollback: undo allocations made during this transaction, forget staged frees, and record
    /// an `Abort` so a concurrent recovery scan never mistakes this transaction's frames (there
    /// are none, since nothing was appended before commit) for a committed one.
    pub fn rollback<V: Vfs>(&mut self, pager: &mut Pager<V>, wal: &mut WalWriter<V>) -> Result<()> {
        if self.state != TxState::Active {
            return Err(DecentError::Transaction(
                "cannot roll back a non-active transaction".into(),
            ));
        }

        wal.append(&WalRecord::Abort { txid: self.txid })?;
        pager.rollback_allocations(&self.ledger)?;

        self.dirty_pages.clear();
        self.state = TxState::Aborted;
        Ok(())
    }
}
