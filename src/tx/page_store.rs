//! `PageStore` adapters the B+tree runs against: one for the active writer (dirty buffer over
//! the pager) and one for a registered reader (WAL-index overlay over the pager). Both follow
//! the same rule — check the WAL index for a newer version before falling through to the page
//! file.

use crate::error::{DecentError, Result};
use crate::storage::page::{Page, PageId};
use crate::storage::page_store::PageStore;
use crate::storage::pager::Pager;
use crate::tx::transaction::Writer;
use crate::vfs::{OpenMode, Vfs};
use crate::wal::index::WalIndex;
use crate::wal::reader::read_frame_at;
use crate::wal::record::WalRecord;
use std::path::Path;

/// The `PageStore` a write transaction's B+tree operations run against: reads check the
/// transaction's dirty buffer first, writes go to the dirty buffer, allocations/frees are
/// tracked against the transaction's rollback ledger.
pub struct TxPageStore<'a, V: Vfs> {
    writer: &'a mut Writer,
    pager: &'a mut Pager<V>,
}

impl<'a, V: Vfs> TxPageStore<'a, V> {
    pub fn new(writer: &'a mut Writer, pager: &'a mut Pager<V>) -> Self {
        TxPageStore { writer, pager }
    }
}

impl<'a, V: Vfs> PageStore for TxPageStore<'a, V> {
    fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        self.writer.read_page(self.pager, page_id)
    }

    fn write_page(&mut self, page: Page) -> Result<()> {
        self.writer.write_page(page);
        Ok(())
    }

    fn allocate_page(&mut self) -> Result<Page> {
        self.writer.allocate_page(self.pager)
    }

    fn free_page(&mut self, page_id: PageId) {
        self.writer.free_page(self.pager, page_id);
    }

    fn page_size(&self) -> usize {
        self.pager.page_size()
    }
}

/// The `PageStore` a registered reader's B+tree operations run against: every read consults the
/// WAL index for the newest version at or before `snapshot_lsn` before falling back to the
/// pager's clean cache/file, so a reader never observes a page image written after it began.
///
/// Read-only: `write_page`/`allocate_page` return `DecentError::ReadOnly`, `free_page` is a
/// no-op, matching a read transaction having nothing to roll back.
pub struct SnapshotPageStore<'a, V: Vfs> {
    pager: &'a mut Pager<V>,
    wal_file: V::File,
    index: &'a WalIndex,
    snapshot_lsn: u64,
}

impl<'a, V: Vfs> SnapshotPageStore<'a, V> {
    pub fn open(
        vfs: &V,
        wal_path: &Path,
        pager: &'a mut Pager<V>,
        index: &'a WalIndex,
        snapshot_lsn: u64,
    ) -> Result<Self> {
        let wal_file = vfs.open(wal_path, OpenMode::OpenExisting)?;
        Ok(SnapshotPageStore {
            pager,
            wal_file,
            index,
            snapshot_lsn,
        })
    }
}

impl<'a, V: Vfs> PageStore for SnapshotPageStore<'a, V> {
    fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        if let Some(offset) = self.index.lookup(page_id, self.snapshot_lsn) {
            if let Some(WalRecord::PagePut { data, .. }) =
                read_frame_at(&mut self.wal_file, offset)?
            {
                return Ok(Page::from_bytes(data));
            }
        }
        self.pager.read_page(page_id)
    }

    fn write_page(&mut self, _page: Page) -> Result<()> {
        Err(DecentError::ReadOnly)
    }

    fn allocate_page(&mut self) -> Result<Page> {
        Err(DecentError::ReadOnly)
    }

    fn free_page(&mut self, _page_id: PageId) {}

    fn page_size(&self) -> usize {
        self.pager.page_size()
    }
}
