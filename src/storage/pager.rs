//! The page-addressable store: header, allocator/freelist, and a sharded page cache, split into
//! N independently-locked shards (this core carries no at-rest encryption; see DESIGN.md for
//! the dropped-dependency rationale).
//!
//! Cache design note: the pager cache only ever holds *clean* page images — either read
//! straight off the main file, or installed by a checkpoint once a WAL-durable image has been
//! copied back. A writer's in-flight dirty pages live in the transaction's own buffer
//! (`tx::Transaction`) until commit, and become durable through the WAL, never through this
//! cache. That is what makes "never evict a dirty page without routing it through the WAL"
//! hold trivially here: there is nothing dirty in this cache to evict. The `dirty`/
//! `last_commit_lsn` per-entry fields exist so a checkpoint can record which commit a cached
//! image reflects.

use std::num::NonZeroUsize;
use std::path::Path;

use lru::LruCache;
use parking_lot::Mutex;

use crate::error::{DecentError, Result};
use crate::storage::header::{DbHeader, HEADER_SIZE};
use crate::storage::page::{Page, PageId};
use crate::vfs::{OpenMode, Vfs, VfsFile};

const NUM_SHARDS: usize = 16;

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

fn shard_for(page_id: PageId) -> usize {
    (splitmix64(page_id) as usize) % NUM_SHARDS
}

struct CacheEntry {
    page: Page,
    #[allow(dead_code)]
    dirty: bool,
    #[allow(dead_code)]
    pinned_count: u32,
    #[allow(dead_code)]
    last_commit_lsn: u64,
}

struct Shard {
    entries: LruCache<PageId, CacheEntry>,
}

impl Shard {
    fn new(capacity: usize) -> Self {
        Shard {
            entries: LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap()),
        }
    }
}

/// Allocation/free bookkeeping for one in-flight writer transaction, so it can be undone on
/// rollback.
#[derive(Default)]
pub struct AllocationLedger {
    allocated: Vec<PageId>,
    freed: Vec<PageId>,
}

pub struct Pager<V: Vfs> {
    file: V::File,
    page_size: usize,
    page_count: u64,
    schema_cookie: u64,
    catalog_root: u64,
    freelist_head: PageId,
    freelist_count: u32,
    shards: Vec<Mutex<Shard>>,
}

impl<V: Vfs> Pager<V> {
    pub fn create(vfs: &V, path: &Path, page_size: usize, cache_size_pages: usize) -> Result<Self> {
        if !crate::storage::page::is_valid_page_size(page_size) {
            return Err(DecentError::InvalidPageSize(page_size));
        }
        let file = vfs.open(path, OpenMode::CreateNew)?;
        let per_shard = (cache_size_pages / NUM_SHARDS).max(1);
        let mut pager = Pager {
            file,
            page_size,
            page_count: 1,
            schema_cookie: 0,
            catalog_root: 0,
            freelist_head: 0,
            freelist_count: 0,
            shards: (0..NUM_SHARDS).map(|_| Mutex::new(Shard::new(per_shard))).collect(),
        };
        pager.flush_header()?;
        Ok(pager)
    }

    pub fn open(vfs: &V, path: &Path, cache_size_pages: usize) -> Result<Self> {
        let mut file = vfs.open(path, OpenMode::OpenExisting)?;
        let mut buf = vec![0u8; HEADER_SIZE];
        file.read_exact_at(0, &mut buf)?;
        let header = DbHeader::decode(&buf)?;
        let per_shard = (cache_size_pages / NUM_SHARDS).max(1);
        Ok(Pager {
            file,
            page_size: header.page_size as usize,
            page_count: header.page_count,
            schema_cookie: header.schema_cookie,
            catalog_root: header.catalog_root,
            freelist_head: header.freelist_head,
            freelist_count: header.freelist_count,
            shards: (0..NUM_SHARDS).map(|_| Mutex::new(Shard::new(per_shard))).collect(),
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page_count(&self) -> u64 {
        self.page_count
    }

    pub fn schema_cookie(&self) -> u64 {
        self.schema_cookie
    }

    pub fn set_schema_cookie(&mut self, cookie: u64) {
        self.schema_cookie = cookie;
    }

    pub fn catalog_root(&self) -> u64 {
        self.catalog_root
    }

    pub fn set_catalog_root(&mut self, root: u64) {
        self.catalog_root = root;
    }

    pub fn freelist_head(&self) -> PageId {
        self.freelist_head
    }

    pub fn freelist_count(&self) -> u32 {
        self.freelist_count
    }

    /// Apply a `MetaUpdate` WAL record or a checkpoint's final metadata snapshot. Does not touch
    /// the header page on disk; the caller decides when to call `flush_header`.
    pub fn apply_recovered_meta(
        &mut self,
        catalog_root: u64,
        page_count: u64,
        schema_cookie: u64,
        freelist_head: PageId,
        freelist_count: u32,
    ) {
        self.catalog_root = catalog_root;
        self.page_count = page_count;
        self.schema_cookie = schema_cookie;
        self.freelist_head = freelist_head;
        self.freelist_count = freelist_count;
    }

    fn header(&self) -> DbHeader {
        DbHeader {
            page_size: self.page_size as u32,
            page_count: self.page_count,
            schema_cookie: self.schema_cookie,
            catalog_root: self.catalog_root,
            freelist_head: self.freelist_head,
            freelist_count: self.freelist_count,
        }
    }

    /// Rewrite and flush the header page (page 1). This is the only place this struct writes
    /// to the main file outside of `install_checkpointed_page`.
    pub fn flush_header(&mut self) -> Result<()> {
        let bytes = self.header().encode();
        self.file.write_at(0, &bytes)?;
        self.file.flush()?;
        Ok(())
    }

    /// Allocate a page id, popping the freelist if non-empty else extending the file.
    /// Mutates in-memory header state immediately; the caller is responsible for recording this
    /// in an `AllocationLedger` so a rollback can undo it.
    pub fn allocate_page(&mut self, ledger: &mut AllocationLedger) -> Result<Page> {
        let page_id = if self.freelist_head != 0 {
            let head = self.freelist_head;
            let free_page = self.read_page(head)?;
            self.freelist_head = crate::storage::freelist::next(&free_page);
            self.freelist_count -= 1;
            head
        } else {
            let id = self.page_count;
            self.page_count += 1;
            id
        };
        ledger.allocated.push(page_id);
        Ok(Page::new(page_id, self.page_size))
    }

    /// Defer a page free. The caller threads this through the transaction's pending frees and
    /// resolves the resulting freelist-chain pages at commit time.
    pub fn stage_free(&self, page_id: PageId, ledger: &mut AllocationLedger) {
        ledger.freed.push(page_id);
    }

    /// Compute the freelist-chain page images for a commit's staged frees without writing
    /// anything to disk. The transaction manager folds the returned pages into its own
    /// dirty-page set so they reach the main file only through the WAL-indexed path any other
    /// dirty page takes, and applies the returned head/count once the commit is durable.
    pub fn plan_commit_frees(&self, ledger: &AllocationLedger) -> (Vec<Page>, PageId, u32) {
        let mut pages = Vec::with_capacity(ledger.freed.len());
        let mut head = self.freelist_head;
        let mut count = self.freelist_count;
        for &page_id in &ledger.freed {
            let mut page = Page::new(page_id, self.page_size);
            crate::storage::freelist::set_next(&mut page, head);
            head = page_id;
            count += 1;
            pages.push(page);
        }
        (pages, head, count)
    }

    /// Apply staged frees to the on-disk freelist chain immediately. For callers that manage
    /// their own pages outside of a WAL (the in-memory `PageStore` harness used by isolated
    /// B+tree tests, and this module's own unit tests) rather than through the transaction
    /// manager, which uses `plan_commit_frees` instead.
    pub fn commit_frees(&mut self, ledger: &AllocationLedger) -> Result<()> {
        for &page_id in &ledger.freed {
            let mut page = Page::new(page_id, self.page_size);
            crate::storage::freelist::set_next(&mut page, self.freelist_head);
            self.write_page_direct(&page)?;
            self.freelist_head = page_id;
            self.freelist_count += 1;
        }
        Ok(())
    }

    /// Undo an aborted transaction's allocations: every page it allocated is pushed onto the
    /// freelist (rather than shrinking `page_count`, which would be unsafe once other
    /// concurrently-numbered pages may already reference it).
    pub fn rollback_allocations(&mut self, ledger: &AllocationLedger) -> Result<()> {
        for &page_id in ledger.allocated.iter().rev() {
            let mut page = Page::new(page_id, self.page_size);
            crate::storage::freelist::set_next(&mut page, self.freelist_head);
            self.write_page_direct(&page)?;
            self.freelist_head = page_id;
            self.freelist_count += 1;
            self.evict(page_id);
        }
        Ok(())
    }

    pub fn begin_txn_tracking(&self) -> AllocationLedger {
        AllocationLedger::default()
    }

    /// Read a page from cache, falling back to disk. This never consults the WAL overlay;
    /// callers that need snapshot-correct reads go through the WAL-aware read path in the
    /// transaction manager (`tx::TxPageStore`).
    pub fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        let shard_idx = shard_for(page_id);
        {
            let mut shard = self.shards[shard_idx].lock();
            if let Some(entry) = shard.entries.get(&page_id) {
                return Ok(entry.page.clone());
            }
        }
        let page = self.read_page_from_disk(page_id)?;
        let mut shard = self.shards[shard_idx].lock();
        shard.entries.put(
            page_id,
            CacheEntry {
                page: page.clone(),
                dirty: false,
                pinned_count: 0,
                last_commit_lsn: 0,
            },
        );
        Ok(page)
    }

    /// Install a page image known to be durable as of `commit_lsn` (called by checkpoint after
    /// copying a WAL frame back into the main file).
    pub fn install_checkpointed_page(&mut self, page: &Page, commit_lsn: u64) -> Result<()> {
        self.write_page_direct(page)?;
        let shard_idx = shard_for(page.page_id());
        let mut shard = self.shards[shard_idx].lock();
        shard.entries.put(
            page.page_id(),
            CacheEntry {
                page: page.clone(),
                dirty: false,
                pinned_count: 0,
                last_commit_lsn: commit_lsn,
            },
        );
        Ok(())
    }

    fn write_page_direct(&mut self, page: &Page) -> Result<()> {
        let offset = page.page_id() * self.page_size as u64;
        self.file.write_at(offset, page.as_bytes())?;
        Ok(())
    }

    fn read_page_from_disk(&mut self, page_id: PageId) -> Result<Page> {
        let offset = page_id * self.page_size as u64;
        let mut buf = vec![0u8; self.page_size];
        self.file.read_exact_at(offset, &mut buf)?;
        Ok(Page::from_bytes(buf))
    }

    fn evict(&mut self, page_id: PageId) {
        let shard_idx = shard_for(page_id);
        self.shards[shard_idx].lock().entries.pop(&page_id);
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::OsVfs;
    use tempfile::TempDir;

    #[test]
    fn create_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.db");
        let vfs = OsVfs::new();

        {
            let pager = Pager::create(&vfs, &path, 4096, 64).unwrap();
            assert_eq!(pager.page_count(), 1);
        }
        {
            let pager = Pager::open(&vfs, &path, 64).unwrap();
            assert_eq!(pager.page_count(), 1);
            assert_eq!(pager.page_size(), 4096);
        }
    }

    #[test]
    fn allocate_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.db");
        let vfs = OsVfs::new();
        let mut pager = Pager::create(&vfs, &path, 4096, 64).unwrap();
        let mut ledger = pager.begin_txn_tracking();

        let mut page = pager.allocate_page(&mut ledger).unwrap();
        page.insert_cell(b"hello").unwrap();
        pager.install_checkpointed_page(&page, 1).unwrap();

        let read_back = pager.read_page(page.page_id()).unwrap();
        assert_eq!(read_back.cell(0), Some(b"hello".as_slice()));
    }

    #[test]
    fn freelist_reuses_freed_page() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.db");
        let vfs = OsVfs::new();
        let mut pager = Pager::create(&vfs, &path, 4096, 64).unwrap();
        let mut ledger = pager.begin_txn_tracking();

        let page1 = pager.allocate_page(&mut ledger).unwrap();
        let page1_id = page1.page_id();
        pager.install_checkpointed_page(&page1, 1).unwrap();
        pager.stage_free(page1_id, &mut ledger);
        pager.commit_frees(&ledger).unwrap();

        let mut ledger2 = pager.begin_txn_tracking();
        let page2 = pager.allocate_page(&mut ledger2).unwrap();
        assert_eq!(page2.page_id(), page1_id);
    }

    #[test]
    fn rollback_returns_allocation_to_freelist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.db");
        let vfs = OsVfs::new();
        let mut pager = Pager::create(&vfs, &path, 4096, 64).unwrap();
        let mut ledger = pager.begin_txn_tracking();

        let page = pager.allocate_page(&mut ledger).unwrap();
        let page_id = page.page_id();
        pager.rollback_allocations(&ledger).unwrap();

        let mut ledger2 = pager.begin_txn_tracking();
        let reused = pager.allocate_page(&mut ledger2).unwrap();
        assert_eq!(reused.page_id(), page_id);
    }
}
