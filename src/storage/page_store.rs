use crate::error::Result;
use crate::storage::page::{Page, PageId};

/// Abstraction over page I/O, unifying direct pager reads/writes and a transaction's
/// dirty-buffer overlay so the B+tree code (`btree::ops`) is written once against this trait.
pub trait PageStore {
    fn read_page(&mut self, page_id: PageId) -> Result<Page>;
    fn write_page(&mut self, page: Page) -> Result<()>;
    fn allocate_page(&mut self) -> Result<Page>;
    fn free_page(&mut self, page_id: PageId);
    fn page_size(&self) -> usize;
}
