//! Lazy B-tree cursor: walks a root-to-leaf path on a stack instead of materializing every
//! entry up front. The original cursor called `BTree::scan` eagerly and buffered the whole
//! result in a `Vec`; that is fine for small catalog trees but unacceptable for a cursor over
//! a multi-gigabyte table, so this one only ever holds the pages on the current path.

use crate::btree::key_encoding::compare_keys;
use crate::btree::node::{internal_key, internal_left_child, leaf_entry, node_type, num_entries, right_child, NodeType};
use crate::btree::ops::BTree;
use crate::error::{DecentError, Result};
use crate::storage::page::{Page, PageId};
use crate::storage::page_store::PageStore;

enum Frame {
    /// `idx` is the next entry to yield.
    Leaf { page: Page, idx: u16, n: u16 },
    /// `idx` ranges over `0..=n+1`: `idx < n` means left_child(idx) is next, `idx == n` means
    /// right_child is next, `idx > n` means this frame is exhausted.
    Internal { page: Page, idx: u16, n: u16 },
}

pub struct BTreeCursor {
    stack: Vec<Frame>,
}

impl BTreeCursor {
    /// Create a cursor positioned before the first entry.
    pub fn new(btree: &BTree, pager: &mut impl PageStore) -> Result<Self> {
        let mut stack = Vec::new();
        push_leftmost(&mut stack, pager, btree.root_page_id())?;
        Ok(BTreeCursor { stack })
    }

    /// Create a cursor positioned before the first entry with key >= `start_key`.
    pub fn from_key(btree: &BTree, pager: &mut impl PageStore, start_key: &[u8]) -> Result<Self> {
        let mut stack = Vec::new();
        push_from_key(&mut stack, pager, btree.root_page_id(), start_key)?;
        Ok(BTreeCursor { stack })
    }

    /// Advance and return the next (key, value) pair, or `None` once exhausted.
    pub fn next(&mut self, pager: &mut impl PageStore) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        loop {
            match self.stack.last_mut() {
                None => return Ok(None),
                Some(Frame::Leaf { page, idx, n }) => {
                    if *idx < *n {
                        let (k, v) = leaf_entry(page, *idx).ok_or(DecentError::InvalidPage)?;
                        let result = (k.to_vec(), v.to_vec());
                        *idx += 1;
                        return Ok(Some(result));
                    }
                    self.stack.pop();
                }
                Some(Frame::Internal { page, idx, n }) => {
                    if *idx < *n {
                        let child = internal_left_child(page, *idx).ok_or(DecentError::InvalidPage)?;
                        *idx += 1;
                        push_leftmost(&mut self.stack, pager, child)?;
                    } else if *idx == *n {
                        let child = right_child(page).ok_or(DecentError::InvalidPage)?;
                        *idx += 1;
                        push_leftmost(&mut self.stack, pager, child)?;
                    } else {
                        self.stack.pop();
                    }
                }
            }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.stack.is_empty()
    }
}

/// Descend from `page_id` always taking the leftmost child, pushing a frame per level.
fn push_leftmost(stack: &mut Vec<Frame>, pager: &mut impl PageStore, mut page_id: PageId) -> Result<()> {
    loop {
        let page = pager.read_page(page_id)?;
        match node_type(&page) {
            Some(NodeType::Leaf) => {
                let n = num_entries(&page);
                stack.push(Frame::Leaf { page, idx: 0, n });
                return Ok(());
            }
            Some(NodeType::Internal) => {
                let n = num_entries(&page);
                if n == 0 {
                    let child = right_child(&page).ok_or(DecentError::InvalidPage)?;
                    stack.push(Frame::Internal { page, idx: 0, n });
                    page_id = child;
                } else {
                    let child = internal_left_child(&page, 0).ok_or(DecentError::InvalidPage)?;
                    stack.push(Frame::Internal { page, idx: 1, n });
                    page_id = child;
                }
            }
            None => return Err(DecentError::InvalidPage),
        }
    }
}

/// Descend from `page_id`, at each level choosing the child that could contain `start_key` and
/// pre-positioning the frame so later `next()` calls resume with the remaining siblings.
fn push_from_key(
    stack: &mut Vec<Frame>,
    pager: &mut impl PageStore,
    mut page_id: PageId,
    start_key: &[u8],
) -> Result<()> {
    loop {
        let page = pager.read_page(page_id)?;
        match node_type(&page) {
            Some(NodeType::Leaf) => {
                let n = num_entries(&page);
                let mut idx = 0;
                while idx < n {
                    let k = crate::btree::node::leaf_key(&page, idx).ok_or(DecentError::InvalidPage)?;
                    if compare_keys(k, start_key) != std::cmp::Ordering::Less {
                        break;
                    }
                    idx += 1;
                }
                stack.push(Frame::Leaf { page, idx, n });
                return Ok(());
            }
            Some(NodeType::Internal) => {
                let n = num_entries(&page);
                let mut chosen: Option<(u16, PageId)> = None;
                for i in 0..n {
                    let ek = internal_key(&page, i).ok_or(DecentError::InvalidPage)?;
                    if compare_keys(start_key, ek) == std::cmp::Ordering::Less {
                        chosen = Some((i, internal_left_child(&page, i).ok_or(DecentError::InvalidPage)?));
                        break;
                    }
                }
                match chosen {
                    Some((i, child)) => {
                        stack.push(Frame::Internal { page, idx: i + 1, n });
                        page_id = child;
                    }
                    None => {
                        let child = right_child(&page).ok_or(DecentError::InvalidPage)?;
                        stack.push(Frame::Internal { page, idx: n + 1, n });
                        page_id = child;
                    }
                }
            }
            None => return Err(DecentError::InvalidPage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::key_encoding::encode_i64;
    use crate::storage::page::DEFAULT_PAGE_SIZE;
    use crate::storage::pager::{AllocationLedger, Pager};
    use crate::vfs::OsVfs;
    use tempfile::NamedTempFile;

    struct PagerStore<'a> {
        pager: &'a mut Pager<OsVfs>,
        ledger: AllocationLedger,
    }

    impl<'a> PageStore for PagerStore<'a> {
        fn read_page(&mut self, page_id: PageId) -> Result<Page> {
            self.pager.read_page(page_id)
        }
        fn write_page(&mut self, page: Page) -> Result<()> {
            self.pager.install_checkpointed_page(&page, 0)
        }
        fn allocate_page(&mut self) -> Result<Page> {
            self.pager.allocate_page(&mut self.ledger)
        }
        fn free_page(&mut self, page_id: PageId) {
            self.pager.stage_free(page_id, &mut self.ledger);
            self.pager.commit_frees(&self.ledger).ok();
            self.ledger = AllocationLedger::default();
        }
        fn page_size(&self) -> usize {
            self.pager.page_size()
        }
    }

    fn setup() -> (Pager<OsVfs>, std::path::PathBuf) {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        drop(tmp);
        std::fs::remove_file(&path).ok();
        let pager = Pager::create(&OsVfs::new(), &path, DEFAULT_PAGE_SIZE, 64).unwrap();
        (pager, path)
    }

    #[test]
    fn test_cursor_iteration() {
        let (mut pager, path) = setup();
        let mut store = PagerStore {
            pager: &mut pager,
            ledger: AllocationLedger::default(),
        };
        let mut btree = BTree::create(&mut store).unwrap();

        btree.insert(&mut store, b"c", b"3").unwrap();
        btree.insert(&mut store, b"a", b"1").unwrap();
        btree.insert(&mut store, b"b", b"2").unwrap();

        let mut cursor = BTreeCursor::new(&btree, &mut store).unwrap();

        let (k, v) = cursor.next(&mut store).unwrap().unwrap();
        assert_eq!(k, b"a");
        assert_eq!(v, b"1");

        let (k, v) = cursor.next(&mut store).unwrap().unwrap();
        assert_eq!(k, b"b");
        assert_eq!(v, b"2");

        let (k, v) = cursor.next(&mut store).unwrap().unwrap();
        assert_eq!(k, b"c");
        assert_eq!(v, b"3");

        assert!(cursor.next(&mut store).unwrap().is_none());
        assert!(cursor.is_exhausted());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_cursor_spans_splits() {
        let (mut pager, path) = setup();
        let mut store = PagerStore {
            pager: &mut pager,
            ledger: AllocationLedger::default(),
        };
        let mut btree = BTree::create(&mut store).unwrap();

        let count = 300i64;
        for i in 0..count {
            btree.insert(&mut store, &encode_i64(i), b"v").unwrap();
        }

        let mut cursor = BTreeCursor::new(&btree, &mut store).unwrap();
        let mut seen = Vec::new();
        while let Some((k, _v)) = cursor.next(&mut store).unwrap() {
            seen.push(crate::btree::key_encoding::decode_i64(k.as_slice().try_into().unwrap()));
        }
        assert_eq!(seen, (0..count).collect::<Vec<_>>());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_cursor_from_key() {
        let (mut pager, path) = setup();
        let mut store = PagerStore {
            pager: &mut pager,
            ledger: AllocationLedger::default(),
        };
        let mut btree = BTree::create(&mut store).unwrap();

        for i in 0..50i64 {
            btree.insert(&mut store, &encode_i64(i), b"v").unwrap();
        }

        let mut cursor = BTreeCursor::from_key(&btree, &mut store, &encode_i64(30)).unwrap();
        let mut seen = Vec::new();
        while let Some((k, _v)) = cursor.next(&mut store).unwrap() {
            seen.push(crate::btree::key_encoding::decode_i64(k.as_slice().try_into().unwrap()));
        }
        assert_eq!(seen, (30..50).collect::<Vec<_>>());

        std::fs::remove_file(&path).ok();
    }
}
