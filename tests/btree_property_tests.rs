//! Property-based B+tree invariants: an `impl PageStore` over in-memory pages, the same fixture
//! style as `btree::ops::tests`, driven by `proptest` instead of fixed cases to cover ordering
//! and insert/delete consistency across random key sequences.

use std::collections::{BTreeMap, HashMap};

use decentdb::btree::ops::BTree;
use decentdb::error::{DecentError, Result};
use decentdb::storage::page::{Page, PageId};
use decentdb::storage::page_store::PageStore;
use proptest::collection::vec as pvec;
use proptest::prelude::*;

struct MemStore {
    pages: HashMap<PageId, Page>,
    next_id: PageId,
    page_size: usize,
}

impl MemStore {
    fn new() -> Self {
        MemStore {
            pages: HashMap::new(),
            next_id: 1,
            page_size: 512,
        }
    }
}

impl PageStore for MemStore {
    fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        self.pages.get(&page_id).cloned().ok_or(DecentError::PageNotFound(page_id))
    }
    fn write_page(&mut self, page: Page) -> Result<()> {
        self.pages.insert(page.page_id(), page);
        Ok(())
    }
    fn allocate_page(&mut self) -> Result<Page> {
        let id = self.next_id;
        self.next_id += 1;
        Ok(Page::new(id, self.page_size))
    }
    fn free_page(&mut self, page_id: PageId) {
        self.pages.remove(&page_id);
    }
    fn page_size(&self) -> usize {
        self.page_size
    }
}

/// A small alphabet keeps keys short enough that many entries fit on one page, forcing splits
/// and merges within a handful of dozen operations rather than needing thousands.
fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    pvec(0u8..8, 1..6)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn scan_visits_every_inserted_key_in_sorted_order(
        pairs in pvec((key_strategy(), pvec(any::<u8>(), 0..16)), 1..80)
    ) {
        let mut store = MemStore::new();
        let mut btree = BTree::create(&mut store).unwrap();
        let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

        for (k, v) in &pairs {
            btree.insert(&mut store, k, v).unwrap();
            model.insert(k.clone(), v.clone());
        }

        let mut seen = Vec::new();
        btree
            .scan(&mut store, |k, v| {
                seen.push((k.to_vec(), v.to_vec()));
                Ok(true)
            })
            .unwrap();

        let expected: Vec<_> = model.into_iter().collect();
        prop_assert_eq!(seen, expected);
    }

    #[test]
    fn every_inserted_key_is_searchable_and_deleted_keys_are_not(
        inserted in pvec(key_strategy(), 1..60),
        delete_every_nth in 2usize..5,
    ) {
        let mut store = MemStore::new();
        let mut btree = BTree::create(&mut store).unwrap();
        let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

        for (i, k) in inserted.iter().enumerate() {
            let v = vec![(i % 256) as u8; 4];
            btree.insert(&mut store, k, &v).unwrap();
            model.insert(k.clone(), v);
        }

        let keys: Vec<_> = model.keys().cloned().collect();
        for (i, k) in keys.iter().enumerate() {
            if i % delete_every_nth == 0 {
                btree.delete(&mut store, k).unwrap();
                model.remove(k);
            }
        }

        for k in &keys {
            let found = btree.search(&mut store, k).unwrap();
            prop_assert_eq!(found, model.get(k).cloned());
        }
    }
}
