//! On-disk free-page chain: a header-resident head + count
//! (`DbHeader::freelist_head`/`freelist_count`) plus an in-page singly-linked chain, so the list
//! can grow past a single page's worth of `PageId`s. Each free page stores `next_page_id`
//! (0 = end of chain) right after its slotted-page header.

use crate::storage::page::{Page, PageId, PAGE_HEADER_SIZE};

const NEXT_PTR_OFFSET: usize = PAGE_HEADER_SIZE;
const NEXT_PTR_SIZE: usize = 8;

/// Write the `next_page_id` link into a page being pushed onto the freelist.
/// The page's cell contents are irrelevant once freed; this overwrites the region
/// immediately following the slotted-page header.
pub fn set_next(page: &mut Page, next: PageId) {
    page.data[NEXT_PTR_OFFSET..NEXT_PTR_OFFSET + NEXT_PTR_SIZE]
        .copy_from_slice(&next.to_le_bytes());
}

/// Read the `next_page_id` link out of a page popped off the freelist.
pub fn next(page: &Page) -> PageId {
    u64::from_le_bytes(
        page.data[NEXT_PTR_OFFSET..NEXT_PTR_OFFSET + NEXT_PTR_SIZE]
            .try_into()
            .unwrap(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::DEFAULT_PAGE_SIZE;

    #[test]
    fn next_pointer_roundtrip() {
        let mut page = Page::new(5, DEFAULT_PAGE_SIZE);
        set_next(&mut page, 42);
        assert_eq!(next(&page), 42);
    }

    #[test]
    fn default_next_is_zero() {
        let page = Page::new(5, DEFAULT_PAGE_SIZE);
        assert_eq!(next(&page), 0);
    }
}
