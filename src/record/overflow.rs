//! Overflow-page chain: a sequence of pages where the first 8 bytes store `next_page_id`
//! (0 terminates) and the remainder holds payload bytes.

use crate::error::Result;
use crate::storage::page::{Page, PageId, PAGE_HEADER_SIZE};
use crate::storage::page_store::PageStore;

pub const OVERFLOW_NEXT_OFFSET: usize = PAGE_HEADER_SIZE;
const NEXT_PTR_SIZE: usize = 8;

fn payload_capacity(page_size: usize) -> usize {
    page_size - OVERFLOW_NEXT_OFFSET - NEXT_PTR_SIZE
}

/// Write `data` across as many overflow pages as needed and return the first page's id.
pub fn write_overflow_chain(store: &mut impl PageStore, data: &[u8]) -> Result<PageId> {
    let page_size = store.page_size();
    let capacity = payload_capacity(page_size);
    let mut chunks: Vec<&[u8]> = data.chunks(capacity).collect();
    if chunks.is_empty() {
        chunks.push(&[]);
    }

    // Allocate pages back-to-front so each page can record the id of its successor.
    let mut pages = Vec::with_capacity(chunks.len());
    for _ in &chunks {
        pages.push(store.allocate_page()?);
    }

    let mut next_id: PageId = 0;
    for (page, chunk) in pages.iter_mut().zip(chunks.iter()).rev() {
        let start = OVERFLOW_NEXT_OFFSET;
        page.data[start..start + NEXT_PTR_SIZE].copy_from_slice(&next_id.to_le_bytes());
        page.data[start + NEXT_PTR_SIZE..start + NEXT_PTR_SIZE + chunk.len()]
            .copy_from_slice(chunk);
        next_id = page.page_id();
    }

    let first_id = pages[0].page_id();
    for page in pages {
        store.write_page(page)?;
    }
    Ok(first_id)
}

/// Walk the chain starting at `first_page`, reassembling `total_len` bytes.
pub fn read_overflow_chain(
    store: &mut impl PageStore,
    first_page: PageId,
    total_len: usize,
) -> Result<Vec<u8>> {
    let page_size = store.page_size();
    let capacity = payload_capacity(page_size);
    let mut out = Vec::with_capacity(total_len);
    let mut page_id = first_page;
    while out.len() < total_len {
        let page: Page = store.read_page(page_id)?;
        let start = OVERFLOW_NEXT_OFFSET;
        let next = u64::from_le_bytes(
            page.data[start..start + NEXT_PTR_SIZE].try_into().unwrap(),
        );
        let remaining = total_len - out.len();
        let take = remaining.min(capacity);
        out.extend_from_slice(&page.data[start + NEXT_PTR_SIZE..start + NEXT_PTR_SIZE + take]);
        page_id = next;
        if page_id == 0 && out.len() < total_len {
            break;
        }
    }
    Ok(out)
}

/// Free every page in the chain starting at `first_page`.
pub fn free_overflow_chain(store: &mut impl PageStore, first_page: PageId) -> Result<()> {
    let mut page_id = first_page;
    while page_id != 0 {
        let page = store.read_page(page_id)?;
        let start = OVERFLOW_NEXT_OFFSET;
        let next = u64::from_le_bytes(
            page.data[start..start + NEXT_PTR_SIZE].try_into().unwrap(),
        );
        store.free_page(page_id);
        page_id = next;
    }
    Ok(())
}
