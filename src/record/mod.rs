//! Typed tuple encoding with overflow-chain support for oversized TEXT/BLOB values.
//!
//! A type-tag-plus-length-prefixed-payload layout for the six field kinds (`Null`, `Int64`,
//! `Bool`, `Float64`, `Text`, `Blob`), extended with a page-aware overflow locator/chain so a
//! single field can outgrow one page without growing the inline record format.

mod overflow;
mod varint;

pub use overflow::{free_overflow_chain, OVERFLOW_NEXT_OFFSET};

use crate::error::{DecentError, Result};
use crate::storage::page_store::PageStore;
use crate::types::{DataType, Value};
use varint::{read_uvarint, write_uvarint};

const OVERFLOW_FLAG: u8 = 0x80;
/// total_size(8) + first_overflow_page(8)
const OVERFLOW_LOCATOR_LEN: usize = 16;

/// Encode a row of values. Fields whose payload exceeds `inline_threshold` bytes spill into an
/// overflow chain allocated through `store`.
pub fn encode_record(
    values: &[Value],
    store: &mut impl PageStore,
    inline_threshold: usize,
) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(values.len() * 9 + 8);
    write_uvarint(&mut buf, values.len() as u64);

    let null_bitmap_len = values.len().div_ceil(8);
    let bitmap_pos = buf.len();
    buf.resize(bitmap_pos + null_bitmap_len, 0);
    for (i, v) in values.iter().enumerate() {
        if v.is_null() {
            buf[bitmap_pos + i / 8] |= 1 << (i % 8);
        }
    }

    for v in values {
        if v.is_null() {
            continue;
        }
        let dt = v.data_type().unwrap();
        match v {
            Value::Int64(n) => {
                buf.push(dt.tag());
                write_uvarint(&mut buf, zigzag_encode(*n));
            }
            Value::Bool(b) => {
                buf.push(dt.tag());
                buf.push(if *b { 1 } else { 0 });
            }
            Value::Float64(f) => {
                buf.push(dt.tag());
                buf.extend_from_slice(&f.to_le_bytes());
            }
            Value::Text(s) => encode_blob_like(&mut buf, dt, s.as_bytes(), store, inline_threshold)?,
            Value::Blob(b) => encode_blob_like(&mut buf, dt, b, store, inline_threshold)?,
            Value::Null => unreachable!(),
        }
    }
    Ok(buf)
}

fn encode_blob_like(
    buf: &mut Vec<u8>,
    dt: DataType,
    bytes: &[u8],
    store: &mut impl PageStore,
    inline_threshold: usize,
) -> Result<()> {
    if bytes.len() <= inline_threshold {
        buf.push(dt.tag());
        write_uvarint(buf, bytes.len() as u64);
        buf.extend_from_slice(bytes);
    } else {
        let first_page = overflow::write_overflow_chain(store, bytes)?;
        buf.push(dt.tag() | OVERFLOW_FLAG);
        buf.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
        buf.extend_from_slice(&first_page.to_le_bytes());
    }
    Ok(())
}

/// Decode a row previously produced by `encode_record`.
pub fn decode_record(bytes: &[u8], store: &mut impl PageStore) -> Result<Vec<Value>> {
    let mut pos = 0usize;
    let num_fields = read_uvarint(bytes, &mut pos)? as usize;
    let bitmap_len = num_fields.div_ceil(8);
    if pos + bitmap_len > bytes.len() {
        return Err(DecentError::Corruption("truncated null bitmap".into()));
    }
    let bitmap = &bytes[pos..pos + bitmap_len];
    pos += bitmap_len;

    let mut values = Vec::with_capacity(num_fields);
    for i in 0..num_fields {
        let is_null = (bitmap[i / 8] >> (i % 8)) & 1 == 1;
        if is_null {
            values.push(Value::Null);
            continue;
        }
        if pos >= bytes.len() {
            return Err(DecentError::Corruption("truncated record".into()));
        }
        let raw_tag = bytes[pos];
        pos += 1;
        let overflowed = raw_tag & OVERFLOW_FLAG != 0;
        let dt = DataType::from_tag(raw_tag & !OVERFLOW_FLAG)
            .ok_or_else(|| DecentError::Corruption("unknown field type tag".into()))?;

        let value = match dt {
            DataType::Int64 => {
                let zz = read_uvarint(bytes, &mut pos)?;
                Value::Int64(zigzag_decode(zz))
            }
            DataType::Bool => {
                let b = bytes[pos];
                pos += 1;
                Value::Bool(b != 0)
            }
            DataType::Float64 => {
                let f = f64::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap());
                pos += 8;
                Value::Float64(f)
            }
            DataType::Text | DataType::Blob => {
                let raw = if overflowed {
                    let total = u64::from_le_bytes(
                        bytes[pos..pos + 8].try_into().unwrap(),
                    ) as usize;
                    let first_page = u64::from_le_bytes(
                        bytes[pos + 8..pos + OVERFLOW_LOCATOR_LEN].try_into().unwrap(),
                    );
                    pos += OVERFLOW_LOCATOR_LEN;
                    overflow::read_overflow_chain(store, first_page, total)?
                } else {
                    let len = read_uvarint(bytes, &mut pos)? as usize;
                    let raw = bytes[pos..pos + len].to_vec();
                    pos += len;
                    raw
                };
                match dt {
                    DataType::Text => Value::Text(
                        String::from_utf8(raw)
                            .map_err(|_| DecentError::Corruption("invalid utf-8 text field".into()))?,
                    ),
                    DataType::Blob => Value::Blob(raw),
                    _ => unreachable!(),
                }
            }
        };
        values.push(value);
    }
    Ok(values)
}

fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

fn zigzag_decode(z: u64) -> i64 {
    ((z >> 1) as i64) ^ -((z & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::{Page, PageId};
    use std::collections::HashMap;

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
            self.pages
                .get(&page_id)
                .cloned()
                .ok_or(DecentError::PageNotFound(page_id))
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

    #[test]
    fn roundtrip_inline_values() {
        let mut store = MemStore::new();
        let values = vec![
            Value::Int64(-42),
            Value::Bool(true),
            Value::Float64(3.25),
            Value::Text("hello".into()),
            Value::Blob(vec![1, 2, 3]),
            Value::Null,
        ];
        let encoded = encode_record(&values, &mut store, 128).unwrap();
        let decoded = decode_record(&encoded, &mut store).unwrap();
        assert_eq!(values, decoded);
    }

    #[test]
    fn roundtrip_overflowing_blob() {
        let mut store = MemStore::new();
        let big = vec![0x42u8; 3000];
        let values = vec![Value::Blob(big.clone())];
        let encoded = encode_record(&values, &mut store, 128).unwrap();
        let decoded = decode_record(&encoded, &mut store).unwrap();
        assert_eq!(decoded, vec![Value::Blob(big)]);
    }

    #[test]
    fn freeing_overflow_chain_releases_pages() {
        let mut store = MemStore::new();
        let big = vec![0xAAu8; 3000];
        let first_page = overflow::write_overflow_chain(&mut store, &big).unwrap();
        assert!(!store.pages.is_empty());
        overflow::free_overflow_chain(&mut store, first_page).unwrap();
        assert!(store.pages.is_empty());
    }
}
