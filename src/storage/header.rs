//! The database header, stored as the first bytes of page 1 (bytes 0..127).
//!
//! A fixed-offset byte layout rather than a slotted cell, so it can carry a CRC-32C and be
//! validated on open without first decoding a cell-pointer array.

use crate::error::{DecentError, Result};

pub const MAGIC: &[u8; 8] = b"DECENTB1";
pub const FORMAT_VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 128;

/// Byte layout (little-endian):
///   [0..8)    magic
///   [8..12)   format version
///   [12..16)  page_size
///   [16..24)  page_count
///   [24..32)  schema_cookie
///   [32..40)  catalog_root (PageId)
///   [40..48)  freelist_head (PageId, 0 = empty)
///   [48..52)  freelist_count
///   [52..116) reserved
///   [116..120) header crc-32c (covers bytes [0..116))
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbHeader {
    pub page_size: u32,
    pub page_count: u64,
    pub schema_cookie: u64,
    pub catalog_root: u64,
    pub freelist_head: u64,
    pub freelist_count: u32,
}

impl DbHeader {
    pub fn new(page_size: u32) -> Self {
        DbHeader {
            page_size,
            page_count: 1,
            schema_cookie: 0,
            catalog_root: 0,
            freelist_head: 0,
            freelist_count: 0,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(MAGIC);
        buf[8..12].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[12..16].copy_from_slice(&self.page_size.to_le_bytes());
        buf[16..24].copy_from_slice(&self.page_count.to_le_bytes());
        buf[24..32].copy_from_slice(&self.schema_cookie.to_le_bytes());
        buf[32..40].copy_from_slice(&self.catalog_root.to_le_bytes());
        buf[40..48].copy_from_slice(&self.freelist_head.to_le_bytes());
        buf[48..52].copy_from_slice(&self.freelist_count.to_le_bytes());
        let crc = crc32c::crc32c(&buf[0..116]);
        buf[116..120].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(DecentError::Corruption("header too short".into()));
        }
        if &buf[0..8] != MAGIC {
            return Err(DecentError::Corruption("bad magic".into()));
        }
        let version = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(DecentError::Corruption(format!(
                "unsupported format version {version}"
            )));
        }
        let stored_crc = u32::from_le_bytes(buf[116..120].try_into().unwrap());
        let actual_crc = crc32c::crc32c(&buf[0..116]);
        if stored_crc != actual_crc {
            return Err(DecentError::Corruption("header CRC mismatch".into()));
        }
        Ok(DbHeader {
            page_size: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            page_count: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            schema_cookie: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
            catalog_root: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
            freelist_head: u64::from_le_bytes(buf[40..48].try_into().unwrap()),
            freelist_count: u32::from_le_bytes(buf[48..52].try_into().unwrap()),
        })
    }
}
