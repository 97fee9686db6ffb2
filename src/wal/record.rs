//! WAL record types: a tagged-record format, with a `MetaUpdate` record carrying a
//! transaction's catalog-root/page-count/freelist changes so they become WAL-durable before
//! they ever reach the header page.
//!
//! Record types:
//!   Begin(txid)
//!   PagePut(txid, page_id, page_data)
//!   MetaUpdate(txid, catalog_root, page_count, freelist_head, freelist_count)
//!   Commit(txid, lsn)
//!   Abort(txid)
use crate::storage::page::PageId;

pub type TxId = u64;
pub type Lsn = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum WalRecord {
    Begin {
        txid: TxId,
    },
    PagePut {
        txid: TxId,
        page_id: PageId,
        data: Vec<u8>,
    },
    MetaUpdate {
        txid: TxId,
        catalog_root: u64,
        page_count: u64,
        schema_cookie: u64,
        freelist_head: u64,
        freelist_count: u32,
    },
    Commit {
        txid: TxId,
        lsn: Lsn,
    },
    Abort {
        txid: TxId,
    },
}

const TAG_BEGIN: u8 = 1;
const TAG_PAGE_PUT: u8 = 2;
const TAG_COMMIT: u8 = 3;
const TAG_ABORT: u8 = 4;
const TAG_META_UPDATE: u8 = 5;

impl WalRecord {
    pub fn txid(&self) -> TxId {
        match self {
            WalRecord::Begin { txid } => *txid,
            WalRecord::PagePut { txid, .. } => *txid,
            WalRecord::MetaUpdate { txid, .. } => *txid,
            WalRecord::Commit { txid, .. } => *txid,
            WalRecord::Abort { txid } => *txid,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        match self {
            WalRecord::Begin { txid } => {
                let mut buf = Vec::with_capacity(9);
                buf.push(TAG_BEGIN);
                buf.extend_from_slice(&txid.to_le_bytes());
                buf
            }
            WalRecord::PagePut {
                txid,
                page_id,
                data,
            } => {
                let mut buf = Vec::with_capacity(21 + data.len());
                buf.push(TAG_PAGE_PUT);
                buf.extend_from_slice(&txid.to_le_bytes());
                buf.extend_from_slice(&page_id.to_le_bytes());
                buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
                buf.extend_from_slice(data);
                buf
            }
            WalRecord::MetaUpdate {
                txid,
                catalog_root,
                page_count,
                schema_cookie,
                freelist_head,
                freelist_count,
            } => {
                let mut buf = Vec::with_capacity(1 + 8 * 5 + 4);
                buf.push(TAG_META_UPDATE);
                buf.extend_from_slice(&txid.to_le_bytes());
                buf.extend_from_slice(&catalog_root.to_le_bytes());
                buf.extend_from_slice(&page_count.to_le_bytes());
                buf.extend_from_slice(&schema_cookie.to_le_bytes());
                buf.extend_from_slice(&freelist_head.to_le_bytes());
                buf.extend_from_slice(&freelist_count.to_le_bytes());
                buf
            }
            WalRecord::Commit { txid, lsn } => {
                let mut buf = Vec::with_capacity(17);
                buf.push(TAG_COMMIT);
                buf.extend_from_slice(&txid.to_le_bytes());
                buf.extend_from_slice(&lsn.to_le_bytes());
                buf
            }
            WalRecord::Abort { txid } => {
                let mut buf = Vec::with_capacity(9);
                buf.push(TAG_ABORT);
                buf.extend_from_slice(&txid.to_le_bytes());
                buf
            }
        }
    }

    pub fn deserialize(data: &[u8]) -> Option<Self> {
        if data.is_empty() {
            return None;
        }
        match data[0] {
            TAG_BEGIN => {
                if data.len() < 9 {
                    return None;
                }
                Some(WalRecord::Begin {
                    txid: u64::from_le_bytes(data[1..9].try_into().ok()?),
                })
            }
            TAG_PAGE_PUT => {
                if data.len() < 21 {
                    return None;
                }
                let txid = u64::from_le_bytes(data[1..9].try_into().ok()?);
                let page_id = u64::from_le_bytes(data[9..17].try_into().ok()?);
                let data_len = u32::from_le_bytes(data[17..21].try_into().ok()?) as usize;
                if data.len() < 21 + data_len {
                    return None;
                }
                Some(WalRecord::PagePut {
                    txid,
                    page_id,
                    data: data[21..21 + data_len].to_vec(),
                })
            }
            TAG_META_UPDATE => {
                if data.len() < 1 + 8 * 5 + 4 {
                    return None;
                }
                let txid = u64::from_le_bytes(data[1..9].try_into().ok()?);
                let catalog_root = u64::from_le_bytes(data[9..17].try_into().ok()?);
                let page_count = u64::from_le_bytes(data[17..25].try_into().ok()?);
                let schema_cookie = u64::from_le_bytes(data[25..33].try_into().ok()?);
                let freelist_head = u64::from_le_bytes(data[33..41].try_into().ok()?);
                let freelist_count = u32::from_le_bytes(data[41..45].try_into().ok()?);
                Some(WalRecord::MetaUpdate {
                    txid,
                    catalog_root,
                    page_count,
                    schema_cookie,
                    freelist_head,
                    freelist_count,
                })
            }
            TAG_COMMIT => {
                if data.len() < 17 {
                    return None;
                }
                let txid = u64::from_le_bytes(data[1..9].try_into().ok()?);
                let lsn = u64::from_le_bytes(data[9..17].try_into().ok()?);
                Some(WalRecord::Commit { txid, lsn })
            }
            TAG_ABORT => {
                if data.len() < 9 {
                    return None;
                }
                Some(WalRecord::Abort {
                    txid: u64::from_le_bytes(data[1..9].try_into().ok()?),
                })
            }
            _ => None,
        }
    }
}
