//! The transaction manager: ties the pager, WAL, and concurrency admission together into
//! atomic write transactions and snapshot read transactions.

pub mod page_store;
pub mod transaction;

pub use page_store::{SnapshotPageStore, TxPageStore};
pub use transaction::{TxState, Writer};
