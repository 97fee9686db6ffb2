use crate::storage::page::MAX_PAGE_SIZE;

pub mod checkpoint;
pub mod index;
pub mod reader;
pub mod record;
pub mod recovery;
pub mod writer;

pub use checkpoint::{checkpoint, CheckpointReport};
pub use index::WalIndex;
pub use reader::{read_all_frames, read_frame_at, WalFrame};
pub use record::{Lsn, TxId, WalRecord};
pub use recovery::recover;
pub use writer::WalWriter;

/// Upper bound for one WAL frame payload size. `PagePut` with one full page at the largest
/// configurable page size is the biggest record currently emitted.
pub const MAX_WAL_FRAME_LEN: usize = MAX_PAGE_SIZE + 1024;
