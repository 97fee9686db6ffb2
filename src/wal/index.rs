//! In-memory WAL index: `PageId -> [(frame_offset, commit_lsn)]`, newest-commit-last, so a
//! reader holding a snapshot LSN can find the newest committed version of a page at or before
//! its snapshot without scanning the whole log.

use crate::storage::page::PageId;
use crate::wal::record::Lsn;
use std::collections::HashMap;

#[derive(Default)]
pub struct WalIndex {
    versions: HashMap<PageId, Vec<(u64, Lsn)>>,
}

impl WalIndex {
    pub fn new() -> Self {
        WalIndex::default()
    }

    /// Record that `page_id`'s image at `frame_offset` became visible as of `commit_lsn`.
    /// Entries for a page must be inserted in increasing `commit_lsn` order.
    pub fn record(&mut self, page_id: PageId, frame_offset: u64, commit_lsn: Lsn) {
        self.versions.entry(page_id).or_default().push((frame_offset, commit_lsn));
    }

    /// The newest frame offset for `page_id` with `commit_lsn <= snapshot_lsn`, if any.
    pub fn lookup(&self, page_id: PageId, snapshot_lsn: Lsn) -> Option<u64> {
        let entries = self.versions.get(&page_id)?;
        entries
            .iter()
            .rev()
            .find(|(_, lsn)| *lsn <= snapshot_lsn)
            .map(|(offset, _)| *offset)
    }

    /// Every page id with at least one indexed version at or below `snapshot_lsn`, for a
    /// checkpoint pass to iterate over.
    pub fn page_ids_at_or_below(&self, snapshot_lsn: Lsn) -> Vec<PageId> {
        self.versions
            .iter()
            .filter(|(_, versions)| versions.iter().any(|(_, lsn)| *lsn <= snapshot_lsn))
            .map(|(page_id, _)| *page_id)
            .collect()
    }

    /// Drop every indexed version at or below `checkpointed_through`: after a checkpoint copies
    /// those images into the main file, the WAL frames backing them are no longer needed to
    /// satisfy a read and the WAL itself is about to be truncated.
    pub fn retain_above(&mut self, checkpointed_through: Lsn) {
        for versions in self.versions.values_mut() {
            versions.retain(|(_, lsn)| *lsn > checkpointed_through);
        }
        self.versions.retain(|_, v| !v.is_empty());
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn clear(&mut self) {
        self.versions.clear();
    }
}
