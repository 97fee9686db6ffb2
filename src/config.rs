//! Engine configuration surface presented to the host embedding this crate.

use crate::error::{DecentError, Result};
use crate::storage::page::{is_valid_page_size, DEFAULT_PAGE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncMode {
    /// Every commit issues a full `fsync`-equivalent flush.
    Full,
    /// Every commit flushes but may rely on a weaker durability barrier where the
    /// platform offers one (treated identically to `Full` by the `Vfs` trait today).
    Normal,
    /// No flush on commit. Only valid for tests; durability guarantees do not hold.
    Off,
}

/// Tunable knobs for an `Engine`, built with chained `with_*` methods.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub page_size: usize,
    pub cache_size_pages: usize,
    pub wal_sync_mode: WalSyncMode,
    pub checkpoint_bytes: u64,
    pub checkpoint_ms: u64,
    pub checkpoint_timeout_sec: u64,
    pub reader_warn_ms: u64,
    pub busy_timeout_ms: u64,
    pub max_sql_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            page_size: DEFAULT_PAGE_SIZE,
            cache_size_pages: 2048,
            wal_sync_mode: WalSyncMode::Full,
            checkpoint_bytes: 64 * 1024 * 1024,
            checkpoint_ms: 30_000,
            checkpoint_timeout_sec: 10,
            reader_warn_ms: 5_000,
            busy_timeout_ms: 5_000,
            max_sql_bytes: 1 << 20,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_cache_size_pages(mut self, pages: usize) -> Self {
        self.cache_size_pages = pages;
        self
    }

    pub fn with_wal_sync_mode(mut self, mode: WalSyncMode) -> Self {
        self.wal_sync_mode = mode;
        self
    }

    pub fn with_checkpoint_bytes(mut self, bytes: u64) -> Self {
        self.checkpoint_bytes = bytes;
        self
    }

    pub fn with_checkpoint_ms(mut self, ms: u64) -> Self {
        self.checkpoint_ms = ms;
        self
    }

    pub fn with_checkpoint_timeout_sec(mut self, sec: u64) -> Self {
        self.checkpoint_timeout_sec = sec;
        self
    }

    pub fn with_reader_warn_ms(mut self, ms: u64) -> Self {
        self.reader_warn_ms = ms;
        self
    }

    pub fn with_busy_timeout_ms(mut self, ms: u64) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    pub fn with_max_sql_bytes(mut self, bytes: usize) -> Self {
        self.max_sql_bytes = bytes;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_page_size(self.page_size) {
            return Err(DecentError::InvalidPageSize(self.page_size));
        }
        if self.cache_size_pages == 0 {
            return Err(DecentError::Internal(
                "cache_size_pages must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Inline/overflow threshold for the record codec, per the `page_size / 4` decision
    /// recorded in DESIGN.md.
    pub fn inline_threshold(&self) -> usize {
        self.page_size / 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_page_size() {
        let cfg = EngineConfig::new().with_page_size(3000);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn builder_chains() {
        let cfg = EngineConfig::new()
            .with_page_size(8192)
            .with_cache_size_pages(64)
            .with_busy_timeout_ms(1000);
        assert_eq!(cfg.page_size, 8192);
        assert_eq!(cfg.cache_size_pages, 64);
        assert_eq!(cfg.busy_timeout_ms, 1000);
        assert_eq!(cfg.inline_threshold(), 2048);
    }
}
