//! DecentDB: an embedded, single-process relational database's storage and transaction core.
//!
//! Provides a paged file format, a write-ahead log with crash recovery and checkpointing, a
//! B+tree keyed ordered map, a record codec with overflow pages, a system catalog, and the
//! concurrency admission rules that compose them into atomic write transactions and
//! snapshot-isolated read transactions. SQL parsing/execution, full-text search, and the CLI
//! tooling that consumes this core live above it, out of this crate's scope.

pub mod btree;
pub mod clock;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod record;
pub mod schema;
pub mod storage;
pub mod tx;
pub mod types;
pub mod vfs;
pub mod wal;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::concurrency::{Concurrency, ReaderHandle, WriterGuard};
use crate::config::EngineConfig;
use crate::error::{DecentError, Result};
use crate::schema::{ColumnDef, ForeignKeyDef, IndexDef, SystemCatalog, TableDef};
use crate::storage::pager::Pager;
use crate::tx::{SnapshotPageStore, TxPageStore, Writer};
use crate::vfs::{OsVfs, Vfs};
use crate::wal::{checkpoint as run_checkpoint, CheckpointReport, Lsn, TxId, WalIndex, WalWriter};

fn wal_path_for(db_path: &Path) -> PathBuf {
    db_path.with_extension("wal")
}

/// A registered read transaction: a fixed snapshot LSN plus a reader-table registration that
/// keeps checkpoint from truncating WAL frames this snapshot still depends on. Holding one
/// only borrows `Engine`'s `Concurrency`, never its page/WAL state, so a write transaction can
/// commit on another thread while this is alive.
pub struct ReadTxn<'a> {
    snapshot_lsn: Lsn,
    _reader: ReaderHandle<'a>,
}

impl<'a> ReadTxn<'a> {
    pub fn snapshot_lsn(&self) -> Lsn {
        self.snapshot_lsn
    }
}

/// An active write transaction: the dirty-page buffer plus the writer-lock guard that excludes
/// every other writer for its lifetime.
pub struct WriteTxn<'a> {
    writer: Writer,
    _guard: WriterGuard<'a>,
}

impl<'a> WriteTxn<'a> {
    pub fn txid(&self) -> TxId {
        self.writer.txid()
    }
}

/// The mutable page/WAL/catalog state, behind one mutex so `Engine`'s methods take `&self` and
/// a shared `Arc<Engine<V>>` can be handed to a writer thread and several reader threads at
/// once — the intended usage for the one-writer/many-readers model `Concurrency` implements.
/// Lock hold times are kept short (one commit, one page read, one checkpoint pass); readers are
/// never blocked by the lock itself, only momentarily serialized while touching shared state,
/// which is distinct from the logical MVCC blocking `Concurrency` governs.
struct EngineInner<V: Vfs> {
    pager: Pager<V>,
    wal: WalWriter<V>,
    wal_index: WalIndex,
    catalog: SystemCatalog,
    next_txid: TxId,
    bytes_since_checkpoint: u64,
    last_checkpoint_ms: u64,
}

/// The storage/transaction engine: owns the page file, the WAL, the catalog, and the
/// concurrency admission state for one open database.
pub struct Engine<V: Vfs = OsVfs> {
    vfs: V,
    db_path: PathBuf,
    wal_path: PathBuf,
    inner: Mutex<EngineInner<V>>,
    concurrency: Concurrency,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    read_only: AtomicBool,
}

impl Engine<OsVfs> {
    /// Create a fresh database at `path` (and `path` with a `.wal` extension for the log).
    pub fn create(path: &Path, config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::create_with_vfs(OsVfs::new(), path, config, clock)
    }

    /// Open an existing database at `path`, running WAL recovery first if a WAL file exists.
    pub fn open(path: &Path, config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::open_with_vfs(OsVfs::new(), path, config, clock)
    }
}

impl<V: Vfs> Engine<V> {
    pub fn create_with_vfs(
        vfs: V,
        path: &Path,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let wal_path = wal_path_for(path);

        let mut pager = Pager::create(&vfs, path, config.page_size, config.cache_size_pages)?;
        let mut wal = WalWriter::create(&vfs, &wal_path)?;
        let mut wal_index = WalIndex::new();

        // Bootstrap the system catalog inside an ordinary write transaction, so its root-page
        // allocation and header update go through the same WAL-commit path as any other write.
        let mut writer = Writer::begin(0, 0);
        let catalog = {
            let mut store = TxPageStore::new(&mut writer, &mut pager);
            SystemCatalog::create(&mut store)?
        };
        pager.set_catalog_root(catalog.root_page_id());
        writer.commit(&mut pager, &mut wal, &mut wal_index)?;
        pager.flush_header()?;
        pager.sync()?;

        info!(db = %path.display(), page_size = config.page_size, "database created");

        Ok(Engine {
            vfs,
            db_path: path.to_path_buf(),
            wal_path,
            inner: Mutex::new(EngineInner {
                pager,
                wal,
                wal_index,
                catalog,
                next_txid: 1,
                bytes_since_checkpoint: 0,
                last_checkpoint_ms: 0,
            }),
            concurrency: Concurrency::new(Duration::from_millis(config.busy_timeout_ms)),
            clock,
            config,
            read_only: AtomicBool::new(false),
        })
    }

    pub fn open_with_vfs(
        vfs: V,
        path: &Path,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let wal_path = wal_path_for(path);

        let mut pager = Pager::open(&vfs, path, config.cache_size_pages)?;

        let (wal, wal_index) = if vfs.exists(&wal_path) {
            let recovered = crate::wal::recover(&vfs, &wal_path, &mut pager)?;
            pager.sync()?;
            info!(
                db = %path.display(),
                pages_replayed = recovered.page_ids_at_or_below(u64::MAX).len(),
                "WAL recovery complete"
            );
            // Recovered pages are already durable in the main file; the replayed frames are
            // done serving readers, so treat this as an implicit checkpoint and start fresh.
            let mut wal = WalWriter::open_for_append(&vfs, &wal_path, 0, 0)?;
            wal.reset()?;
            (wal, WalIndex::new())
        } else {
            (WalWriter::create(&vfs, &wal_path)?, WalIndex::new())
        };

        let catalog = SystemCatalog::open(pager.catalog_root());

        Ok(Engine {
            vfs,
            db_path: path.to_path_buf(),
            wal_path,
            inner: Mutex::new(EngineInner {
                pager,
                wal,
                wal_index,
                catalog,
                next_txid: 1,
                bytes_since_checkpoint: 0,
                last_checkpoint_ms: 0,
            }),
            concurrency: Concurrency::new(Duration::from_millis(config.busy_timeout_ms)),
            clock,
            config,
            read_only: AtomicBool::new(false),
        })
    }

    /// Flush the header and fsync before an orderly shutdown. A dropped `Engine` without
    /// calling this still leaves the database recoverable (any uncheckpointed commits replay
    /// from the WAL on next open), but `close` avoids that replay.
    pub fn close(self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.pager.flush_header()?;
        inner.pager.sync()?;
        Ok(())
    }

    fn check_read_only(&self) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(DecentError::ReadOnly);
        }
        Ok(())
    }

    /// Begin a snapshot read transaction at the current WAL end. Readers never block on a
    /// writer and never take the writer lock.
    pub fn begin_read(&self) -> ReadTxn<'_> {
        let snapshot_lsn = self.inner.lock().wal.current_lsn();
        let reader = self.concurrency.begin_read(snapshot_lsn);
        ReadTxn {
            snapshot_lsn,
            _reader: reader,
        }
    }

    pub fn end_read(&self, _txn: ReadTxn<'_>) {
        // Unregistration happens in `ReaderHandle`'s `Drop`; this exists to make the begin/end
        // pairing explicit at call sites even though dropping the `ReadTxn` would suffice.
    }

    /// Begin a write transaction. Blocks (up to `busy_timeout_ms`) for the writer lock.
    pub fn begin_write(&self) -> Result<WriteTxn<'_>> {
        self.check_read_only()?;
        let guard = match self.concurrency.begin_write() {
            Ok(g) => g,
            Err(e) => {
                warn!(timeout_ms = self.config.busy_timeout_ms, "writer lock busy");
                return Err(e);
            }
        };
        let (txid, snapshot_lsn) = {
            let inner = self.inner.lock();
            (inner.next_txid, inner.wal.current_lsn())
        };
        Ok(WriteTxn {
            writer: Writer::begin(txid, snapshot_lsn),
            _guard: guard,
        })
    }

    /// Commit a write transaction: append its dirty pages to the WAL, fsync, and index the new
    /// versions. A commit that hits a `DecentError::Corruption` flips the engine read-only.
    pub fn commit(&self, mut txn: WriteTxn<'_>) -> Result<Lsn> {
        let dirty = txn.writer.dirty_page_count();
        let mut inner = self.inner.lock();
        let outcome = txn
            .writer
            .commit(&mut inner.pager, &mut inner.wal, &mut inner.wal_index);
        match outcome {
            Ok(lsn) => {
                inner.next_txid += 1;
                inner.bytes_since_checkpoint += dirty as u64 * inner.pager.page_size() as u64;
                debug!(lsn, pages = dirty, "transaction committed");
                drop(inner);
                // Drop the writer-lock guard before checking for a checkpoint: `maybe_checkpoint`
                // takes the same lock internally, and it is not reentrant.
                drop(txn);
                self.maybe_checkpoint()?;
                Ok(lsn)
            }
            Err(e) => {
                if e.is_fatal() {
                    self.read_only.store(true, Ordering::SeqCst);
                }
                Err(e)
            }
        }
    }

    pub fn rollback(&self, mut txn: WriteTxn<'_>) -> Result<()> {
        let mut inner = self.inner.lock();
        txn.writer.rollback(&mut inner.pager, &mut inner.wal)
    }

    /// Run a checkpoint if either threshold in `EngineConfig` has been crossed since the last
    /// one. Called automatically after every commit; also callable directly.
    pub fn maybe_checkpoint(&self) -> Result<Option<CheckpointReport>> {
        let now_ms = self.clock.now_ms();
        let due = {
            let inner = self.inner.lock();
            inner.bytes_since_checkpoint >= self.config.checkpoint_bytes
                || now_ms.saturating_sub(inner.last_checkpoint_ms) >= self.config.checkpoint_ms
        };
        if !due {
            return Ok(None);
        }
        Ok(Some(self.checkpoint()?))
    }

    /// Force a checkpoint pass right now.
    pub fn checkpoint(&self) -> Result<CheckpointReport> {
        let mut inner = self.inner.lock();
        let report = run_checkpoint(
            &self.vfs,
            &self.wal_path,
            &mut inner.pager,
            &mut inner.wal,
            &mut inner.wal_index,
            &self.concurrency,
        )?;
        inner.bytes_since_checkpoint = 0;
        inner.last_checkpoint_ms = self.clock.now_ms();
        info!(
            safe_lsn = report.safe_lsn,
            pages_copied = report.pages_copied,
            wal_truncated = report.wal_truncated,
            "checkpoint"
        );
        Ok(report)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    pub fn schema_cookie(&self) -> u64 {
        self.inner.lock().pager.schema_cookie()
    }

    /// Run `body` against a `PageStore` over `txn`'s dirty buffer, for B+tree operations on
    /// table/index data outside the catalog (row inserts, scans, etc.).
    pub fn with_write_store<T>(
        &self,
        txn: &mut WriteTxn<'_>,
        body: impl FnOnce(&mut TxPageStore<'_, V>) -> Result<T>,
    ) -> Result<T> {
        let mut inner = self.inner.lock();
        let mut store = TxPageStore::new(&mut txn.writer, &mut inner.pager);
        body(&mut store)
    }

    /// Run `body` against a `PageStore` over `txn`'s WAL-index snapshot overlay.
    pub fn with_read_store<T>(
        &self,
        txn: &ReadTxn<'_>,
        body: impl FnOnce(&mut SnapshotPageStore<'_, V>) -> Result<T>,
    ) -> Result<T> {
        let mut inner = self.inner.lock();
        let mut store = SnapshotPageStore::open(
            &self.vfs,
            &self.wal_path,
            &mut inner.pager,
            &inner.wal_index,
            txn.snapshot_lsn(),
        )?;
        body(&mut store)
    }

    // --- DDL convenience wrappers: each runs inside its own write transaction and bumps the
    // header's schema_cookie on success. ---

    pub fn create_table(&self, name: &str, columns: Vec<ColumnDef>) -> Result<TableDef> {
        let mut txn = self.begin_write()?;
        let result = {
            let mut inner = self.inner.lock();
            let mut store = TxPageStore::new(&mut txn.writer, &mut inner.pager);
            inner.catalog.create_table(&mut store, name, columns)
        };
        self.finish_ddl(txn, result, name)
    }

    pub fn drop_table(&self, name: &str) -> Result<TableDef> {
        let mut txn = self.begin_write()?;
        let result = {
            let mut inner = self.inner.lock();
            let mut store = TxPageStore::new(&mut txn.writer, &mut inner.pager);
            inner.catalog.drop_table(&mut store, name)
        };
        self.finish_ddl(txn, result, name)
    }

    pub fn create_index(&self, index_def: IndexDef) -> Result<IndexDef> {
        let mut txn = self.begin_write()?;
        let name = index_def.name.clone();
        let result = {
            let mut inner = self.inner.lock();
            let mut store = TxPageStore::new(&mut txn.writer, &mut inner.pager);
            inner.catalog.create_index(&mut store, index_def)
        };
        self.finish_ddl(txn, result, &name)
    }

    pub fn drop_index(&self, name: &str) -> Result<IndexDef> {
        let mut txn = self.begin_write()?;
        let result = {
            let mut inner = self.inner.lock();
            let mut store = TxPageStore::new(&mut txn.writer, &mut inner.pager);
            inner.catalog.drop_index(&mut store, name)
        };
        self.finish_ddl(txn, result, name)
    }

    pub fn create_foreign_key(&self, fk: ForeignKeyDef) -> Result<ForeignKeyDef> {
        let mut txn = self.begin_write()?;
        let name = fk.name.clone();
        let result = {
            let mut inner = self.inner.lock();
            let mut store = TxPageStore::new(&mut txn.writer, &mut inner.pager);
            inner.catalog.create_foreign_key(&mut store, fk)
        };
        self.finish_ddl(txn, result, &name)
    }

    fn finish_ddl<T>(&self, txn: WriteTxn<'_>, result: Result<T>, what: &str) -> Result<T> {
        match result {
            Ok(value) => {
                let cookie = {
                    let mut inner = self.inner.lock();
                    let next = inner.pager.schema_cookie() + 1;
                    inner.pager.set_schema_cookie(next);
                    next
                };
                self.commit(txn)?;
                debug!(name = what, cookie, "DDL committed");
                Ok(value)
            }
            Err(e) => {
                self.rollback(txn)?;
                Err(e)
            }
        }
    }

    /// Read-only table lookup: opens a throwaway read snapshot, consults the catalog, and ends
    /// the snapshot before returning.
    pub fn get_table(&self, name: &str) -> Result<Option<TableDef>> {
        let txn = self.begin_read();
        let result = {
            let mut inner = self.inner.lock();
            let mut store = SnapshotPageStore::open(
                &self.vfs,
                &self.wal_path,
                &mut inner.pager,
                &inner.wal_index,
                txn.snapshot_lsn(),
            )?;
            inner.catalog.get_table(&mut store, name)
        };
        self.end_read(txn);
        result
    }

    pub fn list_tables(&self) -> Result<Vec<String>> {
        let txn = self.begin_read();
        let result = {
            let mut inner = self.inner.lock();
            let mut store = SnapshotPageStore::open(
                &self.vfs,
                &self.wal_path,
                &mut inner.pager,
                &inner.wal_index,
                txn.snapshot_lsn(),
            )?;
            inner.catalog.list_tables(&mut store)
        };
        self.end_read(txn);
        result
    }

    pub fn get_indexes_for_table(&self, table_name: &str) -> Result<Vec<IndexDef>> {
        let txn = self.begin_read();
        let result = {
            let mut inner = self.inner.lock();
            let mut store = SnapshotPageStore::open(
                &self.vfs,
                &self.wal_path,
                &mut inner.pager,
                &inner.wal_index,
                txn.snapshot_lsn(),
            )?;
            inner.catalog.get_indexes_for_table(&mut store, table_name)
        };
        self.end_read(txn);
        result
    }

    pub fn get_foreign_keys_for_table(&self, table_name: &str) -> Result<Vec<ForeignKeyDef>> {
        let txn = self.begin_read();
        let result = {
            let mut inner = self.inner.lock();
            let mut store = SnapshotPageStore::open(
                &self.vfs,
                &self.wal_path,
                &mut inner.pager,
                &inner.wal_index,
                txn.snapshot_lsn(),
            )?;
            inner.catalog.get_foreign_keys_for_table(&mut store, table_name)
        };
        self.end_read(txn);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::types::DataType;
    use tempfile::TempDir;

    fn test_clock() -> Arc<dyn Clock> {
        Arc::new(TestClock::new())
    }

    #[test]
    fn create_then_reopen_recovers_a_committed_table() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("t.db");

        {
            let engine = Engine::create(&db_path, EngineConfig::new(), test_clock()).unwrap();
            let columns = vec![ColumnDef::new("id", DataType::Int64).primary_key()];
            engine.create_table("widgets", columns).unwrap();
            engine.close().unwrap();
        }

        let engine = Engine::open(&db_path, EngineConfig::new(), test_clock()).unwrap();
        let table = engine.get_table("widgets").unwrap().unwrap();
        assert_eq!(table.name, "widgets");
        assert_eq!(table.pk_column, Some("id".to_string()));
    }

    #[test]
    fn uncommitted_write_is_invisible_to_a_reader_snapshotted_before_it() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("t.db");
        let engine = Engine::create(&db_path, EngineConfig::new(), test_clock()).unwrap();

        // Registering this snapshot only borrows `engine.concurrency`, so it stays alive across
        // the `create_table` call below — exactly the cross-thread shape this API is for.
        let read_before = engine.begin_read();
        engine
            .create_table("ghosts", vec![ColumnDef::new("id", DataType::Int64).primary_key()])
            .unwrap();

        let result = {
            let mut inner = engine.inner.lock();
            let mut store = SnapshotPageStore::open(
                &engine.vfs,
                &engine.wal_path,
                &mut inner.pager,
                &inner.wal_index,
                read_before.snapshot_lsn(),
            )
            .unwrap();
            inner.catalog.get_table(&mut store, "ghosts")
        };
        assert!(result.unwrap().is_none());
        engine.end_read(read_before);
    }

    #[test]
    fn drop_table_removes_the_catalog_entry_and_bumps_schema_cookie() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("t.db");
        let engine = Engine::create(&db_path, EngineConfig::new(), test_clock()).unwrap();

        engine
            .create_table("temp", vec![ColumnDef::new("id", DataType::Int64).primary_key()])
            .unwrap();
        let cookie_after_create = engine.schema_cookie();

        engine.drop_table("temp").unwrap();
        assert!(engine.get_table("temp").unwrap().is_none());
        assert!(engine.schema_cookie() > cookie_after_create);
    }

    #[test]
    fn checkpoint_reclaims_wal_space_once_no_readers_remain() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("t.db");
        let engine = Engine::create(&db_path, EngineConfig::new(), test_clock()).unwrap();

        engine
            .create_table("t", vec![ColumnDef::new("id", DataType::Int64).primary_key()])
            .unwrap();
        let report = engine.checkpoint().unwrap();
        assert!(report.wal_truncated);
    }

    #[test]
    fn second_writer_gets_busy_while_first_holds_the_lock() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("t.db");
        let config = EngineConfig::new().with_busy_timeout_ms(10);
        let engine = Engine::create(&db_path, config, test_clock()).unwrap();

        let _txn1 = engine.begin_write().unwrap();
        assert!(matches!(engine.begin_write(), Err(DecentError::Busy(_))));
    }

    #[test]
    fn writer_on_another_thread_can_commit_while_a_reader_holds_its_snapshot() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("t.db");
        let engine = Arc::new(Engine::create(&db_path, EngineConfig::new(), test_clock()).unwrap());

        let reader = engine.begin_read();
        let writer_engine = engine.clone();
        let handle = std::thread::spawn(move || {
            writer_engine
                .create_table("t", vec![ColumnDef::new("id", DataType::Int64).primary_key()])
                .unwrap();
        });
        handle.join().unwrap();

        assert!(engine.get_table("t").unwrap().is_some());
        drop(reader);
    }
}
