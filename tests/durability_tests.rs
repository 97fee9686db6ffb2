//! Crash/durability scenarios driven through `Engine`, grounded in `vfs::faulty::FaultyVfs`
//! and the recovery path `Engine::open_with_vfs` runs on startup.

use std::sync::Arc;

use decentdb::clock::{Clock, TestClock};
use decentdb::config::EngineConfig;
use decentdb::schema::ColumnDef;
use decentdb::types::DataType;
use decentdb::vfs::{FailKind, FaultyVfs, OsVfs};
use decentdb::Engine;
use tempfile::TempDir;

fn test_clock() -> Arc<dyn Clock> {
    Arc::new(TestClock::new())
}

#[test]
fn committed_write_survives_a_process_drop_without_close() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("t.db");

    {
        let engine = Engine::create(&db_path, EngineConfig::new(), test_clock()).unwrap();
        engine
            .create_table("widgets", vec![ColumnDef::new("id", DataType::Int64).primary_key()])
            .unwrap();
        // No `close()` call: simulates a process that committed, then crashed before an
        // orderly shutdown. The WAL still holds the commit frame, so recovery must replay it.
    }

    let engine = Engine::open(&db_path, EngineConfig::new(), test_clock()).unwrap();
    let table = engine.get_table("widgets").unwrap();
    assert!(table.is_some());
}

#[test]
fn torn_wal_tail_is_discarded_on_recovery_and_the_prior_commit_survives() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("t.db");

    {
        let engine =
            Engine::create_with_vfs(FaultyVfs::new(OsVfs::new()), &db_path, EngineConfig::new(), test_clock())
                .unwrap();
        engine
            .create_table("settled", vec![ColumnDef::new("id", DataType::Int64).primary_key()])
            .unwrap();
        engine.close().unwrap();
    }

    {
        let vfs = FaultyVfs::new(OsVfs::new());
        let faults = vfs.faults();
        // `.clone()` hands the engine a handle sharing the same fault schedule while `vfs`
        // (and so `faults`, which borrows it) stays alive in this scope.
        let engine = Engine::open_with_vfs(vfs.clone(), &db_path, EngineConfig::new(), test_clock()).unwrap();
        // Arm a torn write for the next WAL append: the `ghost` table's commit frame lands on
        // disk truncated, exactly the "torn tail" the WAL reader's frame scan is built to stop
        // at without erroring. No `close()` afterward: simulates the crash that caused the tear.
        faults.fail_next_write(FailKind::TornWrite(2));
        engine
            .create_table("ghost", vec![ColumnDef::new("id", DataType::Int64).primary_key()])
            .ok();
    }

    let reopened = Engine::open(&db_path, EngineConfig::new(), test_clock()).unwrap();
    assert!(reopened.get_table("settled").unwrap().is_some());
    assert!(reopened.get_table("ghost").unwrap().is_none());
}

#[test]
fn dropped_flush_does_not_fool_the_engine_into_treating_a_commit_as_durable() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("t.db");
    let vfs = FaultyVfs::new(OsVfs::new());
    let faults = vfs.faults();

    let engine = Engine::create_with_vfs(vfs.clone(), &db_path, EngineConfig::new(), test_clock()).unwrap();
    faults.fail_next_flush(FailKind::DropFlush);
    // The WAL writer's fsync silently no-ops; the frame bytes are still on disk (just not
    // guaranteed durable by the OS), so recovery after a clean reopen still finds the commit.
    engine
        .create_table("maybe_durable", vec![ColumnDef::new("id", DataType::Int64).primary_key()])
        .unwrap();
    engine.close().unwrap();

    let reopened = Engine::open(&db_path, EngineConfig::new(), test_clock()).unwrap();
    assert!(reopened.get_table("maybe_durable").unwrap().is_some());
}
