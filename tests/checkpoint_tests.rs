//! Checkpoint threshold behavior, grounded in `EngineConfig`'s `checkpoint_bytes`/`checkpoint_ms`
//! knobs and the automatic `Engine::maybe_checkpoint` call every commit makes.

use std::sync::Arc;

use decentdb::clock::{Clock, TestClock};
use decentdb::config::EngineConfig;
use decentdb::schema::ColumnDef;
use decentdb::types::DataType;
use decentdb::Engine;
use tempfile::TempDir;

#[test]
fn a_tiny_byte_threshold_triggers_an_automatic_checkpoint_on_the_next_commit() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("t.db");
    let config = EngineConfig::new().with_checkpoint_bytes(1);
    let engine = Engine::create(&db_path, config, Arc::new(TestClock::new())).unwrap();

    engine
        .create_table("t", vec![ColumnDef::new("id", DataType::Int64).primary_key()])
        .unwrap();

    // The commit above should already have tripped `maybe_checkpoint`, so a forced checkpoint
    // right after finds nothing left to copy.
    let report = engine.checkpoint().unwrap();
    assert_eq!(report.pages_copied, 0);
}

#[test]
fn checkpoint_ms_does_not_fire_before_its_deadline_but_does_after() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("t.db");
    let config = EngineConfig::new()
        .with_checkpoint_bytes(u64::MAX)
        .with_checkpoint_ms(1000);
    let clock = Arc::new(TestClock::new());
    let engine = Engine::create(&db_path, config, clock.clone()).unwrap();

    engine
        .create_table("early", vec![ColumnDef::new("id", DataType::Int64).primary_key()])
        .unwrap();
    assert!(engine.maybe_checkpoint().unwrap().is_none());

    clock.advance(2000);
    engine
        .create_table("late", vec![ColumnDef::new("id", DataType::Int64).primary_key()])
        .unwrap();
    // The commit above runs `maybe_checkpoint` itself once the deadline has passed, so a
    // direct call afterward should again find nothing pending.
    assert!(engine.checkpoint().unwrap().pages_copied == 0);
}

#[test]
fn a_forced_checkpoint_truncates_the_wal_once_no_readers_are_registered() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("t.db");
    let engine = Engine::create(&db_path, EngineConfig::new(), Arc::new(TestClock::new())).unwrap();

    engine
        .create_table("t", vec![ColumnDef::new("id", DataType::Int64).primary_key()])
        .unwrap();
    let report = engine.checkpoint().unwrap();
    assert!(report.wal_truncated);
}
