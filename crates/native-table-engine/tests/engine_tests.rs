//! Integration tests for the handle-based engine surface.

use std::path::Path;

use native_table_engine::{
   ColumnType, Durability, ERR_BUSY, ERR_DETACHED, ERR_DURABILITY_MISMATCH, ERR_INJECTED,
   ERR_INVALID_HANDLE, ERR_NOT_FOUND, ERR_READ_ONLY, ERR_WRONG_KIND, FaultPoint, NativeHandle,
   ResourceKind, TableEngine, Value,
};

fn init_tracing() {
   let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn mem_session(engine: &TableEngine, name: &str) -> NativeHandle {
   engine
      .open_session(Path::new(name), Durability::MemOnly, false)
      .unwrap()
}

/// Commits one `people` table with a single `name` column holding `names`.
fn seed_people(engine: &TableEngine, session: NativeHandle, names: &[&str]) {
   let group = engine.begin_write(session).unwrap();
   let table = engine.group_table(group, "people", true).unwrap();
   let column = match engine.table_column_index(table, "name") {
      Ok(column) => column,
      Err(_) => engine
         .table_add_column(table, "name", ColumnType::String)
         .unwrap(),
   };
   for name in names {
      let row = engine.table_add_empty_row(table).unwrap();
      engine
         .table_set(table, row, column, Value::from(*name))
         .unwrap();
   }
   engine.commit(group).unwrap();
   engine.destroy(table).unwrap();
   engine.destroy(group).unwrap();
}

// ============================================================================
// Transactions
// ============================================================================

#[test]
fn test_commit_is_visible_to_other_sessions() {
   let engine = TableEngine::new();
   let writer = mem_session(&engine, "shared");
   let reader = mem_session(&engine, "shared");

   seed_people(&engine, writer, &["alice"]);

   let group = engine.begin_read(reader).unwrap();
   let table = engine.group_table(group, "people", false).unwrap();
   assert_eq!(engine.table_size(table).unwrap(), 1);
   assert_eq!(
      engine.table_get(table, 0, 0).unwrap(),
      Value::String("alice".into())
   );
}

#[test]
fn test_read_group_keeps_its_snapshot() {
   let engine = TableEngine::new();
   let session = mem_session(&engine, "snapshot");
   seed_people(&engine, session, &["alice"]);

   let reader = mem_session(&engine, "snapshot");
   let group = engine.begin_read(reader).unwrap();
   let table = engine.group_table(group, "people", false).unwrap();

   seed_people(&engine, session, &["bob"]);
   assert_eq!(engine.table_size(table).unwrap(), 1);
   assert!(engine.has_changed(reader).unwrap());
   assert!(!engine.has_changed(session).unwrap());
}

#[test]
fn test_rollback_discards_changes() {
   let engine = TableEngine::new();
   let session = mem_session(&engine, "rollback");
   seed_people(&engine, session, &["alice"]);

   let group = engine.begin_write(session).unwrap();
   let table = engine.group_table(group, "people", true).unwrap();
   engine.table_clear(table).unwrap();
   engine.rollback(group).unwrap();

   assert_eq!(engine.table_size(table).unwrap_err().code, ERR_DETACHED);

   let group = engine.begin_read(session).unwrap();
   let table = engine.group_table(group, "people", false).unwrap();
   assert_eq!(engine.table_size(table).unwrap(), 1);
}

#[test]
fn test_single_write_group_per_storage() {
   let engine = TableEngine::new();
   let first = mem_session(&engine, "writers");
   let second = mem_session(&engine, "writers");

   let group = engine.begin_write(first).unwrap();
   assert_eq!(engine.begin_write(second).unwrap_err().code, ERR_BUSY);

   // Destroying an open write group frees the slot
   engine.destroy(group).unwrap();
   assert!(engine.begin_write(second).is_ok());
}

#[test]
fn test_read_group_rejects_mutation() {
   let engine = TableEngine::new();
   let session = mem_session(&engine, "readonly");
   seed_people(&engine, session, &["alice"]);

   let group = engine.begin_read(session).unwrap();
   assert_eq!(
      engine.group_table(group, "missing", true).unwrap_err().code,
      ERR_READ_ONLY
   );
   let table = engine.group_table(group, "people", false).unwrap();
   assert_eq!(
      engine.table_add_empty_row(table).unwrap_err().code,
      ERR_READ_ONLY
   );
   assert_eq!(engine.commit(group).unwrap_err().code, ERR_READ_ONLY);
}

// ============================================================================
// Fault injection
// ============================================================================

#[test]
fn test_injected_commit_failure_keeps_group_open() {
   init_tracing();
   let engine = TableEngine::new();
   let session = mem_session(&engine, "faulty");

   let group = engine.begin_write(session).unwrap();
   engine.group_table(group, "people", true).unwrap();

   engine.inject_fault(FaultPoint::Commit, 1);
   assert_eq!(engine.commit(group).unwrap_err().code, ERR_INJECTED);

   // Still holds the write slot until rolled back
   let other = mem_session(&engine, "faulty");
   assert_eq!(engine.begin_write(other).unwrap_err().code, ERR_BUSY);
   engine.rollback(group).unwrap();
   assert!(engine.begin_write(other).is_ok());
}

#[test]
fn test_injected_destroy_failure_keeps_handle() {
   let engine = TableEngine::new();
   let group = engine.open_group().unwrap();

   engine.inject_fault(FaultPoint::Destroy, 1);
   assert_eq!(engine.destroy(group).unwrap_err().code, ERR_INJECTED);
   assert_eq!(engine.live_handles(), 1);

   engine.destroy(group).unwrap();
   assert_eq!(engine.live_handles(), 0);
}

// ============================================================================
// Handles
// ============================================================================

#[test]
fn test_double_destroy_is_reported() {
   let engine = TableEngine::new();
   let group = engine.open_group().unwrap();

   engine.destroy(group).unwrap();
   assert_eq!(engine.destroy(group).unwrap_err().code, ERR_INVALID_HANDLE);
}

#[test]
fn test_wrong_kind_is_reported() {
   let engine = TableEngine::new();
   let session = mem_session(&engine, "kinds");
   let group = engine.open_group().unwrap();

   assert_eq!(engine.table_size(group).unwrap_err().code, ERR_WRONG_KIND);
   assert_eq!(engine.begin_read(group).unwrap_err().code, ERR_WRONG_KIND);
   assert_eq!(engine.commit(group).unwrap_err().code, ERR_WRONG_KIND);
   assert_eq!(engine.rollback(session).unwrap_err().code, ERR_WRONG_KIND);
}

#[test]
fn test_views_and_specs() {
   let engine = TableEngine::new();
   let group = engine.open_group().unwrap();
   let table = engine.group_table(group, "scores", true).unwrap();
   let score = engine
      .table_add_column(table, "score", ColumnType::Int)
      .unwrap();
   for value in [10, 20, 10] {
      let row = engine.table_add_empty_row(table).unwrap();
      engine
         .table_set(table, row, score, Value::from(value))
         .unwrap();
   }

   let view = engine
      .table_find_all(table, score, &Value::from(10))
      .unwrap();
   assert_eq!(engine.view_size(view).unwrap(), 2);
   assert_eq!(engine.view_source_index(view, 1).unwrap(), 2);
   engine.view_set(view, 1, score, Value::from(11)).unwrap();
   assert_eq!(engine.table_get(table, 2, score).unwrap(), Value::Int(11));

   let spec = engine.table_spec(table).unwrap();
   assert_eq!(engine.spec_column_count(spec).unwrap(), 1);
   assert_eq!(
      engine.spec_column(spec, 0).unwrap().column_type,
      ColumnType::Int
   );

   assert_eq!(engine.live_handles_of(ResourceKind::View), 1);
   for handle in [spec, view, table, group] {
      engine.destroy(handle).unwrap();
   }
   assert_eq!(engine.live_handles(), 0);
}

#[test]
fn test_missing_table_in_read_group() {
   let engine = TableEngine::new();
   let session = mem_session(&engine, "empty");
   let group = engine.begin_read(session).unwrap();
   assert_eq!(
      engine.group_table(group, "people", false).unwrap_err().code,
      ERR_NOT_FOUND
   );
}

// ============================================================================
// Durability
// ============================================================================

#[test]
fn test_durable_storage_survives_engine_instances() {
   init_tracing();
   let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
   let path = dir.path().join("people.tdb");

   {
      let engine = TableEngine::new();
      let session = engine
         .open_session(&path, Durability::Full, false)
         .unwrap();
      seed_people(&engine, session, &["alice", "bob"]);
   }

   let engine = TableEngine::new();
   let session = engine.open_session(&path, Durability::Full, true).unwrap();
   let group = engine.begin_read(session).unwrap();
   let table = engine.group_table(group, "people", false).unwrap();
   assert_eq!(engine.table_size(table).unwrap(), 2);
   assert_eq!(
      engine.table_get(table, 1, 0).unwrap(),
      Value::String("bob".into())
   );
}

#[test]
fn test_reopen_with_other_durability_is_rejected() {
   let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
   let path = dir.path().join("people.tdb");
   let engine = TableEngine::new();

   let first = engine
      .open_session(&path, Durability::MemOnly, false)
      .unwrap();
   let err = engine
      .open_session(&path, Durability::Full, false)
      .unwrap_err();
   assert_eq!(err.code, ERR_DURABILITY_MISMATCH);
   assert!(!path.exists());

   // Matching durability still shares the storage
   let second = engine
      .open_session(&path, Durability::MemOnly, false)
      .unwrap();
   assert_eq!(engine.live_handles(), 2);
   engine.destroy(second).unwrap();
   engine.destroy(first).unwrap();
}
