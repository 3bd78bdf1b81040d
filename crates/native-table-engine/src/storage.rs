//! Storage locations shared by every session opened on the same path.
//!
//! A storage keeps the latest committed snapshot and a commit counter. With
//! [`Durability::Full`] each commit is also written to the path so a later
//! engine instance can reopen it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineResult, StorageError, not_found};
use crate::schema::TableData;

/// Whether committed state outlives the engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
   /// Every commit is written to the storage path
   #[default]
   Full,
   /// Committed state lives only as long as the engine
   MemOnly,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Snapshot {
   pub(crate) tables: IndexMap<String, TableData>,
}

struct Committed {
   snapshot: Arc<Snapshot>,
   version: u64,
}

pub(crate) struct Storage {
   path: PathBuf,
   durability: Durability,
   committed: RwLock<Committed>,
   writer_active: AtomicBool,
}

impl Storage {
   pub(crate) fn open(path: &Path, durability: Durability, no_create: bool) -> EngineResult<Self> {
      let snapshot = match durability {
         Durability::Full if path.exists() => load(path).map_err(|e| e.into_engine(path))?,
         _ if no_create => {
            return Err(not_found(format!("storage '{}'", path.display())));
         }
         Durability::Full => {
            let snapshot = Snapshot::default();
            persist(path, &snapshot).map_err(|e| e.into_engine(path))?;
            snapshot
         }
         Durability::MemOnly => Snapshot::default(),
      };

      debug!(path = %path.display(), ?durability, tables = snapshot.tables.len(), "Opened storage");

      Ok(Self {
         path: path.to_path_buf(),
         durability,
         committed: RwLock::new(Committed {
            snapshot: Arc::new(snapshot),
            version: 0,
         }),
         writer_active: AtomicBool::new(false),
      })
   }

   pub(crate) fn durability(&self) -> Durability {
      self.durability
   }

   /// Latest committed snapshot together with its commit counter.
   pub(crate) fn snapshot(&self) -> (Arc<Snapshot>, u64) {
      let committed = self.committed.read();
      (Arc::clone(&committed.snapshot), committed.version)
   }

   pub(crate) fn version(&self) -> u64 {
      self.committed.read().version
   }

   pub(crate) fn try_begin_write(&self) -> bool {
      self
         .writer_active
         .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
         .is_ok()
   }

   pub(crate) fn end_write(&self) {
      self.writer_active.store(false, Ordering::Release);
   }

   /// Makes `snapshot` the committed state and returns the new commit counter.
   ///
   /// For durable storage the file is written first; if that fails nothing
   /// changes.
   pub(crate) fn publish(&self, snapshot: Snapshot) -> EngineResult<u64> {
      if self.durability == Durability::Full {
         persist(&self.path, &snapshot).map_err(|e| e.into_engine(&self.path))?;
      }

      let mut committed = self.committed.write();
      committed.snapshot = Arc::new(snapshot);
      committed.version += 1;
      Ok(committed.version)
   }
}

fn load(path: &Path) -> Result<Snapshot, StorageError> {
   let bytes = fs::read(path)?;
   Ok(serde_json::from_slice(&bytes)?)
}

fn persist(path: &Path, snapshot: &Snapshot) -> Result<(), StorageError> {
   let tmp = path.with_extension("tmp");
   fs::write(&tmp, serde_json::to_vec(snapshot)?)?;
   fs::rename(&tmp, path)?;
   Ok(())
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::error::{ERR_IO, ERR_NOT_FOUND};

   #[test]
   fn test_no_create_requires_existing_file() {
      let dir = tempfile::TempDir::new().unwrap();
      let path = dir.path().join("missing.tdb");

      let err = Storage::open(&path, Durability::Full, true).err().unwrap();
      assert_eq!(err.code, ERR_NOT_FOUND);

      let err = Storage::open(&path, Durability::MemOnly, true).err().unwrap();
      assert_eq!(err.code, ERR_NOT_FOUND);
   }

   #[test]
   fn test_full_durability_creates_file() {
      let dir = tempfile::TempDir::new().unwrap();
      let path = dir.path().join("fresh.tdb");

      Storage::open(&path, Durability::Full, false).unwrap();
      assert!(path.exists());
      assert!(Storage::open(&path, Durability::Full, true).is_ok());
   }

   #[test]
   fn test_publish_persists_and_bumps_version() {
      let dir = tempfile::TempDir::new().unwrap();
      let path = dir.path().join("commit.tdb");
      let storage = Storage::open(&path, Durability::Full, false).unwrap();

      let mut snapshot = Snapshot::default();
      snapshot
         .tables
         .insert("people".to_string(), TableData::default());
      assert_eq!(storage.publish(snapshot).unwrap(), 1);

      let reopened = Storage::open(&path, Durability::Full, true).unwrap();
      let (snapshot, _) = reopened.snapshot();
      assert!(snapshot.tables.contains_key("people"));
   }

   #[test]
   fn test_corrupt_file_is_io_error() {
      let dir = tempfile::TempDir::new().unwrap();
      let path = dir.path().join("corrupt.tdb");
      fs::write(&path, b"not json").unwrap();

      let err = Storage::open(&path, Durability::Full, false).err().unwrap();
      assert_eq!(err.code, ERR_IO);
   }

   #[test]
   fn test_single_writer() {
      let storage = Storage::open(Path::new("mem"), Durability::MemOnly, false).unwrap();
      assert!(storage.try_begin_write());
      assert!(!storage.try_begin_write());
      storage.end_write();
      assert!(storage.try_begin_write());
   }
}
