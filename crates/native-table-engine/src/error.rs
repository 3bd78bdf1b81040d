//! Return codes and error constructors for the table engine.
//!
//! Every entry point reports failure as an [`EngineError`] carrying one of the
//! `ERR_*` codes below. The codes are stable and negative.

use std::path::Path;

use native_handle_tree::{EngineError, NativeHandle};

use crate::ResourceKind;
use crate::fault::FaultPoint;

/// Handle is unknown to the engine (never created or already destroyed)
pub const ERR_INVALID_HANDLE: i32 = -1;
/// Handle refers to a different kind of resource than the call expects
pub const ERR_WRONG_KIND: i32 = -2;
/// Mutation attempted through a read-only group
pub const ERR_READ_ONLY: i32 = -3;
/// Another write transaction is active on the same storage
pub const ERR_BUSY: i32 = -4;
/// The group the handle belongs to has been committed or rolled back
pub const ERR_DETACHED: i32 = -5;
/// Named table, column, or storage does not exist
pub const ERR_NOT_FOUND: i32 = -6;
/// Row or column index outside the resource's bounds
pub const ERR_OUT_OF_RANGE: i32 = -7;
/// Value type does not match the column type
pub const ERR_TYPE_MISMATCH: i32 = -8;
/// Reading or writing the storage file failed
pub const ERR_IO: i32 = -9;
/// Failure injected through [`crate::TableEngine::inject_fault`]
pub const ERR_INJECTED: i32 = -10;
/// A column with the same name already exists
pub const ERR_DUPLICATE: i32 = -11;
/// Storage is already open with a different durability
pub const ERR_DURABILITY_MISMATCH: i32 = -12;

/// Symbolic name of an `ERR_*` return code, or `None` for unknown codes.
pub fn code_name(code: i32) -> Option<&'static str> {
   let name = match code {
      ERR_INVALID_HANDLE => "INVALID_HANDLE",
      ERR_WRONG_KIND => "WRONG_KIND",
      ERR_READ_ONLY => "READ_ONLY",
      ERR_BUSY => "BUSY",
      ERR_DETACHED => "DETACHED",
      ERR_NOT_FOUND => "NOT_FOUND",
      ERR_OUT_OF_RANGE => "OUT_OF_RANGE",
      ERR_TYPE_MISMATCH => "TYPE_MISMATCH",
      ERR_IO => "IO",
      ERR_INJECTED => "INJECTED",
      ERR_DUPLICATE => "DUPLICATE",
      ERR_DURABILITY_MISMATCH => "DURABILITY_MISMATCH",
      _ => return None,
   };
   Some(name)
}

/// Result type for engine entry points
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Failures while loading or persisting a storage file
#[derive(Debug, thiserror::Error)]
pub(crate) enum StorageError {
   #[error("io error: {0}")]
   Io(#[from] std::io::Error),

   #[error("corrupt storage file: {0}")]
   Json(#[from] serde_json::Error),
}

impl StorageError {
   pub(crate) fn into_engine(self, path: &Path) -> EngineError {
      EngineError::new(ERR_IO, format!("{}: {self}", path.display()))
   }
}

pub(crate) fn invalid_handle(handle: NativeHandle) -> EngineError {
   EngineError::new(ERR_INVALID_HANDLE, format!("unknown handle {handle}"))
}

pub(crate) fn wrong_kind(
   handle: NativeHandle,
   expected: ResourceKind,
   actual: ResourceKind,
) -> EngineError {
   EngineError::new(
      ERR_WRONG_KIND,
      format!("handle {handle} is a {actual}, expected a {expected}"),
   )
}

pub(crate) fn no_transaction(handle: NativeHandle) -> EngineError {
   EngineError::new(
      ERR_WRONG_KIND,
      format!("group {handle} is standalone and has no transaction"),
   )
}

pub(crate) fn read_only(what: &str) -> EngineError {
   EngineError::new(ERR_READ_ONLY, format!("cannot {what} in a read-only group"))
}

pub(crate) fn busy() -> EngineError {
   EngineError::new(ERR_BUSY, "another write transaction is active")
}

pub(crate) fn detached(handle: NativeHandle) -> EngineError {
   EngineError::new(
      ERR_DETACHED,
      format!("handle {handle} belongs to a group that has ended"),
   )
}

pub(crate) fn not_found(what: impl std::fmt::Display) -> EngineError {
   EngineError::new(ERR_NOT_FOUND, format!("{what} not found"))
}

pub(crate) fn out_of_range(what: &str, index: usize, len: usize) -> EngineError {
   EngineError::new(
      ERR_OUT_OF_RANGE,
      format!("{what} index {index} out of range (len {len})"),
   )
}

pub(crate) fn type_mismatch(column: &str, expected: impl std::fmt::Display) -> EngineError {
   EngineError::new(
      ERR_TYPE_MISMATCH,
      format!("column '{column}' holds {expected} values"),
   )
}

pub(crate) fn duplicate_column(name: &str) -> EngineError {
   EngineError::new(ERR_DUPLICATE, format!("column '{name}' already exists"))
}

pub(crate) fn durability_mismatch(
   path: &Path,
   open: impl std::fmt::Debug,
   requested: impl std::fmt::Debug,
) -> EngineError {
   EngineError::new(
      ERR_DURABILITY_MISMATCH,
      format!(
         "storage '{}' is open as {open:?}, cannot reopen as {requested:?}",
         path.display()
      ),
   )
}

pub(crate) fn injected(point: FaultPoint) -> EngineError {
   EngineError::new(ERR_INJECTED, format!("injected failure at {point:?}"))
}
