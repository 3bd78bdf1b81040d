//! # native-table-engine
//!
//! A small table engine exposed the way an unmanaged library would expose
//! itself: every object is an opaque [`NativeHandle`], every call reports
//! failure through an integer return code, and every handle has to be freed
//! explicitly with [`TableEngine::destroy`].
//!
//! Three call classes:
//!
//! - **Create**: `open_session`, `open_group`, `begin_read`, `begin_write`,
//!   `group_table`, `table_find_all`, `table_spec`
//! - **Operate**: `commit`, `rollback`, `has_changed`, and the `group_*`,
//!   `table_*`, `view_*`, `spec_*` calls
//! - **Destroy**: `destroy`
//!
//! Sessions opened on the same path share committed state. Read groups see the
//! snapshot that was current when they began; write groups work on a private
//! copy that `commit` publishes. Only one write group per storage may be open.
//!
//! Failures can be injected at the transaction and destroy entry points with
//! [`TableEngine::inject_fault`], and [`TableEngine::live_handles`] reports
//! how many handles are still outstanding.
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use native_table_engine::{ColumnType, Durability, TableEngine, Value};
//!
//! let engine = TableEngine::new();
//! let session = engine.open_session(Path::new("people"), Durability::MemOnly, false).unwrap();
//!
//! let group = engine.begin_write(session).unwrap();
//! let table = engine.group_table(group, "people", true).unwrap();
//! let name = engine.table_add_column(table, "name", ColumnType::String).unwrap();
//! let row = engine.table_add_empty_row(table).unwrap();
//! engine.table_set(table, row, name, Value::from("alice")).unwrap();
//! engine.commit(group).unwrap();
//!
//! for handle in [table, group, session] {
//!    engine.destroy(handle).unwrap();
//! }
//! assert_eq!(engine.live_handles(), 0);
//! ```

mod engine;
mod error;
mod fault;
mod schema;
mod storage;
mod value;

pub use engine::{ResourceKind, TableEngine};
pub use error::{
   ERR_BUSY, ERR_DETACHED, ERR_DUPLICATE, ERR_DURABILITY_MISMATCH, ERR_INJECTED, ERR_INVALID_HANDLE,
   ERR_IO, ERR_NOT_FOUND, ERR_OUT_OF_RANGE, ERR_READ_ONLY, ERR_TYPE_MISMATCH, ERR_WRONG_KIND,
   EngineResult, code_name,
};
pub use fault::FaultPoint;
pub use native_handle_tree::{EngineError, NativeHandle, StructuralVersion};
pub use schema::ColumnSpec;
pub use storage::Durability;
pub use value::{ColumnType, Value};
