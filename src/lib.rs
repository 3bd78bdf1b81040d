//! # tabular-binding
//!
//! Typed objects over a [`TableEngine`], whose resources are reached only
//! through opaque native handles that must each be destroyed exactly once.
//!
//! ## Core Types
//!
//! - **[`SharedGroup`]**: Session on a storage location. Starts at most one
//!   [`Transaction`] at a time.
//! - **[`Group`]**: Standalone, writable set of tables with no storage behind it
//! - **[`Table`]** / **[`TableView`]** / **[`Spec`]**: Objects acquired from a
//!   group or transaction, each owning one native handle
//! - **[`Row`]**: Cursor over one row; fails with [`Error::StaleReference`]
//!   after the table changes shape
//!
//! ## Teardown
//!
//! Sessions and standalone groups are roots of a handle tree; everything
//! acquired from them is a child. Objects may be released explicitly or simply
//! dropped on any thread. A dropped child is queued on its root and destroyed
//! by the next acquisition on that root (or [`SharedGroup::flush_pending`]);
//! once the root is closed, child releases run immediately. A destroy failure
//! is logged and never surfaces to the caller.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tabular_binding::{ColumnType, SessionConfig, SharedGroup, TableEngine, Value};
//!
//! let engine = Arc::new(TableEngine::new());
//! let session = SharedGroup::open(&engine, "people", SessionConfig::mem_only()).unwrap();
//!
//! session
//!    .execute_in_write(|tx| {
//!       let people = tx.table("people")?;
//!       people.add_column("name", ColumnType::String)?;
//!       people.add_row(["alice"])?;
//!       Ok(())
//!    })
//!    .unwrap();
//!
//! let tx = session.begin_read().unwrap();
//! let people = tx.table("people").unwrap();
//! assert_eq!(people.get(0, 0).unwrap(), Value::from("alice"));
//! ```

mod accessor;
mod config;
mod error;
mod group;
mod session;
mod spec;
mod table;
mod transactions;
mod view;

pub use config::SessionConfig;
pub use error::{Error, ErrorKind, Result};
pub use group::Group;
pub use session::{SharedGroup, TransactionKind, TransactionState};
pub use spec::Spec;
pub use table::{Row, Table};
pub use transactions::Transaction;
pub use view::TableView;

// Re-export engine and handle-tree types used in this crate's API
pub use native_handle_tree::{
   CountingSink, DiagnosticSink, DiagnosticsSnapshot, HandleTreeConfig, NoopSink,
};
pub use native_table_engine::{
   ColumnSpec, ColumnType, Durability, EngineError, FaultPoint, TableEngine, Value,
};
