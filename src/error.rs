use native_handle_tree::EngineError;
use native_table_engine::code_name;

use crate::session::TransactionKind;

/// Result type alias for binding operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
   /// Misuse of the API: double attach, use after release, begin while a
   /// transaction is active, commit with none active
   Programming,
   /// A cursor outlived a structural change to its source
   StaleReference,
   /// The engine reported a failure
   Engine,
   /// The session was poisoned by a failed commit or rollback
   SessionInvalidated,
}

/// Error types for binding operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Misuse of a handle: released, never attached, or owned by a root that
   /// has shut down.
   #[error(transparent)]
   Handle(native_handle_tree::Error),

   /// Failure code returned by the engine.
   #[error(transparent)]
   Engine(#[from] EngineError),

   /// A transaction is already active on this session.
   #[error("a {0} transaction is already active on this session")]
   AlreadyInTransaction(TransactionKind),

   /// Commit requested with no active transaction.
   #[error("no active transaction")]
   NoActiveTransaction,

   /// Commit requested on a read transaction.
   #[error("cannot commit a read transaction")]
   ReadOnlyTransaction,

   /// Transaction has already been committed or rolled back.
   #[error("transaction has already been finalized (committed or rolled back)")]
   TransactionAlreadyFinalized,

   /// The object was acquired inside a transaction that has since ended.
   #[error("the transaction this object belongs to has ended")]
   TransactionEnded,

   /// A previous commit or rollback failed; the session accepts no further work.
   #[error("session is invalid after a failed commit or rollback")]
   SessionInvalidated,

   /// A cursor's source changed shape after the cursor was created.
   #[error("stale reference: cursor saw structural version {seen}, source is at {current}")]
   StaleReference { seen: u64, current: u64 },

   /// Transaction failed and rollback also failed.
   #[error("transaction failed: {transaction_error}; rollback also failed: {rollback_error}")]
   TransactionRollbackFailed {
      transaction_error: String,
      rollback_error: String,
   },

   /// Row index past the end of a table or view.
   #[error("row {index} out of range (size {size})")]
   RowOutOfRange { index: usize, size: usize },

   /// Generic error for operations that don't fit other categories.
   #[error("{0}")]
   Other(String),
}

impl From<native_handle_tree::Error> for Error {
   fn from(err: native_handle_tree::Error) -> Self {
      match err {
         native_handle_tree::Error::Stale { seen, current } => Error::StaleReference { seen, current },
         native_handle_tree::Error::ScopeEnded { .. } => Error::TransactionEnded,
         native_handle_tree::Error::Engine(e) => Error::Engine(e),
         other => Error::Handle(other),
      }
   }
}

impl Error {
   /// Extract a structured error code from the error type.
   ///
   /// This provides machine-readable error codes for error handling.
   pub fn error_code(&self) -> String {
      match self {
         Error::Handle(e) => match e {
            native_handle_tree::Error::AlreadyAttached { .. } => "ALREADY_ATTACHED".to_string(),
            native_handle_tree::Error::Released { .. } => "HANDLE_RELEASED".to_string(),
            native_handle_tree::Error::RootShutdown { .. } => "ROOT_SHUT_DOWN".to_string(),
            _ => "HANDLE_ERROR".to_string(),
         },
         Error::Engine(e) => match code_name(e.code) {
            Some(name) => format!("ENGINE_{name}"),
            None => "ENGINE_ERROR".to_string(),
         },
         Error::AlreadyInTransaction(_) => "ALREADY_IN_TRANSACTION".to_string(),
         Error::NoActiveTransaction => "NO_ACTIVE_TRANSACTION".to_string(),
         Error::ReadOnlyTransaction => "READ_ONLY_TRANSACTION".to_string(),
         Error::TransactionAlreadyFinalized => "TRANSACTION_ALREADY_FINALIZED".to_string(),
         Error::TransactionEnded => "TRANSACTION_ENDED".to_string(),
         Error::SessionInvalidated => "SESSION_INVALIDATED".to_string(),
         Error::StaleReference { .. } => "STALE_REFERENCE".to_string(),
         Error::TransactionRollbackFailed { .. } => "TRANSACTION_ROLLBACK_FAILED".to_string(),
         Error::RowOutOfRange { .. } => "ROW_OUT_OF_RANGE".to_string(),
         Error::Other(_) => "ERROR".to_string(),
      }
   }

   pub fn kind(&self) -> ErrorKind {
      match self {
         Error::Engine(_) | Error::TransactionRollbackFailed { .. } => ErrorKind::Engine,
         Error::StaleReference { .. } => ErrorKind::StaleReference,
         Error::SessionInvalidated => ErrorKind::SessionInvalidated,
         Error::Handle(_)
         | Error::AlreadyInTransaction(_)
         | Error::NoActiveTransaction
         | Error::ReadOnlyTransaction
         | Error::TransactionAlreadyFinalized
         | Error::TransactionEnded
         | Error::RowOutOfRange { .. }
         | Error::Other(_) => ErrorKind::Programming,
      }
   }

   /// Engine return code, if the engine reported this error.
   pub fn engine_code(&self) -> Option<i32> {
      match self {
         Error::Engine(e) => Some(e.code),
         _ => None,
      }
   }
}
