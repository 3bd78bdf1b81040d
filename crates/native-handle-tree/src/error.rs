//! Error types for native-handle-tree

use thiserror::Error;

use crate::handle::NativeHandle;

/// Failure reported by a native engine entry point through its return code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("engine call failed with code {code}: {message}")]
pub struct EngineError {
   /// Engine return code. Negative values are failures.
   pub code: i32,
   /// Human readable description supplied by the engine.
   pub message: String,
}

impl EngineError {
   pub fn new(code: i32, message: impl Into<String>) -> Self {
      Self {
         code,
         message: message.into(),
      }
   }
}

/// Errors that may occur when working with handle nodes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
   /// The node is already bound to a native resource. Attaching twice is a
   /// programming error and is never retried.
   #[error("{label} handle is already attached to native resource {existing}")]
   AlreadyAttached {
      label: &'static str,
      existing: NativeHandle,
   },

   /// The engine handed back the "unattached" sentinel instead of a resource.
   #[error("cannot attach the invalid sentinel to {label} handle")]
   InvalidHandle { label: &'static str },

   /// The node has been released and cannot be used
   #[error("{label} handle has been released")]
   Released { label: &'static str },

   /// The node was never attached to a native resource
   #[error("{label} handle is not attached to a native resource")]
   Unattached { label: &'static str },

   /// The root that owns this node has shut down
   #[error("{label} handle belongs to a root that has shut down")]
   RootShutdown { label: &'static str },

   /// A cursor's captured structural version no longer matches its source
   #[error("stale reference: captured structural version {seen}, current is {current}")]
   Stale { seen: u64, current: u64 },

   /// The scope an accessor was acquired in has ended
   #[error("{label} scope has ended")]
   ScopeEnded { label: &'static str },

   /// Error code returned by the native engine
   #[error(transparent)]
   Engine(#[from] EngineError),
}

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
