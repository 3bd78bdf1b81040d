//! # native-handle-tree
//!
//! Lifetime governance for handles to unmanaged (native) resources that are
//! shared by many short-lived wrapper objects.
//!
//! ## Core Types
//!
//! - **[`HandleNode`]**: One wrapper-to-native binding. Either a root or a child.
//! - **[`Root`]**: Shared reference to a root node's release queue and shutdown flag
//! - **[`PendingReleaseQueue`]**: FIFO of child releases deferred until a safe point
//! - **[`DiagnosticSink`]**: Optional observer of attach/enqueue/release events
//! - **[`StructuralVersion`]** / **[`VersionStamp`]**: Staleness detection for derived cursors
//! - **[`Liveness`]**: Scope flag for accessors that must not outlive their owner
//!
//! ## Release Model
//!
//! - **Roots** own a pending queue. Releasing a root marks it shut down, drains
//!   the queue in enqueue order, then destroys the root's own native resource.
//! - **Children** never destroy themselves directly. A release request is handed
//!   to the root, which destroys the child immediately once the root is shutting
//!   down and otherwise queues it.
//! - **Draining** happens on user threads: every child acquisition through
//!   [`Root::acquire_child`] first drains the queue, and [`Root::flush_pending`]
//!   drains it on demand.
//! - **Teardown failures** (an error code or a panic from the destroy entry point)
//!   are logged and reported to the sink, never propagated. The node is invalid
//!   afterwards either way.
//!
//! Dropping a [`HandleNode`] is a release request, so teardown driven by
//! whichever thread drops the last owner follows exactly the same path as an
//! explicit [`HandleNode::request_release`].

mod config;
mod diagnostics;
mod error;
mod handle;
mod node;
mod queue;
mod validity;

// Re-export public types
pub use config::HandleTreeConfig;
pub use diagnostics::{CountingSink, DiagnosticSink, DiagnosticsSnapshot, NoopSink};
pub use error::{EngineError, Error, Result};
pub use handle::{Destructor, NativeHandle};
pub use node::{HandleNode, Root};
pub use queue::PendingReleaseQueue;
pub use validity::{Liveness, StructuralVersion, VersionStamp};
