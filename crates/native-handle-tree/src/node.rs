//! Handle nodes and the root/child release protocol

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::HandleTreeConfig;
use crate::diagnostics::{DiagnosticSink, NoopSink};
use crate::error::{EngineError, Error, Result};
use crate::handle::{Destructor, NativeHandle};
use crate::queue::PendingReleaseQueue;

/// The binding between one node and its native resource.
///
/// Shared between the owning [`HandleNode`] and, once a release has been
/// requested, the root's pending queue.
struct NodeCore {
   label: &'static str,
   native: AtomicUsize,
   valid: AtomicBool,
   destructor: Arc<dyn Destructor>,
}

impl NodeCore {
   fn new(label: &'static str, destructor: Arc<dyn Destructor>) -> Self {
      Self {
         label,
         native: AtomicUsize::new(NativeHandle::INVALID.as_raw()),
         valid: AtomicBool::new(false),
         destructor,
      }
   }

   fn native(&self) -> NativeHandle {
      NativeHandle::from_raw(self.native.load(Ordering::Acquire))
   }

   fn attach(&self, native: NativeHandle) -> Result<()> {
      if native.is_invalid() {
         return Err(Error::InvalidHandle { label: self.label });
      }

      self
         .native
         .compare_exchange(
            NativeHandle::INVALID.as_raw(),
            native.as_raw(),
            Ordering::AcqRel,
            Ordering::Acquire,
         )
         .map_err(|existing| Error::AlreadyAttached {
            label: self.label,
            existing: NativeHandle::from_raw(existing),
         })?;

      self.valid.store(true, Ordering::Release);
      Ok(())
   }

   /// Destroys the native resource if this core still owns one.
   ///
   /// Returns false when there was nothing to do. Destroy failures and panics
   /// are contained here: the core is invalid afterwards regardless.
   fn release(&self, sink: &dyn DiagnosticSink) -> bool {
      if !self.valid.swap(false, Ordering::AcqRel) {
         return false;
      }

      let handle = self.native();
      let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.destructor.destroy(handle)));

      match outcome {
         Ok(Ok(())) => {
            trace!(label = self.label, %handle, "Released native resource");
            sink.on_released(self.label);
         }
         Ok(Err(e)) => {
            warn!(label = self.label, %handle, error = %e, "Destroying native resource failed");
            sink.on_release_failed(self.label, &e.to_string());
         }
         Err(payload) => {
            let reason = panic_message(payload.as_ref());
            warn!(label = self.label, %handle, reason = %reason, "Destroying native resource panicked");
            sink.on_release_failed(self.label, &reason);
         }
      }

      true
   }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
   if let Some(message) = payload.downcast_ref::<&str>() {
      (*message).to_string()
   } else if let Some(message) = payload.downcast_ref::<String>() {
      message.clone()
   } else {
      "destroy panicked".to_string()
   }
}

struct RootState {
   pending: PendingReleaseQueue<Arc<NodeCore>>,
   shutdown: bool,
   over_threshold: bool,
}

struct RootShared {
   core: Arc<NodeCore>,
   state: Mutex<RootState>,
   /// Mirror of `RootState::shutdown` for lock-free validation
   shut_down: AtomicBool,
   config: HandleTreeConfig,
   sink: Arc<dyn DiagnosticSink>,
}

/// Shared reference to a root node's release machinery.
///
/// Every child holds one, fixed at construction. Cloning is cheap.
#[derive(Clone)]
pub struct Root {
   shared: Arc<RootShared>,
}

impl Root {
   /// Creates an empty child fixed to this root.
   ///
   /// The child must be attached before use. Prefer [`Root::acquire_child`],
   /// which also drains the pending queue.
   pub fn new_child(&self, label: &'static str, destructor: Arc<dyn Destructor>) -> HandleNode {
      HandleNode {
         core: Arc::new(NodeCore::new(label, destructor)),
         role: Role::Child(self.clone()),
         disposed: AtomicBool::new(false),
      }
   }

   /// Acquires a new child resource.
   ///
   /// Drains pending releases on the calling thread (unless disabled in the
   /// config), allocates the empty child, then calls `create` and attaches
   /// its result. Nothing fallible runs between the engine handing back the
   /// resource and the attach.
   pub fn acquire_child<F>(
      &self,
      label: &'static str,
      destructor: Arc<dyn Destructor>,
      create: F,
   ) -> Result<HandleNode>
   where
      F: FnOnce() -> std::result::Result<NativeHandle, EngineError>,
   {
      if self.is_shut_down() {
         return Err(Error::RootShutdown { label });
      }

      if self.shared.config.drain_on_acquire {
         self.flush_pending();
      }

      let child = self.new_child(label, destructor);
      let native = create()?;
      child.attach(native)?;
      Ok(child)
   }

   /// Releases every queued child on the calling thread and returns how many
   /// were drained.
   pub fn flush_pending(&self) -> usize {
      let mut state = self.shared.state.lock();
      self.drain_locked(&mut state)
   }

   /// Runs `f` under this root's lock, so no release for the same root
   /// reaches the engine while it runs.
   ///
   /// `f` must not release or drop a node of this root.
   pub fn serialize<R>(&self, f: impl FnOnce() -> R) -> R {
      let _state = self.shared.state.lock();
      f()
   }

   pub fn pending_len(&self) -> usize {
      self.shared.state.lock().pending.len()
   }

   pub fn is_shut_down(&self) -> bool {
      self.shared.shut_down.load(Ordering::Acquire)
   }

   /// The root's own native resource.
   pub fn native(&self) -> NativeHandle {
      self.shared.core.native()
   }

   pub fn config(&self) -> &HandleTreeConfig {
      &self.shared.config
   }

   pub fn sink(&self) -> &Arc<dyn DiagnosticSink> {
      &self.shared.sink
   }

   /// Whether `node` is this root or one of its children.
   pub fn owns(&self, node: &HandleNode) -> bool {
      Arc::ptr_eq(&self.shared, &node.root_ref().shared)
   }

   /// Child teardown entry point. Runs the release inline if the root is
   /// shutting down, otherwise queues it for the next drain.
   fn request_release(&self, core: Arc<NodeCore>) {
      let mut state = self.shared.state.lock();

      if state.shutdown {
         core.release(self.shared.sink.as_ref());
         return;
      }

      // Never attached or already dead; nothing for a drain to do
      if !core.valid.load(Ordering::Acquire) {
         return;
      }

      let label = core.label;
      let depth = state.pending.push(core);
      trace!(label, depth, "Queued release request");
      self.shared.sink.on_enqueued(label, depth);

      let threshold = self.shared.config.pending_warn_threshold;
      if depth >= threshold && !state.over_threshold {
         state.over_threshold = true;
         warn!(
            root = %self.native(),
            depth,
            threshold,
            "Pending release queue is growing; no child acquisitions are draining it"
         );
      }
   }

   /// Root teardown: shut down, drain, then destroy the root's own resource.
   fn shutdown(&self) {
      let mut state = self.shared.state.lock();

      state.shutdown = true;
      self.shared.shut_down.store(true, Ordering::Release);

      let drained = self.drain_locked(&mut state);
      debug!(
         label = self.shared.core.label,
         root = %self.native(),
         drained,
         "Root shutting down"
      );

      self.shared.core.release(self.shared.sink.as_ref());
   }

   fn drain_locked(&self, state: &mut RootState) -> usize {
      if state.pending.is_empty() {
         return 0;
      }

      let items = state.pending.drain_all();
      let count = items.len();
      for core in items {
         core.release(self.shared.sink.as_ref());
      }
      state.over_threshold = false;

      trace!(root = %self.native(), count, "Drained pending releases");
      self.shared.sink.on_drained(count);
      count
   }
}

impl fmt::Debug for Root {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Root")
         .field("label", &self.shared.core.label)
         .field("native", &self.native())
         .field("shut_down", &self.is_shut_down())
         .finish()
   }
}

enum Role {
   Root(Root),
   Child(Root),
}

/// One wrapper object's binding to a native resource.
///
/// A node is created empty, attached exactly once, and torn down exactly
/// once, either by [`HandleNode::request_release`] or by `Drop`. After
/// teardown every [`HandleNode::validate`] fails without touching the engine.
pub struct HandleNode {
   core: Arc<NodeCore>,
   role: Role,
   disposed: AtomicBool,
}

impl HandleNode {
   /// Creates an empty root node.
   pub fn new_root(
      label: &'static str,
      destructor: Arc<dyn Destructor>,
      config: HandleTreeConfig,
      sink: Arc<dyn DiagnosticSink>,
   ) -> Self {
      let core = Arc::new(NodeCore::new(label, destructor));
      let shared = Arc::new(RootShared {
         core: Arc::clone(&core),
         state: Mutex::new(RootState {
            pending: PendingReleaseQueue::new(),
            shutdown: false,
            over_threshold: false,
         }),
         shut_down: AtomicBool::new(false),
         config,
         sink,
      });

      Self {
         core,
         role: Role::Root(Root { shared }),
         disposed: AtomicBool::new(false),
      }
   }

   /// Creates an empty root with the default config and no diagnostics.
   pub fn new_default_root(label: &'static str, destructor: Arc<dyn Destructor>) -> Self {
      Self::new_root(
         label,
         destructor,
         HandleTreeConfig::default(),
         Arc::new(NoopSink),
      )
   }

   /// Binds the native resource. A second attach is a programming error.
   pub fn attach(&self, native: NativeHandle) -> Result<()> {
      if self.disposed.load(Ordering::Acquire) {
         return Err(Error::Released {
            label: self.core.label,
         });
      }

      self.core.attach(native)?;
      trace!(label = self.core.label, %native, "Attached native resource");
      self.root_ref().shared.sink.on_attached(self.core.label, native);
      Ok(())
   }

   /// Returns the native handle if the node may be passed to the engine.
   pub fn validate(&self) -> Result<NativeHandle> {
      let label = self.core.label;

      if self.disposed.load(Ordering::Acquire) {
         return Err(Error::Released { label });
      }

      if let Role::Child(root) = &self.role
         && root.is_shut_down()
      {
         return Err(Error::RootShutdown { label });
      }

      let native = self.core.native();
      if native.is_invalid() {
         return Err(Error::Unattached { label });
      }
      if !self.core.valid.load(Ordering::Acquire) {
         return Err(Error::Released { label });
      }

      Ok(native)
   }

   pub fn is_valid(&self) -> bool {
      self.validate().is_ok()
   }

   /// Sole teardown entry point; `Drop` calls it too. Idempotent.
   pub fn request_release(&self) {
      if self.disposed.swap(true, Ordering::AcqRel) {
         return;
      }

      match &self.role {
         Role::Root(root) => root.shutdown(),
         Role::Child(root) => root.request_release(Arc::clone(&self.core)),
      }
   }

   pub fn is_disposed(&self) -> bool {
      self.disposed.load(Ordering::Acquire)
   }

   pub fn is_root(&self) -> bool {
      matches!(self.role, Role::Root(_))
   }

   /// The root this node releases through. A root returns itself.
   pub fn root(&self) -> Root {
      self.root_ref().clone()
   }

   pub fn native(&self) -> NativeHandle {
      self.core.native()
   }

   /// Validates the node and runs `f` with its native handle under the
   /// root's lock. See [`Root::serialize`].
   pub fn with_native<R>(&self, f: impl FnOnce(NativeHandle) -> R) -> Result<R> {
      self.root_ref().serialize(|| self.validate().map(f))
   }

   pub fn label(&self) -> &'static str {
      self.core.label
   }

   fn root_ref(&self) -> &Root {
      match &self.role {
         Role::Root(root) | Role::Child(root) => root,
      }
   }
}

impl Drop for HandleNode {
   fn drop(&mut self) {
      self.request_release();
   }
}

impl fmt::Debug for HandleNode {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("HandleNode")
         .field("label", &self.core.label)
         .field("native", &self.native())
         .field("root", &self.is_root())
         .field("disposed", &self.is_disposed())
         .finish()
   }
}
