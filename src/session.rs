//! Shared sessions and their transaction state machine

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use native_handle_tree::{Destructor, DiagnosticSink, HandleNode, Liveness, NativeHandle, NoopSink};
use native_table_engine::{EngineError, TableEngine};
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::accessor::{Accessor, engine_destructor};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::transactions::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
   Read,
   Write,
}

impl fmt::Display for TransactionKind {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         TransactionKind::Read => f.write_str("read"),
         TransactionKind::Write => f.write_str("write"),
      }
   }
}

/// Where a session is in its transaction lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
   /// No transaction has been started yet
   Never,
   InTransaction,
   /// The last transaction was committed or rolled back
   Ready,
}

struct ActiveTransaction {
   id: Uuid,
   kind: TransactionKind,
   group: NativeHandle,
   scope: Liveness,
}

struct Controller {
   state: TransactionState,
   active: Option<ActiveTransaction>,
}

impl Controller {
   /// Ends the active transaction's scope and moves to `Ready`.
   fn finish(&mut self) -> Option<ActiveTransaction> {
      let active = self.active.take()?;
      active.scope.end();
      self.state = TransactionState::Ready;
      Some(active)
   }
}

/// State shared by a [`SharedGroup`] and the transactions it starts.
///
/// Lock order: `controller`, then the root's queue lock (taken inside
/// `acquire_child`). Nothing takes them the other way round.
pub(crate) struct SessionShared {
   engine: Arc<TableEngine>,
   destructor: Arc<dyn Destructor>,
   node: HandleNode,
   path: PathBuf,
   controller: Mutex<Controller>,
   poisoned: Arc<AtomicBool>,
}

impl SessionShared {
   fn is_poisoned(&self) -> bool {
      self.poisoned.load(Ordering::Acquire)
   }

   fn ensure_usable(&self) -> Result<NativeHandle> {
      if self.is_poisoned() {
         return Err(Error::SessionInvalidated);
      }
      Ok(self.node.validate()?)
   }

   /// Runs an engine call under the session root's lock.
   fn engine_call<R>(&self, f: impl FnOnce(&TableEngine) -> R) -> R {
      self.node.root().serialize(|| f(&self.engine))
   }

   fn poison(&self, controller: &mut Controller, operation: &str, error: &EngineError) {
      self.poisoned.store(true, Ordering::Release);
      controller.finish();
      warn!(
         path = %self.path.display(),
         operation,
         error = %error,
         "Session invalidated"
      );
   }

   fn begin(self: &Arc<Self>, kind: TransactionKind) -> Result<Transaction> {
      let session = self.ensure_usable()?;
      let mut controller = self.controller.lock();

      if let Some(active) = &controller.active {
         return Err(Error::AlreadyInTransaction(active.kind));
      }

      let node = self.node.root().acquire_child(
         "transaction",
         Arc::clone(&self.destructor),
         || {
            self.engine_call(|engine| match kind {
               TransactionKind::Read => engine.begin_read(session),
               TransactionKind::Write => engine.begin_write(session),
            })
         },
      )?;

      let id = Uuid::new_v4();
      let scope = Liveness::new("transaction");
      controller.active = Some(ActiveTransaction {
         id,
         kind,
         group: node.native(),
         scope: scope.clone(),
      });
      controller.state = TransactionState::InTransaction;
      debug!(path = %self.path.display(), %id, %kind, "Transaction began");

      let accessor = Accessor::new(
         Arc::clone(&self.engine),
         Arc::clone(&self.destructor),
         node,
         Some(scope),
         Some(Arc::clone(&self.poisoned)),
      );
      Ok(Transaction::new(Arc::clone(self), accessor, kind, id))
   }

   /// Commits the active transaction. With `expected`, only if it is still
   /// the active one.
   pub(crate) fn commit(&self, expected: Option<Uuid>) -> Result<()> {
      self.ensure_usable()?;
      let mut controller = self.controller.lock();

      let (id, kind, group) = match (&controller.active, expected) {
         (None, None) => return Err(Error::NoActiveTransaction),
         (None, Some(_)) => return Err(Error::TransactionAlreadyFinalized),
         (Some(active), Some(id)) if active.id != id => {
            return Err(Error::TransactionAlreadyFinalized);
         }
         (Some(active), _) => (active.id, active.kind, active.group),
      };

      if kind == TransactionKind::Read {
         return Err(Error::ReadOnlyTransaction);
      }

      if let Err(e) = self.engine_call(|engine| engine.commit(group)) {
         self.poison(&mut controller, "commit", &e);
         return Err(Error::Engine(e));
      }

      controller.finish();
      debug!(path = %self.path.display(), %id, "Transaction committed");
      Ok(())
   }

   /// Rolls back the active transaction. Without `expected` and with nothing
   /// active this is a no-op.
   pub(crate) fn rollback(&self, expected: Option<Uuid>) -> Result<()> {
      self.ensure_usable()?;
      let mut controller = self.controller.lock();

      let (id, group) = match (&controller.active, expected) {
         (None, None) => return Ok(()),
         (None, Some(_)) => return Err(Error::TransactionAlreadyFinalized),
         (Some(active), Some(id)) if active.id != id => {
            return Err(Error::TransactionAlreadyFinalized);
         }
         (Some(active), _) => (active.id, active.group),
      };

      if let Err(e) = self.engine_call(|engine| engine.rollback(group)) {
         self.poison(&mut controller, "rollback", &e);
         return Err(Error::Engine(e));
      }

      controller.finish();
      debug!(path = %self.path.display(), %id, "Transaction rolled back");
      Ok(())
   }

   /// Rollback run when a transaction is dropped while still active. Never
   /// fails; a failed rollback poisons the session.
   pub(crate) fn rollback_dropped(&self, id: Uuid) {
      if self.is_poisoned() {
         return;
      }

      let mut controller = self.controller.lock();
      let group = match &controller.active {
         Some(active) if active.id == id => active.group,
         _ => return,
      };

      match self.node.with_native(|_| self.engine.rollback(group)) {
         Ok(Ok(())) => {
            controller.finish();
            debug!(path = %self.path.display(), %id, "Dropped transaction rolled back");
         }
         Ok(Err(e)) => self.poison(&mut controller, "implicit rollback", &e),
         // Session already closed; the group is destroyed with its node
         Err(_) => {
            controller.finish();
         }
      }
   }

   pub(crate) fn is_active(&self, id: Uuid) -> bool {
      self
         .controller
         .lock()
         .active
         .as_ref()
         .is_some_and(|active| active.id == id)
   }
}

/// A session on a storage location shared with every other session opened
/// on the same path.
///
/// The session is the root of a handle tree. Every transaction it starts and
/// every table, view and spec acquired inside those transactions is a child
/// released through the session's queue. At most one transaction is active
/// at a time:
///
/// | state         | `begin_*`                | `commit`                 | `rollback` |
/// |---------------|--------------------------|--------------------------|------------|
/// | Never / Ready | starts a transaction     | [`Error::NoActiveTransaction`] | no-op |
/// | InTransaction | [`Error::AlreadyInTransaction`] | ends it (write only) | ends it |
///
/// A failed commit or rollback poisons the session: every later operation
/// fails with [`Error::SessionInvalidated`] without reaching the engine.
/// Native resources are still destroyed on teardown.
pub struct SharedGroup {
   shared: Arc<SessionShared>,
}

impl SharedGroup {
   pub fn open(
      engine: &Arc<TableEngine>,
      path: impl AsRef<Path>,
      config: SessionConfig,
   ) -> Result<Self> {
      Self::open_with_sink(engine, path, config, Arc::new(NoopSink))
   }

   /// Like [`SharedGroup::open`], reporting handle lifecycle events to `sink`.
   pub fn open_with_sink(
      engine: &Arc<TableEngine>,
      path: impl AsRef<Path>,
      config: SessionConfig,
      sink: Arc<dyn DiagnosticSink>,
   ) -> Result<Self> {
      let path = path.as_ref();
      let destructor = engine_destructor(engine);
      let node = HandleNode::new_root(
         "session",
         Arc::clone(&destructor),
         config.handle_tree.clone(),
         sink,
      );
      node.attach(engine.open_session(path, config.durability, config.no_create)?)?;
      debug!(path = %path.display(), native = %node.native(), "Opened session");

      Ok(Self {
         shared: Arc::new(SessionShared {
            engine: Arc::clone(engine),
            destructor,
            node,
            path: path.to_path_buf(),
            controller: Mutex::new(Controller {
               state: TransactionState::Never,
               active: None,
            }),
            poisoned: Arc::new(AtomicBool::new(false)),
         }),
      })
   }

   pub fn begin_read(&self) -> Result<Transaction> {
      self.shared.begin(TransactionKind::Read)
   }

   pub fn begin_write(&self) -> Result<Transaction> {
      self.shared.begin(TransactionKind::Write)
   }

   /// Commits the active write transaction.
   pub fn commit(&self) -> Result<()> {
      self.shared.commit(None)
   }

   /// Rolls back the active transaction, if any.
   pub fn rollback(&self) -> Result<()> {
      self.shared.rollback(None)
   }

   /// Runs `f` in a read transaction, ending it afterwards.
   pub fn execute_in_read<T, F>(&self, f: F) -> Result<T>
   where
      F: FnOnce(&Transaction) -> Result<T>,
   {
      let tx = self.begin_read()?;
      let result = f(&tx);
      let ended = tx.rollback();

      match (result, ended) {
         (Ok(value), Ok(())) => Ok(value),
         (Ok(_), Err(e)) => Err(e),
         (Err(e), Ok(())) => Err(e),
         (Err(e), Err(rollback_error)) => Err(Error::TransactionRollbackFailed {
            transaction_error: e.to_string(),
            rollback_error: rollback_error.to_string(),
         }),
      }
   }

   /// Runs `f` in a write transaction. Commits when `f` succeeds, rolls back
   /// when it fails.
   pub fn execute_in_write<T, F>(&self, f: F) -> Result<T>
   where
      F: FnOnce(&Transaction) -> Result<T>,
   {
      let tx = self.begin_write()?;
      match f(&tx) {
         Ok(value) => {
            tx.commit()?;
            Ok(value)
         }
         Err(e) => match tx.rollback() {
            Ok(()) => Err(e),
            Err(rollback_error) => Err(Error::TransactionRollbackFailed {
               transaction_error: e.to_string(),
               rollback_error: rollback_error.to_string(),
            }),
         },
      }
   }

   pub fn state(&self) -> TransactionState {
      self.shared.controller.lock().state
   }

   pub fn active_kind(&self) -> Option<TransactionKind> {
      self
         .shared
         .controller
         .lock()
         .active
         .as_ref()
         .map(|active| active.kind)
   }

   /// False once the session is poisoned or closed.
   pub fn is_valid(&self) -> bool {
      !self.shared.is_poisoned() && self.shared.node.is_valid()
   }

   /// Whether another session committed since this one last began or
   /// committed a transaction.
   pub fn has_changed(&self) -> Result<bool> {
      self.shared.ensure_usable()?;
      Ok(self
         .shared
         .node
         .with_native(|session| self.shared.engine.has_changed(session))??)
   }

   pub fn path(&self) -> &Path {
      &self.shared.path
   }

   /// Number of child releases waiting for a drain.
   pub fn pending_releases(&self) -> usize {
      self.shared.node.root().pending_len()
   }

   /// Releases queued child handles now instead of at the next acquisition.
   pub fn flush_pending(&self) -> usize {
      self.shared.node.root().flush_pending()
   }

   /// Rolls back any active transaction and shuts the session down.
   ///
   /// Objects still holding children of this session fail fast afterwards,
   /// and their releases run immediately on whichever thread drops them.
   pub fn close(self) -> Result<()> {
      let rolled_back = if self.shared.is_poisoned() {
         Ok(())
      } else {
         self.shared.rollback(None)
      };

      self.shared.node.request_release();
      debug!(path = %self.shared.path.display(), "Closed session");
      rolled_back
   }
}

impl fmt::Debug for SharedGroup {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("SharedGroup")
         .field("path", &self.shared.path)
         .field("state", &self.state())
         .field("poisoned", &self.shared.is_poisoned())
         .finish()
   }
}
