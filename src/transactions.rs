//! Transactions started from a [`SharedGroup`](crate::SharedGroup)

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::accessor::Accessor;
use crate::error::Result;
use crate::session::{SessionShared, TransactionKind};
use crate::table::Table;

/// A read or write transaction on a shared session.
///
/// Tables acquired through the transaction stop working once it ends.
/// Dropping a transaction that was neither committed nor rolled back rolls
/// it back; a failure there is logged and poisons the session.
#[must_use = "if unused, the transaction is immediately rolled back"]
pub struct Transaction {
   // Must drop before `session`: the group is queued while the root is
   // alive and destroyed ahead of it.
   accessor: Accessor,
   session: Arc<SessionShared>,
   kind: TransactionKind,
   id: Uuid,
}

impl Transaction {
   pub(crate) fn new(
      session: Arc<SessionShared>,
      accessor: Accessor,
      kind: TransactionKind,
      id: Uuid,
   ) -> Self {
      Self {
         accessor,
         session,
         kind,
         id,
      }
   }

   pub fn kind(&self) -> TransactionKind {
      self.kind
   }

   pub fn id(&self) -> Uuid {
      self.id
   }

   /// Returns the named table. Write transactions create it if missing;
   /// read transactions report the engine's not-found error.
   pub fn table(&self, name: &str) -> Result<Table> {
      Table::acquire(&self.accessor, name, self.kind == TransactionKind::Write)
   }

   pub fn has_table(&self, name: &str) -> Result<bool> {
      self
         .accessor
         .call(|engine, group| engine.group_has_table(group, name))
   }

   pub fn table_count(&self) -> Result<usize> {
      self
         .accessor
         .call(|engine, group| engine.group_table_count(group))
   }

   pub fn table_names(&self) -> Result<Vec<String>> {
      self
         .accessor
         .call(|engine, group| engine.group_table_names(group))
   }

   /// Publishes the transaction's changes. Only write transactions commit.
   pub fn commit(self) -> Result<()> {
      self.session.commit(Some(self.id))
   }

   pub fn rollback(self) -> Result<()> {
      self.session.rollback(Some(self.id))
   }

   /// Whether the transaction is still active and its session usable.
   pub fn is_valid(&self) -> bool {
      self.accessor.is_valid()
   }
}

impl Drop for Transaction {
   fn drop(&mut self) {
      if self.session.is_active(self.id) {
         debug!(id = %self.id, kind = %self.kind, "Dropping active transaction (will roll back)");
         self.session.rollback_dropped(self.id);
      }
      // The accessor drops next, queueing the group handle for release.
   }
}

impl fmt::Debug for Transaction {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Transaction")
         .field("id", &self.id)
         .field("kind", &self.kind)
         .finish()
   }
}
