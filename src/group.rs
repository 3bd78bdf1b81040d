//! Standalone groups

use std::sync::Arc;

use native_handle_tree::{DiagnosticSink, HandleNode, HandleTreeConfig, NoopSink};
use native_table_engine::TableEngine;
use tracing::debug;

use crate::accessor::{Accessor, engine_destructor};
use crate::error::Result;
use crate::table::Table;

/// A free-standing, always writable set of tables with no backing storage.
///
/// The group is the root of its own handle tree: tables, views and specs
/// acquired from it are children, released through the group's queue and
/// destroyed no later than the group itself.
pub struct Group {
   accessor: Accessor,
}

impl Group {
   pub fn new(engine: &Arc<TableEngine>) -> Result<Self> {
      Self::with_config(engine, HandleTreeConfig::default(), Arc::new(NoopSink))
   }

   pub fn with_config(
      engine: &Arc<TableEngine>,
      config: HandleTreeConfig,
      sink: Arc<dyn DiagnosticSink>,
   ) -> Result<Self> {
      let destructor = engine_destructor(engine);
      let node = HandleNode::new_root("group", Arc::clone(&destructor), config, sink);
      node.attach(engine.open_group()?)?;
      debug!(native = %node.native(), "Opened standalone group");

      Ok(Self {
         accessor: Accessor::new(Arc::clone(engine), destructor, node, None, None),
      })
   }

   /// Returns the named table, creating it if it does not exist.
   pub fn table(&self, name: &str) -> Result<Table> {
      Table::acquire(&self.accessor, name, true)
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

   /// Releases queued child handles now instead of at the next acquisition.
   pub fn flush_pending(&self) -> usize {
      self.accessor.node().root().flush_pending()
   }

   /// Number of child releases waiting for a drain.
   pub fn pending_releases(&self) -> usize {
      self.accessor.node().root().pending_len()
   }

   pub fn is_valid(&self) -> bool {
      self.accessor.is_valid()
   }

   /// Shuts the group down: queued child releases run, then the group's own
   /// native resource is destroyed. Children released later are destroyed
   /// immediately on the releasing thread.
   pub fn release(&self) {
      self.accessor.release();
   }
}
