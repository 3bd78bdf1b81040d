//! Filtered views over a table

use indexmap::IndexMap;
use native_handle_tree::{NativeHandle, VersionStamp};
use native_table_engine::{EngineResult, TableEngine, Value};

use crate::accessor::Accessor;
use crate::error::{Error, Result};
use crate::table::{Row, RowSource};

/// Rows of a table that matched a [`crate::Table::find_all`] query.
///
/// The view owns its own native resource and records the table's structural
/// version at creation. Once the table changes shape, every access fails
/// with [`Error::StaleReference`]; cell writes through the table or the view
/// do not invalidate it.
pub struct TableView {
   accessor: Accessor,
   stamp: VersionStamp,
   columns: Vec<String>,
}

impl TableView {
   pub(crate) fn new(accessor: Accessor, stamp: VersionStamp, columns: Vec<String>) -> Self {
      Self {
         accessor,
         stamp,
         columns,
      }
   }

   fn call<R, F>(&self, f: F) -> Result<R>
   where
      F: FnOnce(&TableEngine, NativeHandle) -> EngineResult<R>,
   {
      self.stamp.check()?;
      self.accessor.call(f)
   }

   pub fn size(&self) -> Result<usize> {
      self.call(|engine, view| engine.view_size(view))
   }

   pub fn is_empty(&self) -> Result<bool> {
      Ok(self.size()? == 0)
   }

   /// Row index in the source table of the view's `index`-th row.
   pub fn source_index(&self, index: usize) -> Result<usize> {
      self.call(|engine, view| engine.view_source_index(view, index))
   }

   pub fn get(&self, index: usize, column: usize) -> Result<Value> {
      self.call(|engine, view| engine.view_get(view, index, column))
   }

   pub fn set(&self, index: usize, column: usize, value: impl Into<Value>) -> Result<()> {
      let value = value.into();
      self.call(|engine, view| engine.view_set(view, index, column, value))
   }

   pub fn row(&self, index: usize) -> Result<Row<'_>> {
      let size = self.size()?;
      if index >= size {
         return Err(Error::RowOutOfRange { index, size });
      }
      Ok(Row::new(RowSource::View(self), index, self.stamp.clone()))
   }

   pub(crate) fn row_map(&self, index: usize) -> Result<IndexMap<String, Value>> {
      let mut map = IndexMap::default();
      for (column, name) in self.columns.iter().enumerate() {
         map.insert(name.clone(), self.get(index, column)?);
      }
      Ok(map)
   }

   /// Whether the source table still has the shape the view was built from.
   pub fn is_current(&self) -> bool {
      self.stamp.is_current()
   }

   pub fn is_valid(&self) -> bool {
      self.is_current() && self.accessor.is_valid()
   }

   pub fn release(&self) {
      self.accessor.release();
   }
}
