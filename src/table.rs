//! Tables and row cursors

use indexmap::IndexMap;
use native_handle_tree::{StructuralVersion, VersionStamp};
use native_table_engine::{ColumnType, ERR_OUT_OF_RANGE, ERR_TYPE_MISMATCH, EngineError, Value};
use tracing::trace;

use crate::accessor::Accessor;
use crate::error::{Error, Result};
use crate::spec::Spec;
use crate::view::TableView;

/// A table acquired from a [`crate::Group`] or a [`crate::Transaction`].
///
/// Structural mutations (adding or removing rows or columns, clearing) bump
/// the table's structural version, which invalidates every [`Row`] and
/// [`TableView`] derived from it through any handle to the same table.
pub struct Table {
   accessor: Accessor,
   version: StructuralVersion,
}

impl Table {
   pub(crate) fn acquire(parent: &Accessor, name: &str, create: bool) -> Result<Self> {
      let accessor = parent.acquire("table", |engine, group| {
         engine.group_table(group, name, create)
      })?;
      let version = accessor.call(|engine, table| engine.table_version(table))?;
      trace!(name, native = %accessor.node().native(), "Acquired table");
      Ok(Self { accessor, version })
   }

   pub fn name(&self) -> Result<String> {
      self.accessor.call(|engine, table| engine.table_name(table))
   }

   pub fn column_count(&self) -> Result<usize> {
      self.accessor.call(|engine, table| engine.table_column_count(table))
   }

   pub fn column_name(&self, column: usize) -> Result<String> {
      self.accessor.call(|engine, table| Ok(engine.table_column(table, column)?.name))
   }

   pub fn column_type(&self, column: usize) -> Result<ColumnType> {
      self
         .accessor
         .call(|engine, table| Ok(engine.table_column(table, column)?.column_type))
   }

   pub fn column_index(&self, name: &str) -> Result<usize> {
      self.accessor.call(|engine, table| engine.table_column_index(table, name))
   }

   /// Appends a column; existing rows get the type's default value.
   pub fn add_column(&self, name: &str, column_type: ColumnType) -> Result<usize> {
      self
         .accessor
         .call(|engine, table| engine.table_add_column(table, name, column_type))
   }

   pub fn size(&self) -> Result<usize> {
      self.accessor.call(|engine, table| engine.table_size(table))
   }

   pub fn is_empty(&self) -> Result<bool> {
      Ok(self.size()? == 0)
   }

   pub fn add_empty_row(&self) -> Result<usize> {
      self.accessor.call(|engine, table| engine.table_add_empty_row(table))
   }

   /// Appends a row and fills its columns in order from `values`.
   ///
   /// The values are checked against the column layout first. On failure no
   /// row is added and the structural version is unchanged.
   pub fn add_row<I, V>(&self, values: I) -> Result<usize>
   where
      I: IntoIterator<Item = V>,
      V: Into<Value>,
   {
      let values: Vec<Value> = values.into_iter().map(Into::into).collect();
      self.accessor.call(|engine, table| {
         let count = engine.table_column_count(table)?;
         if values.len() > count {
            return Err(EngineError::new(
               ERR_OUT_OF_RANGE,
               format!("row has {} values but the table has {count} columns", values.len()),
            ));
         }
         for (column, value) in values.iter().enumerate() {
            let spec = engine.table_column(table, column)?;
            if spec.column_type != value.column_type() {
               return Err(EngineError::new(
                  ERR_TYPE_MISMATCH,
                  format!("column '{}' holds {} values", spec.name, spec.column_type),
               ));
            }
         }

         let row = engine.table_add_empty_row(table)?;
         for (column, value) in values.into_iter().enumerate() {
            if let Err(e) = engine.table_set(table, row, column, value) {
               let _ = engine.table_remove_row(table, row);
               return Err(e);
            }
         }
         Ok(row)
      })
   }

   pub fn remove_row(&self, row: usize) -> Result<()> {
      self.accessor.call(|engine, table| engine.table_remove_row(table, row))
   }

   pub fn clear(&self) -> Result<()> {
      self.accessor.call(|engine, table| engine.table_clear(table))
   }

   pub fn get(&self, row: usize, column: usize) -> Result<Value> {
      self.accessor.call(|engine, table| engine.table_get(table, row, column))
   }

   /// Overwrites one cell. Not a structural change.
   pub fn set(&self, row: usize, column: usize, value: impl Into<Value>) -> Result<()> {
      let value = value.into();
      self
         .accessor
         .call(|engine, table| engine.table_set(table, row, column, value))
   }

   /// Cursor over row `index`, valid until the table's next structural change.
   pub fn row(&self, index: usize) -> Result<Row<'_>> {
      let size = self.size()?;
      if index >= size {
         return Err(Error::RowOutOfRange { index, size });
      }
      Ok(Row {
         source: RowSource::Table(self),
         index,
         stamp: self.version.stamp(),
      })
   }

   /// Every row as a column-name to value map, in row order.
   pub fn rows(&self) -> Result<Vec<IndexMap<String, Value>>> {
      (0..self.size()?)
         .map(|index| self.row(index)?.to_map())
         .collect()
   }

   /// View over the rows whose `column` equals `value`.
   pub fn find_all(&self, column: usize, value: impl Into<Value>) -> Result<TableView> {
      let value = value.into();
      let stamp = self.version.stamp();
      let columns = (0..self.column_count()?)
         .map(|column| self.column_name(column))
         .collect::<Result<Vec<_>>>()?;
      let accessor = self.accessor.acquire("view", |engine, table| {
         engine.table_find_all(table, column, &value)
      })?;
      Ok(TableView::new(accessor, stamp, columns))
   }

   pub fn spec(&self) -> Result<Spec> {
      let accessor = self
         .accessor
         .acquire("spec", |engine, table| engine.table_spec(table))?;
      Ok(Spec::new(accessor))
   }

   /// Current structural version.
   pub fn version(&self) -> u64 {
      self.version.current()
   }

   pub fn is_valid(&self) -> bool {
      self.accessor.is_valid()
   }

   /// Releases the native table. Later calls fail without reaching the engine.
   pub fn release(&self) {
      self.accessor.release();
   }
}

impl std::fmt::Debug for Table {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("Table").finish_non_exhaustive()
   }
}

#[derive(Clone, Copy)]
pub(crate) enum RowSource<'a> {
   Table(&'a Table),
   View(&'a TableView),
}

/// Position-based cursor over one row of a [`Table`] or [`TableView`].
///
/// Holds no native resource. Every access first checks that the source has
/// not changed shape since the cursor was created.
pub struct Row<'a> {
   source: RowSource<'a>,
   index: usize,
   stamp: VersionStamp,
}

impl<'a> Row<'a> {
   pub(crate) fn new(source: RowSource<'a>, index: usize, stamp: VersionStamp) -> Self {
      Self {
         source,
         index,
         stamp,
      }
   }

   /// Index within the table or view the cursor was taken from.
   pub fn index(&self) -> usize {
      self.index
   }

   pub fn is_current(&self) -> bool {
      self.stamp.is_current()
   }

   pub fn get(&self, column: usize) -> Result<Value> {
      self.stamp.check()?;
      match self.source {
         RowSource::Table(table) => table.get(self.index, column),
         RowSource::View(view) => view.get(self.index, column),
      }
   }

   pub fn set(&self, column: usize, value: impl Into<Value>) -> Result<()> {
      self.stamp.check()?;
      match self.source {
         RowSource::Table(table) => table.set(self.index, column, value),
         RowSource::View(view) => view.set(self.index, column, value),
      }
   }

   pub fn to_map(&self) -> Result<IndexMap<String, Value>> {
      self.stamp.check()?;
      let table = match self.source {
         RowSource::Table(table) => table,
         RowSource::View(view) => return view.row_map(self.index),
      };

      let mut map = IndexMap::default();
      for column in 0..table.column_count()? {
         map.insert(table.column_name(column)?, table.get(self.index, column)?);
      }
      Ok(map)
   }
}
