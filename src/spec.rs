use native_table_engine::{ColumnSpec, ColumnType};

use crate::accessor::Accessor;
use crate::error::Result;

/// Column layout of a table, read through its own native handle.
pub struct Spec {
   accessor: Accessor,
}

impl Spec {
   pub(crate) fn new(accessor: Accessor) -> Self {
      Self { accessor }
   }

   pub fn column_count(&self) -> Result<usize> {
      self
         .accessor
         .call(|engine, spec| engine.spec_column_count(spec))
   }

   pub fn column_name(&self, column: usize) -> Result<String> {
      Ok(self.column(column)?.name)
   }

   pub fn column_type(&self, column: usize) -> Result<ColumnType> {
      Ok(self.column(column)?.column_type)
   }

   pub fn columns(&self) -> Result<Vec<ColumnSpec>> {
      (0..self.column_count()?)
         .map(|column| self.column(column))
         .collect()
   }

   fn column(&self, column: usize) -> Result<ColumnSpec> {
      self
         .accessor
         .call(|engine, spec| engine.spec_column(spec, column))
   }

   pub fn is_valid(&self) -> bool {
      self.accessor.is_valid()
   }

   pub fn release(&self) {
      self.accessor.release();
   }
}
