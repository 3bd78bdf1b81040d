//! Table contents and column layout.
//!
//! Every structural mutation bumps the table's [`StructuralVersion`]; cell
//! writes do not, since they leave row positions intact.

use native_handle_tree::StructuralVersion;
use serde::{Deserialize, Serialize};

use crate::error::{EngineResult, duplicate_column, not_found, out_of_range, type_mismatch};
use crate::value::{ColumnType, Value};

/// Name and type of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
   pub name: String,
   pub column_type: ColumnType,
}

impl ColumnSpec {
   pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
      Self {
         name: name.into(),
         column_type,
      }
   }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct TableData {
   columns: Vec<ColumnSpec>,
   rows: Vec<Vec<Value>>,
   #[serde(skip)]
   version: StructuralVersion,
}

impl Clone for TableData {
   /// The copy gets its own counter so cursors over the original are not
   /// invalidated by mutations of the copy.
   fn clone(&self) -> Self {
      Self {
         columns: self.columns.clone(),
         rows: self.rows.clone(),
         version: self.version.detached_copy(),
      }
   }
}

impl TableData {
   pub(crate) fn version(&self) -> &StructuralVersion {
      &self.version
   }

   pub(crate) fn columns(&self) -> &[ColumnSpec] {
      &self.columns
   }

   pub(crate) fn column(&self, index: usize) -> EngineResult<&ColumnSpec> {
      self
         .columns
         .get(index)
         .ok_or_else(|| out_of_range("column", index, self.columns.len()))
   }

   pub(crate) fn column_index(&self, name: &str) -> EngineResult<usize> {
      self
         .columns
         .iter()
         .position(|c| c.name == name)
         .ok_or_else(|| not_found(format!("column '{name}'")))
   }

   pub(crate) fn add_column(&mut self, name: &str, column_type: ColumnType) -> EngineResult<usize> {
      if self.columns.iter().any(|c| c.name == name) {
         return Err(duplicate_column(name));
      }

      self.columns.push(ColumnSpec::new(name, column_type));
      for row in &mut self.rows {
         row.push(column_type.default_value());
      }
      self.version.bump();
      Ok(self.columns.len() - 1)
   }

   pub(crate) fn len(&self) -> usize {
      self.rows.len()
   }

   pub(crate) fn add_empty_row(&mut self) -> usize {
      let row = self
         .columns
         .iter()
         .map(|c| c.column_type.default_value())
         .collect();
      self.rows.push(row);
      self.version.bump();
      self.rows.len() - 1
   }

   pub(crate) fn remove_row(&mut self, row: usize) -> EngineResult<()> {
      self.check_row(row)?;
      self.rows.remove(row);
      self.version.bump();
      Ok(())
   }

   pub(crate) fn clear(&mut self) {
      self.rows.clear();
      self.version.bump();
   }

   pub(crate) fn get(&self, row: usize, column: usize) -> EngineResult<Value> {
      self.check_row(row)?;
      self.column(column)?;
      Ok(self.rows[row][column].clone())
   }

   pub(crate) fn set(&mut self, row: usize, column: usize, value: Value) -> EngineResult<()> {
      self.check_row(row)?;
      let spec = self.column(column)?;
      if spec.column_type != value.column_type() {
         return Err(type_mismatch(&spec.name, spec.column_type));
      }
      self.rows[row][column] = value;
      Ok(())
   }

   /// Positions of rows whose `column` equals `value`.
   pub(crate) fn find_all(&self, column: usize, value: &Value) -> EngineResult<Vec<usize>> {
      let spec = self.column(column)?;
      if spec.column_type != value.column_type() {
         return Err(type_mismatch(&spec.name, spec.column_type));
      }

      Ok(self
         .rows
         .iter()
         .enumerate()
         .filter(|(_, row)| &row[column] == value)
         .map(|(index, _)| index)
         .collect())
   }

   fn check_row(&self, row: usize) -> EngineResult<()> {
      if row >= self.rows.len() {
         return Err(out_of_range("row", row, self.rows.len()));
      }
      Ok(())
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::error::{ERR_DUPLICATE, ERR_OUT_OF_RANGE, ERR_TYPE_MISMATCH};

   fn people() -> TableData {
      let mut table = TableData::default();
      table.add_column("name", ColumnType::String).unwrap();
      table.add_column("age", ColumnType::Int).unwrap();
      for (name, age) in [("alice", 30), ("bob", 25), ("carol", 30)] {
         let row = table.add_empty_row();
         table.set(row, 0, Value::from(name)).unwrap();
         table.set(row, 1, Value::from(age)).unwrap();
      }
      table
   }

   #[test]
   fn test_structural_mutations_bump_version() {
      let mut table = people();
      let before = table.version().current();

      table.set(0, 1, Value::from(31)).unwrap();
      assert_eq!(table.version().current(), before);

      table.add_empty_row();
      table.remove_row(0).unwrap();
      table.clear();
      assert_eq!(table.version().current(), before + 3);
   }

   #[test]
   fn test_add_column_fills_existing_rows() {
      let mut table = people();
      let index = table.add_column("active", ColumnType::Bool).unwrap();
      assert_eq!(table.get(2, index).unwrap(), Value::Bool(false));

      let err = table.add_column("age", ColumnType::Int).unwrap_err();
      assert_eq!(err.code, ERR_DUPLICATE);
   }

   #[test]
   fn test_set_rejects_wrong_type() {
      let mut table = people();
      let err = table.set(0, 1, Value::from("thirty")).unwrap_err();
      assert_eq!(err.code, ERR_TYPE_MISMATCH);
      assert!(err.message.contains("age"));
   }

   #[test]
   fn test_bounds_are_checked() {
      let table = people();
      assert_eq!(table.get(3, 0).unwrap_err().code, ERR_OUT_OF_RANGE);
      assert_eq!(table.get(0, 2).unwrap_err().code, ERR_OUT_OF_RANGE);
   }

   #[test]
   fn test_find_all_returns_matching_positions() {
      let table = people();
      assert_eq!(table.find_all(1, &Value::from(30)).unwrap(), vec![0, 2]);
      assert!(table.find_all(1, &Value::from(99)).unwrap().is_empty());
   }

   #[test]
   fn test_clone_detaches_version() {
      let table = people();
      let mut copy = table.clone();
      copy.add_empty_row();
      assert_eq!(copy.version().current(), table.version().current() + 1);
   }
}
