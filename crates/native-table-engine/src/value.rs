use std::fmt;

use serde::{Deserialize, Serialize};

/// Type of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
   Int,
   Bool,
   Double,
   String,
}

impl ColumnType {
   /// Value stored in this column for a freshly added row.
   pub fn default_value(self) -> Value {
      match self {
         ColumnType::Int => Value::Int(0),
         ColumnType::Bool => Value::Bool(false),
         ColumnType::Double => Value::Double(0.0),
         ColumnType::String => Value::String(String::new()),
      }
   }
}

impl fmt::Display for ColumnType {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let name = match self {
         ColumnType::Int => "int",
         ColumnType::Bool => "bool",
         ColumnType::Double => "double",
         ColumnType::String => "string",
      };
      f.write_str(name)
   }
}

/// Typed cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
   Int(i64),
   Bool(bool),
   Double(f64),
   String(String),
}

impl Value {
   pub fn column_type(&self) -> ColumnType {
      match self {
         Value::Int(_) => ColumnType::Int,
         Value::Bool(_) => ColumnType::Bool,
         Value::Double(_) => ColumnType::Double,
         Value::String(_) => ColumnType::String,
      }
   }

   /// Attempts to get this value as an integer.
   pub fn as_int(&self) -> Option<i64> {
      match self {
         Value::Int(i) => Some(*i),
         _ => None,
      }
   }

   pub fn as_bool(&self) -> Option<bool> {
      match self {
         Value::Bool(b) => Some(*b),
         _ => None,
      }
   }

   pub fn as_double(&self) -> Option<f64> {
      match self {
         Value::Double(d) => Some(*d),
         _ => None,
      }
   }

   pub fn as_str(&self) -> Option<&str> {
      match self {
         Value::String(s) => Some(s),
         _ => None,
      }
   }
}

impl From<i64> for Value {
   fn from(value: i64) -> Self {
      Value::Int(value)
   }
}

impl From<i32> for Value {
   fn from(value: i32) -> Self {
      Value::Int(value.into())
   }
}

impl From<bool> for Value {
   fn from(value: bool) -> Self {
      Value::Bool(value)
   }
}

impl From<f64> for Value {
   fn from(value: f64) -> Self {
      Value::Double(value)
   }
}

impl From<&str> for Value {
   fn from(value: &str) -> Self {
      Value::String(value.to_string())
   }
}

impl From<String> for Value {
   fn from(value: String) -> Self {
      Value::String(value)
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_default_value_matches_column_type() {
      for ty in [
         ColumnType::Int,
         ColumnType::Bool,
         ColumnType::Double,
         ColumnType::String,
      ] {
         assert_eq!(ty.default_value().column_type(), ty);
      }
   }

   #[test]
   fn test_accessors_reject_other_types() {
      let value = Value::from("alice");
      assert_eq!(value.as_str(), Some("alice"));
      assert_eq!(value.as_int(), None);
      assert_eq!(Value::from(7).as_int(), Some(7));
      assert_eq!(Value::from(true).as_bool(), Some(true));
   }
}
