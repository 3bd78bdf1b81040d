//! Session configuration

use native_handle_tree::HandleTreeConfig;
use native_table_engine::Durability;
use serde::Deserialize;

/// Options for [`crate::SharedGroup::open`]
///
/// # Examples
///
/// ```
/// use tabular_binding::{Durability, SessionConfig};
///
/// let config = SessionConfig {
///     no_create: true,
///     ..Default::default()
/// };
/// assert_eq!(config.durability, Durability::Full);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
   /// Whether commits outlive the engine instance.
   ///
   /// Default: [`Durability::Full`]
   pub durability: Durability,

   /// Fail instead of creating the storage when nothing exists at the path.
   ///
   /// Default: false
   pub no_create: bool,

   /// Release-queue behavior for the session's handle tree.
   pub handle_tree: HandleTreeConfig,
}

impl SessionConfig {
   /// Config for a session whose commits live only as long as the engine.
   pub fn mem_only() -> Self {
      Self {
         durability: Durability::MemOnly,
         ..Default::default()
      }
   }
}
