//! Configuration for handle trees

use serde::Deserialize;

/// Configuration applied to a root and every child acquired through it
///
/// # Examples
///
/// ```
/// use native_handle_tree::HandleTreeConfig;
///
/// // Use defaults
/// let config = HandleTreeConfig::default();
///
/// // Override just one field
/// let config = HandleTreeConfig {
///     pending_warn_threshold: 64,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HandleTreeConfig {
   /// Drain the pending release queue on the calling thread before every
   /// child acquisition.
   ///
   /// Turning this off leaves draining to [`crate::Root::flush_pending`] and
   /// to root shutdown.
   ///
   /// Default: true
   pub drain_on_acquire: bool,

   /// Queue depth at which a warning is logged.
   ///
   /// The queue is not bounded; crossing the threshold only produces a
   /// `tracing` warning so a caller that never acquires new children can be
   /// spotted and pointed at `flush_pending`.
   ///
   /// Default: 1024
   pub pending_warn_threshold: usize,
}

impl Default for HandleTreeConfig {
   fn default() -> Self {
      Self {
         drain_on_acquire: true,
         pending_warn_threshold: 1024,
      }
   }
}
