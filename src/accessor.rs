//! Binding between a wrapper object and its node in a handle tree.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use native_handle_tree::{Destructor, HandleNode, Liveness, NativeHandle};
use native_table_engine::{EngineError, EngineResult, TableEngine};

use crate::error::{Error, Result};

/// Destroy entry point handed to every node of a tree.
pub(crate) fn engine_destructor(engine: &Arc<TableEngine>) -> Arc<dyn Destructor> {
   let engine = Arc::clone(engine);
   Arc::new(move |handle: NativeHandle| engine.destroy(handle))
}

/// A handle node plus the checks that must pass before its native handle
/// is passed to the engine.
pub(crate) struct Accessor {
   engine: Arc<TableEngine>,
   destructor: Arc<dyn Destructor>,
   node: HandleNode,
   /// Transaction the object was acquired in, if any
   scope: Option<Liveness>,
   /// Poison flag of the owning session, if any
   poisoned: Option<Arc<AtomicBool>>,
}

impl Accessor {
   pub(crate) fn new(
      engine: Arc<TableEngine>,
      destructor: Arc<dyn Destructor>,
      node: HandleNode,
      scope: Option<Liveness>,
      poisoned: Option<Arc<AtomicBool>>,
   ) -> Self {
      Self {
         engine,
         destructor,
         node,
         scope,
         poisoned,
      }
   }

   pub(crate) fn node(&self) -> &HandleNode {
      &self.node
   }

   /// Native handle, once every check passes. Never touches the engine.
   pub(crate) fn checked(&self) -> Result<NativeHandle> {
      if let Some(poisoned) = &self.poisoned
         && poisoned.load(Ordering::Acquire)
      {
         return Err(Error::SessionInvalidated);
      }
      if let Some(scope) = &self.scope {
         scope.check()?;
      }
      Ok(self.node.validate()?)
   }

   pub(crate) fn is_valid(&self) -> bool {
      self.checked().is_ok()
   }

   /// Runs one engine call on this accessor's handle. The checks and the call
   /// happen under the root's lock, so no release on the same root can
   /// destroy anything in between.
   pub(crate) fn call<R, F>(&self, f: F) -> Result<R>
   where
      F: FnOnce(&TableEngine, NativeHandle) -> EngineResult<R>,
   {
      self.node.root().serialize(|| {
         let handle = self.checked()?;
         Ok(f(&self.engine, handle)?)
      })
   }

   /// Acquires a child of the same root. `create` receives this accessor's
   /// native handle and returns the new resource. The child inherits the
   /// transaction scope and poison flag.
   pub(crate) fn acquire<F>(&self, label: &'static str, create: F) -> Result<Accessor>
   where
      F: FnOnce(&TableEngine, NativeHandle) -> EngineResult<NativeHandle>,
   {
      self.checked()?;

      // The parent is checked again under the root's lock, right before the
      // engine call. A refusal there is reported as itself.
      let root = self.node.root();
      let mut refused = None;
      let acquired = root.acquire_child(label, Arc::clone(&self.destructor), || {
         root.serialize(|| match self.checked() {
            Ok(parent) => create(&self.engine, parent),
            Err(e) => {
               refused = Some(e);
               Err(EngineError::new(0, "parent no longer usable"))
            }
         })
      });
      if let Some(e) = refused {
         return Err(e);
      }
      let node = acquired?;

      Ok(Accessor {
         engine: Arc::clone(&self.engine),
         destructor: Arc::clone(&self.destructor),
         node,
         scope: self.scope.clone(),
         poisoned: self.poisoned.clone(),
      })
   }

   pub(crate) fn release(&self) {
      self.node.request_release();
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn group_accessor(engine: &Arc<TableEngine>) -> Accessor {
      let destructor = engine_destructor(engine);
      let node = HandleNode::new_default_root("group", Arc::clone(&destructor));
      node.attach(engine.open_group().unwrap()).unwrap();
      Accessor::new(Arc::clone(engine), destructor, node, None, None)
   }

   #[test]
   fn test_acquire_creates_child_of_same_root() {
      let engine = Arc::new(TableEngine::new());
      let group = group_accessor(&engine);

      let table = group
         .acquire("table", |engine, group| engine.group_table(group, "t", true))
         .unwrap();
      assert!(!table.node().is_root());
      assert!(group.node().root().owns(table.node()));
      assert_eq!(engine.live_handles(), 2);
   }

   #[test]
   fn test_failed_create_leaves_nothing_behind() {
      let engine = Arc::new(TableEngine::new());
      let group = group_accessor(&engine);

      let result = group.acquire("table", |engine, group| engine.group_table(group, "t", false));
      assert!(matches!(result, Err(Error::Engine(_))));
      assert_eq!(group.node().root().pending_len(), 0);
      assert_eq!(engine.live_handles(), 1);
   }

   #[test]
   fn test_poisoned_fails_before_validation() {
      let engine = Arc::new(TableEngine::new());
      let destructor = engine_destructor(&engine);
      let node = HandleNode::new_default_root("group", Arc::clone(&destructor));
      node.attach(engine.open_group().unwrap()).unwrap();
      let poisoned = Arc::new(AtomicBool::new(true));
      let accessor = Accessor::new(engine, destructor, node, None, Some(poisoned));

      assert!(matches!(accessor.checked(), Err(Error::SessionInvalidated)));
   }

   #[test]
   fn test_ended_scope_fails() {
      let engine = Arc::new(TableEngine::new());
      let destructor = engine_destructor(&engine);
      let node = HandleNode::new_default_root("group", Arc::clone(&destructor));
      node.attach(engine.open_group().unwrap()).unwrap();
      let scope = Liveness::new("transaction");
      let accessor = Accessor::new(engine, destructor, node, Some(scope.clone()), None);

      assert!(accessor.is_valid());
      scope.end();
      assert!(matches!(accessor.checked(), Err(Error::TransactionEnded)));
   }

   #[test]
   fn test_release_destroys_root_resource() {
      let engine = Arc::new(TableEngine::new());
      let group = group_accessor(&engine);

      group.release();
      group.release();
      assert_eq!(engine.live_handles(), 0);
      assert!(!group.is_valid());
   }
}
