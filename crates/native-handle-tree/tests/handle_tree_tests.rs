//! Integration tests for cross-thread teardown of handle trees.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use native_handle_tree::{
   CountingSink, Destructor, EngineError, HandleNode, HandleTreeConfig, NativeHandle,
};
use parking_lot::Mutex;

/// Fake engine that records every destroy call and flags double frees.
#[derive(Default)]
struct FakeEngine {
   live: Mutex<HashSet<usize>>,
   destroyed: Mutex<Vec<usize>>,
   next: Mutex<usize>,
}

impl FakeEngine {
   fn create(&self) -> Result<NativeHandle, EngineError> {
      let mut next = self.next.lock();
      *next += 1;
      self.live.lock().insert(*next);
      Ok(NativeHandle::from_raw(*next))
   }

   fn destructor(self: &Arc<Self>) -> Arc<dyn Destructor> {
      let engine = Arc::clone(self);
      Arc::new(move |handle: NativeHandle| -> Result<(), EngineError> {
         if !engine.live.lock().remove(&handle.as_raw()) {
            return Err(EngineError::new(-1, format!("double free of {handle}")));
         }
         engine.destroyed.lock().push(handle.as_raw());
         Ok(())
      })
   }
}

fn init_tracing() {
   let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn new_root(engine: &Arc<FakeEngine>, sink: Arc<CountingSink>) -> HandleNode {
   let root = HandleNode::new_root(
      "root",
      engine.destructor(),
      HandleTreeConfig::default(),
      sink,
   );
   root.attach(engine.create().unwrap()).unwrap();
   root
}

// ============================================================================
// Finalizer-thread teardown
// ============================================================================

#[test]
fn test_children_dropped_on_other_thread_are_drained_by_next_acquire() {
   let engine = Arc::new(FakeEngine::default());
   let sink = Arc::new(CountingSink::new());
   let root = new_root(&engine, sink.clone());

   let children: Vec<HandleNode> = (0..5)
      .map(|_| {
         root
            .root()
            .acquire_child("child", engine.destructor(), || engine.create())
            .unwrap()
      })
      .collect();
   let expected: Vec<usize> = children.iter().map(|c| c.native().as_raw()).collect();

   thread::spawn(move || drop(children)).join().unwrap();
   assert_eq!(root.root().pending_len(), 5);
   assert!(engine.destroyed.lock().is_empty());

   let _fresh = root
      .root()
      .acquire_child("child", engine.destructor(), || engine.create())
      .unwrap();

   assert_eq!(*engine.destroyed.lock(), expected);
   assert_eq!(sink.snapshot().drained, 5);
   assert_eq!(sink.snapshot().max_depth, 5);
}

#[test]
fn test_root_dropped_on_other_thread_while_child_reachable() {
   let engine = Arc::new(FakeEngine::default());
   let sink = Arc::new(CountingSink::new());
   let root = new_root(&engine, sink.clone());
   let child = root
      .root()
      .acquire_child("child", engine.destructor(), || engine.create())
      .unwrap();

   thread::spawn(move || drop(root)).join().unwrap();
   assert!(!child.is_valid());

   child.request_release();
   child.request_release();

   assert!(engine.live.lock().is_empty());
   assert_eq!(sink.snapshot().failed, 0);
   assert_eq!(sink.snapshot().released, 2);
}

#[test]
fn test_concurrent_teardown_destroys_each_handle_once() {
   init_tracing();
   let engine = Arc::new(FakeEngine::default());
   let sink = Arc::new(CountingSink::new());
   let root = new_root(&engine, sink.clone());

   let mut batches = Vec::new();
   for _ in 0..4 {
      let batch: Vec<HandleNode> = (0..25)
         .map(|_| {
            root
               .root()
               .acquire_child("child", engine.destructor(), || engine.create())
               .unwrap()
         })
         .collect();
      batches.push(batch);
   }

   let workers: Vec<_> = batches
      .into_iter()
      .map(|batch| thread::spawn(move || drop(batch)))
      .collect();

   let root_ref = root.root();
   let flusher = thread::spawn(move || {
      for _ in 0..50 {
         root_ref.flush_pending();
      }
   });

   for worker in workers {
      worker.join().unwrap();
   }
   flusher.join().unwrap();
   drop(root);

   assert!(engine.live.lock().is_empty());
   assert_eq!(engine.destroyed.lock().len(), 101);
   assert_eq!(sink.snapshot().failed, 0);
}

#[test]
fn test_independent_roots_tear_down_in_parallel() {
   let engine = Arc::new(FakeEngine::default());

   let workers: Vec<_> = (0..4)
      .map(|_| {
         let engine = Arc::clone(&engine);
         thread::spawn(move || {
            let root = new_root(&engine, Arc::new(CountingSink::new()));
            let children: Vec<HandleNode> = (0..10)
               .map(|_| {
                  root
                     .root()
                     .acquire_child("child", engine.destructor(), || engine.create())
                     .unwrap()
               })
               .collect();
            drop(root);
            drop(children);
         })
      })
      .collect();

   for worker in workers {
      worker.join().unwrap();
   }

   assert!(engine.live.lock().is_empty());
   assert_eq!(engine.destroyed.lock().len(), 44);
}

#[test]
fn test_disabled_drain_on_acquire_keeps_queue() {
   let engine = Arc::new(FakeEngine::default());
   let root = HandleNode::new_root(
      "root",
      engine.destructor(),
      HandleTreeConfig {
         drain_on_acquire: false,
         ..Default::default()
      },
      Arc::new(CountingSink::new()),
   );
   root.attach(engine.create().unwrap()).unwrap();

   let first = root
      .root()
      .acquire_child("child", engine.destructor(), || engine.create())
      .unwrap();
   drop(first);
   let _second = root
      .root()
      .acquire_child("child", engine.destructor(), || engine.create())
      .unwrap();

   assert_eq!(root.root().pending_len(), 1);
   assert_eq!(root.root().flush_pending(), 1);
   assert_eq!(engine.destroyed.lock().len(), 1);
}
