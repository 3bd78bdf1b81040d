//! Optional observation of handle lifecycle events
//!
//! Release logic never consults a sink; it only reports to it. A tree built
//! with [`NoopSink`] behaves exactly like one built with [`CountingSink`].

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

use crate::handle::NativeHandle;

/// Receives lifecycle events from roots and their children.
///
/// Every method has an empty default so implementations only override what
/// they care about. Methods may be called while a root's queue lock is held
/// and from whichever thread drops a handle, so they must not block or call
/// back into the tree.
pub trait DiagnosticSink: Send + Sync {
   fn on_attached(&self, _label: &'static str, _handle: NativeHandle) {}

   fn on_enqueued(&self, _label: &'static str, _depth: usize) {}

   fn on_drained(&self, _count: usize) {}

   fn on_released(&self, _label: &'static str) {}

   fn on_release_failed(&self, _label: &'static str, _reason: &str) {}
}

/// Sink that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl DiagnosticSink for NoopSink {}

/// Sink that keeps running totals, mainly for tests and debug builds
#[derive(Debug, Default)]
pub struct CountingSink {
   attached: AtomicU64,
   enqueued: AtomicU64,
   drained: AtomicU64,
   released: AtomicU64,
   failed: AtomicU64,
   max_depth: AtomicUsize,
}

/// Point-in-time copy of a [`CountingSink`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
   pub attached: u64,
   pub enqueued: u64,
   pub drained: u64,
   pub released: u64,
   pub failed: u64,
   pub max_depth: usize,
}

impl CountingSink {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn snapshot(&self) -> DiagnosticsSnapshot {
      DiagnosticsSnapshot {
         attached: self.attached.load(Ordering::Relaxed),
         enqueued: self.enqueued.load(Ordering::Relaxed),
         drained: self.drained.load(Ordering::Relaxed),
         released: self.released.load(Ordering::Relaxed),
         failed: self.failed.load(Ordering::Relaxed),
         max_depth: self.max_depth.load(Ordering::Relaxed),
      }
   }
}

impl DiagnosticSink for CountingSink {
   fn on_attached(&self, _label: &'static str, _handle: NativeHandle) {
      self.attached.fetch_add(1, Ordering::Relaxed);
   }

   fn on_enqueued(&self, _label: &'static str, depth: usize) {
      self.enqueued.fetch_add(1, Ordering::Relaxed);
      self.max_depth.fetch_max(depth, Ordering::Relaxed);
   }

   fn on_drained(&self, count: usize) {
      self.drained.fetch_add(count as u64, Ordering::Relaxed);
   }

   fn on_released(&self, _label: &'static str) {
      self.released.fetch_add(1, Ordering::Relaxed);
   }

   fn on_release_failed(&self, _label: &'static str, _reason: &str) {
      self.failed.fetch_add(1, Ordering::Relaxed);
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_counting_sink_tracks_max_depth() {
      let sink = CountingSink::new();
      sink.on_enqueued("table", 1);
      sink.on_enqueued("table", 3);
      sink.on_enqueued("table", 2);
      sink.on_drained(3);

      let snapshot = sink.snapshot();
      assert_eq!(snapshot.enqueued, 3);
      assert_eq!(snapshot.drained, 3);
      assert_eq!(snapshot.max_depth, 3);
   }

   #[test]
   fn test_snapshot_serializes() {
      let sink = CountingSink::new();
      sink.on_released("group");
      sink.on_release_failed("table", "code -1");

      let json = serde_json::to_value(sink.snapshot()).unwrap();
      assert_eq!(json["released"], 1);
      assert_eq!(json["failed"], 1);
   }
}
