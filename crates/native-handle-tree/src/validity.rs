//! Cheap staleness checks for cursors derived from mutable resources

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::{Error, Result};

/// Monotonic counter owned by a collection-like resource.
///
/// Bumped on every mutation that can invalidate position-based references
/// (insert, delete, clear, reshape). Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct StructuralVersion(Arc<AtomicU64>);

impl StructuralVersion {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn starting_at(version: u64) -> Self {
      Self(Arc::new(AtomicU64::new(version)))
   }

   pub fn current(&self) -> u64 {
      self.0.load(Ordering::Acquire)
   }

   /// Records a structural mutation and returns the new version.
   pub fn bump(&self) -> u64 {
      self.0.fetch_add(1, Ordering::AcqRel) + 1
   }

   /// A new, unshared counter holding the current value. Used when the owning
   /// resource is copied and the copy evolves independently.
   pub fn detached_copy(&self) -> Self {
      Self::starting_at(self.current())
   }

   pub fn shares_counter_with(&self, other: &StructuralVersion) -> bool {
      Arc::ptr_eq(&self.0, &other.0)
   }

   /// Captures the current version for a cursor.
   pub fn stamp(&self) -> VersionStamp {
      VersionStamp {
         seen: self.current(),
         source: self.clone(),
      }
   }
}

/// The version a cursor saw when it was created or last refreshed.
#[derive(Debug, Clone)]
pub struct VersionStamp {
   source: StructuralVersion,
   seen: u64,
}

impl VersionStamp {
   pub fn seen(&self) -> u64 {
      self.seen
   }

   pub fn is_current(&self) -> bool {
      self.source.current() == self.seen
   }

   /// Fails with [`Error::Stale`] when the source has changed shape since
   /// the stamp was taken. Must run before every access.
   pub fn check(&self) -> Result<()> {
      let current = self.source.current();
      if current != self.seen {
         return Err(Error::Stale {
            seen: self.seen,
            current,
         });
      }
      Ok(())
   }

   pub fn refresh(&mut self) {
      self.seen = self.source.current();
   }
}

/// Flag shared between an owning scope and the accessors acquired inside it.
#[derive(Debug, Clone)]
pub struct Liveness {
   live: Arc<AtomicBool>,
   label: &'static str,
}

impl Liveness {
   pub fn new(label: &'static str) -> Self {
      Self {
         live: Arc::new(AtomicBool::new(true)),
         label,
      }
   }

   pub fn is_live(&self) -> bool {
      self.live.load(Ordering::Acquire)
   }

   /// Ends the scope. Returns whether it was still live.
   pub fn end(&self) -> bool {
      self.live.swap(false, Ordering::AcqRel)
   }

   pub fn check(&self) -> Result<()> {
      if !self.is_live() {
         return Err(Error::ScopeEnded { label: self.label });
      }
      Ok(())
   }
}
