//! Deferred release queue owned by a root

use std::collections::VecDeque;

/// Ordered collection of release requests awaiting a safe point.
///
/// The queue itself is not synchronized; the owning root guards it with the
/// same lock that guards its shutdown flag.
#[derive(Debug)]
pub struct PendingReleaseQueue<T> {
   items: VecDeque<T>,
}

impl<T> PendingReleaseQueue<T> {
   pub fn new() -> Self {
      Self {
         items: VecDeque::new(),
      }
   }

   /// Appends a request and returns the new depth.
   pub fn push(&mut self, item: T) -> usize {
      self.items.push_back(item);
      self.items.len()
   }

   /// Removes every queued request, returned in enqueue order.
   pub fn drain_all(&mut self) -> Vec<T> {
      self.items.drain(..).collect()
   }

   pub fn len(&self) -> usize {
      self.items.len()
   }

   pub fn is_empty(&self) -> bool {
      self.items.is_empty()
   }
}

impl<T> Default for PendingReleaseQueue<T> {
   fn default() -> Self {
      Self::new()
   }
}
