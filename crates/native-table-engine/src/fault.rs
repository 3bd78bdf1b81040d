//! Fault injection for exercising callers' failure paths.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::{EngineResult, injected};

/// Entry point at which a failure can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
   BeginRead,
   BeginWrite,
   Commit,
   Rollback,
   /// `destroy` returns [`crate::ERR_INJECTED`] and keeps the resource
   Destroy,
   /// `destroy` panics
   DestroyPanic,
}

#[derive(Debug, Default)]
pub(crate) struct FaultPlan {
   remaining: Mutex<HashMap<FaultPoint, u32>>,
}

impl FaultPlan {
   pub(crate) fn arm(&self, point: FaultPoint, times: u32) {
      let mut remaining = self.remaining.lock();
      if times == 0 {
         remaining.remove(&point);
      } else {
         remaining.insert(point, times);
      }
   }

   pub(crate) fn clear(&self) {
      self.remaining.lock().clear();
   }

   /// Consumes one armed failure for `point`, if any.
   pub(crate) fn trip(&self, point: FaultPoint) -> bool {
      let mut remaining = self.remaining.lock();
      match remaining.get_mut(&point) {
         Some(count) => {
            *count -= 1;
            if *count == 0 {
               remaining.remove(&point);
            }
            true
         }
         None => false,
      }
   }

   pub(crate) fn check(&self, point: FaultPoint) -> EngineResult<()> {
      if self.trip(point) {
         return Err(injected(point));
      }
      Ok(())
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_armed_fault_trips_requested_times() {
      let plan = FaultPlan::default();
      plan.arm(FaultPoint::Commit, 2);

      assert!(plan.check(FaultPoint::Commit).is_err());
      assert!(plan.check(FaultPoint::Rollback).is_ok());
      assert!(plan.check(FaultPoint::Commit).is_err());
      assert!(plan.check(FaultPoint::Commit).is_ok());
   }

   #[test]
   fn test_clear_disarms_everything() {
      let plan = FaultPlan::default();
      plan.arm(FaultPoint::BeginWrite, 5);
      plan.clear();
      assert!(!plan.trip(FaultPoint::BeginWrite));
   }
}
