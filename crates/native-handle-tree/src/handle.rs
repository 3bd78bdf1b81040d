//! Opaque native handles and the destroy entry point

use std::fmt;

use crate::error::EngineError;

/// Opaque identifier for a native resource, as returned by an engine's
/// create entry points.
///
/// `NativeHandle::INVALID` is the "unattached" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(usize);

impl NativeHandle {
   pub const INVALID: NativeHandle = NativeHandle(0);

   pub const fn from_raw(raw: usize) -> Self {
      Self(raw)
   }

   pub const fn as_raw(self) -> usize {
      self.0
   }

   pub const fn is_invalid(self) -> bool {
      self.0 == 0
   }
}

impl fmt::Display for NativeHandle {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "{:#x}", self.0)
   }
}

/// The engine's destroy entry point for one kind of resource.
///
/// Called at most once per attached handle. Implementations report failure
/// through the returned error; the caller logs it and never retries.
pub trait Destructor: Send + Sync {
   fn destroy(&self, handle: NativeHandle) -> Result<(), EngineError>;
}

impl<F> Destructor for F
where
   F: Fn(NativeHandle) -> Result<(), EngineError> + Send + Sync,
{
   fn destroy(&self, handle: NativeHandle) -> Result<(), EngineError> {
      self(handle)
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_sentinel_is_invalid() {
      assert!(NativeHandle::INVALID.is_invalid());
      assert!(!NativeHandle::from_raw(7).is_invalid());
      assert_eq!(NativeHandle::from_raw(7).as_raw(), 7);
   }

   #[test]
   fn test_display_is_hex() {
      assert_eq!(NativeHandle::from_raw(255).to_string(), "0xff");
   }

   #[test]
   fn test_closure_is_destructor() {
      let destructor = |handle: NativeHandle| {
         if handle.as_raw() == 1 {
            Ok(())
         } else {
            Err(EngineError::new(-1, "unknown handle"))
         }
      };
      assert!(destructor.destroy(NativeHandle::from_raw(1)).is_ok());
      assert!(destructor.destroy(NativeHandle::from_raw(2)).is_err());
   }
}
