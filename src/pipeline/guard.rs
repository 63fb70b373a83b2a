//! At-most-one-in-flight flag for pipeline passes

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared busy flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    busy: Arc<AtomicBool>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the flag, or `None` if a pass already holds it
    pub fn try_acquire(&self) -> Option<InFlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard {
                busy: self.busy.clone(),
            })
    }
}

/// Held for the duration of one pass; releases the flag on drop, including
/// during unwinding.
#[derive(Debug)]
pub struct InFlightGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let flag = InFlight::new();
        let guard = flag.try_acquire();
        assert!(guard.is_some());
        assert!(flag.try_acquire().is_none());
        assert!(flag.clone().try_acquire().is_none());
    }

    #[test]
    fn test_drop_releases() {
        let flag = InFlight::new();
        drop(flag.try_acquire());
        assert!(flag.try_acquire().is_some());
    }

    #[test]
    fn test_panic_releases() {
        let flag = InFlight::new();
        let cloned = flag.clone();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = cloned.try_acquire().unwrap();
            panic!("stage blew up");
        }));

        assert!(result.is_err());
        assert!(flag.try_acquire().is_some());
    }
}
