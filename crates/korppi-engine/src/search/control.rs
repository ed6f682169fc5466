//! Cooperative interruption: the running flag, the search deadline and
//! the periodic checkup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::score::ONE_PLY;

/// Recursion frames call checkup once per this many nodes.
pub(crate) const NODES_PER_CHECKUP: u64 = 1024;

/// Shared cancellation and deadline state for one search invocation.
///
/// The search itself is single-threaded; the only cross-thread traffic
/// is the running flag, which outside parties may flip from true to
/// false. Every recursive frame observes it within one checkup interval
/// or one recursive return.
pub(crate) struct SearchControl {
    running: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl SearchControl {
    pub(crate) fn new(running: Arc<AtomicBool>, deadline: Option<Instant>) -> SearchControl {
        SearchControl { running, deadline }
    }

    #[inline]
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub(crate) fn halt(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Deadline check. The first iteration is never cut short: a search
    /// must produce at least one completed ply before the deadline may
    /// stop it.
    pub(crate) fn checkup(&self, current_max_depth: i32) {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline && current_max_depth > ONE_PLY {
                self.halt();
            }
        }
    }
}

/// A cloneable handle that can cancel a running search from another
/// thread. The flag only ever transitions from true to false.
#[derive(Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    pub(crate) fn new(running: Arc<AtomicBool>) -> StopHandle {
        StopHandle { running }
    }

    /// Request cooperative cancellation of the search in flight.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn running_flag_roundtrip() {
        let flag = Arc::new(AtomicBool::new(true));
        let control = SearchControl::new(Arc::clone(&flag), None);
        assert!(control.is_running());
        control.halt();
        assert!(!control.is_running());
    }

    #[test]
    fn stop_handle_flips_shared_flag() {
        let flag = Arc::new(AtomicBool::new(true));
        let control = SearchControl::new(Arc::clone(&flag), None);
        let handle = StopHandle::new(flag);
        handle.clone().stop();
        assert!(!control.is_running());
    }

    #[test]
    fn checkup_without_deadline_never_halts() {
        let flag = Arc::new(AtomicBool::new(true));
        let control = SearchControl::new(flag, None);
        control.checkup(100 * ONE_PLY);
        assert!(control.is_running());
    }

    #[test]
    fn expired_deadline_halts_after_first_ply() {
        let flag = Arc::new(AtomicBool::new(true));
        let deadline = Instant::now() - Duration::from_millis(1);
        let control = SearchControl::new(flag, Some(deadline));

        // Still inside the first iteration: keep running.
        control.checkup(ONE_PLY);
        assert!(control.is_running());

        control.checkup(2 * ONE_PLY);
        assert!(!control.is_running());
    }
}
