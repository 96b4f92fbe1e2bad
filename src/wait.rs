//! Explicit wait-for-condition primitives used by the page driver.
//!
//! Every suspension point in a browser session goes through
//! [`wait_until_with`]: poll a condition until it holds, the budget runs out,
//! or the run is interrupted. Callers decide what a timeout means.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Global flag for interrupt signaling, set by the Ctrl+C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Mark the current run as interrupted. Pending waits return `Cancelled`.
pub fn interrupt() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// The flag raised by [`interrupt`], for waits that should observe Ctrl+C.
pub fn interrupt_flag() -> &'static AtomicBool {
    &INTERRUPTED
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitOutcome {
    /// The condition held before the budget ran out.
    Satisfied,
    /// The budget ran out; the caller proceeds with whatever is present.
    TimedOut,
    /// The run was interrupted while waiting.
    Cancelled,
}

/// Polling budget for one wait.
#[derive(Debug, Clone, Copy)]
pub struct WaitBudget {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitBudget {
    pub fn from_millis(timeout_ms: u64, poll_interval_ms: u64) -> Self {
        Self {
            timeout: Duration::from_millis(timeout_ms),
            poll_interval: Duration::from_millis(poll_interval_ms.max(1)),
        }
    }
}

/// Poll `condition` until it returns true, the budget is exhausted or
/// `cancel` is raised. The condition is evaluated at least once.
pub fn wait_until_with<F>(budget: WaitBudget, cancel: &AtomicBool, mut condition: F) -> WaitOutcome
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + budget.timeout;
    loop {
        if cancel.load(Ordering::SeqCst) {
            return WaitOutcome::Cancelled;
        }
        if condition() {
            return WaitOutcome::Satisfied;
        }
        let now = Instant::now();
        if now >= deadline {
            return WaitOutcome::TimedOut;
        }
        std::thread::sleep(budget.poll_interval.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_satisfied_immediately() {
        let cancel = AtomicBool::new(false);
        let outcome = wait_until_with(WaitBudget::from_millis(50, 5), &cancel, || true);
        assert_eq!(outcome, WaitOutcome::Satisfied);
    }

    #[test]
    fn test_satisfied_after_polls() {
        let cancel = AtomicBool::new(false);
        let mut calls = 0;
        let outcome = wait_until_with(WaitBudget::from_millis(1_000, 1), &cancel, || {
            calls += 1;
            calls >= 3
        });
        assert_eq!(outcome, WaitOutcome::Satisfied);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_times_out() {
        let cancel = AtomicBool::new(false);
        let started = Instant::now();
        let outcome = wait_until_with(WaitBudget::from_millis(30, 5), &cancel, || false);
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_cancelled_before_condition() {
        let cancel = AtomicBool::new(true);
        let outcome = wait_until_with(WaitBudget::from_millis(1_000, 5), &cancel, || true);
        assert_eq!(outcome, WaitOutcome::Cancelled);
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let budget = WaitBudget::from_millis(10, 0);
        assert_eq!(budget.poll_interval, Duration::from_millis(1));
    }
}
