//! Deadline and cancellation for an attribution run

use super::AttributionError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared flag that aborts a running attribution
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Time and cancellation limits, checked between explained rows
#[derive(Debug, Clone, Default)]
pub struct AttributionBudget {
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    cancel: Option<CancelToken>,
}

impl AttributionBudget {
    /// No deadline, not cancellable
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Deadline `timeout` from now
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// The same limits with the deadline counted from now
    pub fn restarted(&self) -> Self {
        Self {
            timeout: self.timeout,
            deadline: self.timeout.map(|t| Instant::now() + t),
            cancel: self.cancel.clone(),
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn check(&self) -> Result<(), AttributionError> {
        if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(AttributionError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(AttributionError::Timeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_passes() {
        assert!(AttributionBudget::unbounded().check().is_ok());
    }

    #[test]
    fn test_zero_timeout_expires() {
        let budget = AttributionBudget::unbounded().with_timeout(Duration::ZERO);
        assert!(matches!(budget.check(), Err(AttributionError::Timeout)));
    }

    #[test]
    fn test_cancel_is_shared() {
        let token = CancelToken::new();
        let budget = AttributionBudget::unbounded().with_cancel(token.clone());
        assert!(budget.check().is_ok());
        token.cancel();
        assert!(matches!(budget.check(), Err(AttributionError::Cancelled)));
    }

    #[test]
    fn test_restart_counts_from_now() {
        let budget = AttributionBudget::unbounded().with_timeout(Duration::from_millis(50));
        std::thread::sleep(Duration::from_millis(80));
        assert!(matches!(budget.check(), Err(AttributionError::Timeout)));

        let restarted = budget.restarted();
        assert!(restarted.check().is_ok());
        assert_eq!(restarted.timeout(), Some(Duration::from_millis(50)));
        assert!(AttributionBudget::unbounded().restarted().deadline().is_none());
    }

    #[test]
    fn test_restart_keeps_cancel() {
        let token = CancelToken::new();
        let budget = AttributionBudget::unbounded().with_cancel(token.clone());
        token.cancel();
        assert!(matches!(budget.restarted().check(), Err(AttributionError::Cancelled)));
    }
}
