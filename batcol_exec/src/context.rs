//! Cooperative timeout and cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ErrorKind, ExecError, ExecResult};

/// Rows processed between two deadline checks.
pub const DEFAULT_CHECK_STEP: usize = 1 << 14;

/// Per-query execution context shared by every operator of the query.
#[derive(Debug, Clone)]
pub struct QueryContext {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
    check_step: usize,
}

/// Handle that requests cancellation of a running query from another thread.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Ask the query to stop at its next check.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
}

impl Default for QueryContext {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl QueryContext {
    /// No deadline.
    pub fn unbounded() -> Self {
        Self { deadline: None, cancelled: Arc::new(AtomicBool::new(false)), check_step: DEFAULT_CHECK_STEP }
    }

    /// Deadline `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::unbounded().deadline(Instant::now() + timeout)
    }

    /// Set an absolute deadline.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Override the check interval; 0 is treated as 1.
    pub fn check_step(mut self, rows: usize) -> Self {
        self.check_step = rows.max(1);
        self
    }

    /// Rows between checks.
    pub fn step(&self) -> usize {
        self.check_step
    }

    /// Handle for cancelling this query.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancelled))
    }

    /// Fail when the query was cancelled or ran past its deadline.
    pub fn check(&self, operator: &'static str) -> ExecResult<()> {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(ExecError::new(ErrorKind::Cancelled, operator, "Query aborted"));
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Err(ExecError::new(ErrorKind::Timeout, operator, "Query aborted due to timeout"))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_deadline_and_cancel() {
        let ctx = QueryContext::unbounded();
        assert!(ctx.check("op").is_ok());
        assert_eq!(ctx.step(), DEFAULT_CHECK_STEP);

        let expired = QueryContext::unbounded().deadline(Instant::now());
        let err = expired.check("op").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(err.to_string(), "op:HYT00!Query aborted due to timeout");

        let ctx = QueryContext::with_timeout(Duration::from_secs(3600)).check_step(0);
        assert_eq!(ctx.step(), 1);
        ctx.cancel_handle().cancel();
        assert_eq!(ctx.check("op").unwrap_err().kind, ErrorKind::Cancelled);
    }
}
