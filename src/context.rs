//! Per-request execution context shared by the router, workers and tools.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Context for one user turn, narrowed per routing cycle.
#[derive(Debug, Clone)]
pub struct CycleContext {
    /// Session the turn belongs to.
    pub session_id: String,
    /// Routing cycle index within the turn (0-based).
    pub cycle: u32,
    /// Hard deadline inherited from the originating request.
    pub deadline: Instant,
    /// When the turn started.
    pub started_at: DateTime<Utc>,
}

impl CycleContext {
    /// Create a context whose deadline is `timeout` from now.
    pub fn new(session_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            session_id: session_id.into(),
            cycle: 0,
            deadline: Instant::now() + timeout,
            started_at: Utc::now(),
        }
    }

    /// Same request, next cycle.
    pub fn for_cycle(&self, cycle: u32) -> Self {
        Self {
            cycle,
            ..self.clone()
        }
    }

    /// Deadline for a single external call: the per-call timeout, capped by
    /// the request deadline.
    pub fn call_deadline(&self, per_call: Duration) -> Instant {
        (Instant::now() + per_call).min(self.deadline)
    }

    /// Time left before the request deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn call_deadline_is_capped_by_request_deadline() {
        let ctx = CycleContext::new("s", Duration::from_millis(50));
        let capped = ctx.call_deadline(Duration::from_secs(60));
        assert_eq!(capped, ctx.deadline);
    }

    #[tokio::test]
    async fn call_deadline_uses_per_call_when_shorter() {
        let ctx = CycleContext::new("s", Duration::from_secs(60));
        let d = ctx.call_deadline(Duration::from_millis(10));
        assert!(d < ctx.deadline);
    }

    #[tokio::test]
    async fn for_cycle_keeps_deadline() {
        let ctx = CycleContext::new("s", Duration::from_secs(5));
        let next = ctx.for_cycle(3);
        assert_eq!(next.cycle, 3);
        assert_eq!(next.deadline, ctx.deadline);
        assert_eq!(next.session_id, "s");
    }

    #[tokio::test]
    async fn expires_after_timeout() {
        let ctx = CycleContext::new("s", Duration::from_millis(20));
        assert!(!ctx.is_expired());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(ctx.is_expired());
    }
}
