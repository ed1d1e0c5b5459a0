//! Readiness polling.
//!
//! Probes a service at a fixed interval up to a maximum number of attempts.
//! The wait is cancellable through the shared cancellation flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use modstack_common::context::Context;
use modstack_common::error::{ModstackError, Result};
use modstack_common::types::ContainerStatus;

const SLICE: Duration = Duration::from_millis(50);

/// Polling budget and cancellation flag.
#[derive(Debug, Clone)]
pub struct Readiness {
    interval: Duration,
    attempts: u32,
    cancelled: Arc<AtomicBool>,
}

impl Readiness {
    /// Budget taken from `ctx`.
    #[must_use]
    pub fn from_context(ctx: &Context) -> Self {
        Self::new(ctx.readiness_interval, ctx.readiness_attempts, ctx.cancel_flag())
    }

    /// Explicit budget.
    #[must_use]
    pub fn new(interval: Duration, attempts: u32, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            interval,
            attempts: attempts.max(1),
            cancelled,
        }
    }

    /// Waits until `probe` reports `running`.
    ///
    /// # Errors
    ///
    /// Returns [`ModstackError::ReadinessTimeout`] when the budget runs out
    /// and [`ModstackError::Cancelled`] on interruption.
    pub fn until_running(
        &self,
        service: &str,
        probe: impl FnMut() -> ContainerStatus,
    ) -> Result<()> {
        let _ = self.wait(service, probe, |s| s == ContainerStatus::Running)?;
        Ok(())
    }

    /// Waits until `probe` reports a state other than created or
    /// restarting, and returns it.
    ///
    /// # Errors
    ///
    /// See [`Readiness::until_running`].
    pub fn until_settled(
        &self,
        service: &str,
        probe: impl FnMut() -> ContainerStatus,
    ) -> Result<ContainerStatus> {
        self.wait(service, probe, |s| !s.is_transitioning())
    }

    fn wait(
        &self,
        service: &str,
        mut probe: impl FnMut() -> ContainerStatus,
        done: impl Fn(ContainerStatus) -> bool,
    ) -> Result<ContainerStatus> {
        let mut last = ContainerStatus::Unknown;
        for attempt in 1..=self.attempts {
            self.check_cancelled()?;
            last = probe();
            if done(last) {
                tracing::debug!(%service, state = %last, attempt, "service state reached");
                return Ok(last);
            }
            tracing::trace!(%service, state = %last, attempt, "waiting for service");
            if attempt < self.attempts {
                self.sleep()?;
            }
        }
        Err(ModstackError::ReadinessTimeout {
            service: service.to_string(),
            attempts: self.attempts,
            last_state: describe(last),
        })
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(ModstackError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn sleep(&self) -> Result<()> {
        let mut remaining = self.interval;
        while !remaining.is_zero() {
            self.check_cancelled()?;
            let step = remaining.min(SLICE);
            std::thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
        Ok(())
    }
}

/// Last-state wording for timeouts.
fn describe(status: ContainerStatus) -> String {
    match status {
        ContainerStatus::Unknown => "unknown (empty state, not necessarily failed)".to_string(),
        other => other.to_string(),
    }
}
