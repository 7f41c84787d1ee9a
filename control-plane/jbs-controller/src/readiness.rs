//! Bounded polling until a condition holds.
//!
//! A [`ReadinessGate`] evaluates a predicate immediately, then once per poll
//! interval, until the predicate reports ready, the deadline elapses, or the
//! gate's cancellation token fires. Predicate errors are transient: they are
//! logged against the gate's span and the loop keeps going.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use crate::error::{BootstrapError, ClusterError, ReadinessTimeout, WaitCause};

/// Default retry cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default maximum wait.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(300);

/// Outcome of one predicate evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check<T> {
    Ready(T),
    NotReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateTiming {
    poll_interval: Duration,
    deadline: Duration,
}

impl GateTiming {
    /// Deadline must be strictly longer than a non-zero poll interval.
    pub fn new(
        poll_interval: Duration,
        deadline: Duration,
    ) -> Result<Self, BootstrapError> {
        if poll_interval.is_zero() {
            return Err(BootstrapError::Config(
                "poll interval must be greater than zero".into(),
            ));
        }
        if deadline <= poll_interval {
            return Err(BootstrapError::Config(format!(
                "deadline {:?} must exceed poll interval {:?}",
                deadline, poll_interval
            )));
        }
        Ok(Self {
            poll_interval,
            deadline,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

impl Default for GateTiming {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            deadline: DEFAULT_DEADLINE,
        }
    }
}

/// What to wait for, and how patiently.
pub struct ReadinessCondition<F> {
    pub description: String,
    pub timing: GateTiming,
    pub predicate: F,
}

impl<F> ReadinessCondition<F> {
    pub fn new<T, Fut>(
        description: impl Into<String>,
        timing: GateTiming,
        predicate: F,
    ) -> Self
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Check<T>, ClusterError>>,
    {
        Self {
            description: description.into(),
            timing,
            predicate,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReadinessGate {
    span: Span,
    cancel: CancellationToken,
}

impl ReadinessGate {
    pub fn new(span: Span, cancel: CancellationToken) -> Self {
        Self { span, cancel }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Poll `condition` until it is ready. Returns the value carried by the
    /// first `Check::Ready`, or a [`ReadinessTimeout`] once the deadline has
    /// elapsed or the gate is cancelled.
    pub async fn wait<T, F, Fut>(
        &self,
        condition: ReadinessCondition<F>,
    ) -> Result<T, ReadinessTimeout>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Check<T>, ClusterError>>,
    {
        let span = info_span!(
            parent: &self.span,
            "readiness_gate",
            what = %condition.description
        );
        self.poll(condition).instrument(span).await
    }

    async fn poll<T, F, Fut>(
        &self,
        condition: ReadinessCondition<F>,
    ) -> Result<T, ReadinessTimeout>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Check<T>, ClusterError>>,
    {
        let ReadinessCondition {
            description,
            timing,
            mut predicate,
        } = condition;
        let started = Instant::now();
        let deadline_at = started + timing.deadline;
        let mut attempts = 0u32;

        let give_up = |cause: WaitCause, attempts: u32| ReadinessTimeout {
            what: description.clone(),
            cause,
            elapsed: started.elapsed(),
            attempts,
        };

        loop {
            if self.cancel.is_cancelled() {
                return Err(give_up(WaitCause::Cancelled, attempts));
            }

            attempts += 1;
            // A lookup still in flight must not outlive the deadline or a
            // cancellation.
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(give_up(WaitCause::Cancelled, attempts));
                }
                outcome = predicate() => outcome,
                _ = tokio::time::sleep_until(deadline_at) => {
                    warn!(attempts, "readiness check still running at deadline");
                    return Err(give_up(WaitCause::DeadlineElapsed, attempts));
                }
            };
            match outcome {
                Ok(Check::Ready(value)) => {
                    info!(attempts, elapsed = ?started.elapsed(), "ready");
                    return Ok(value);
                }
                Ok(Check::NotReady) => debug!(attempts, "not ready yet"),
                Err(e) => {
                    warn!(attempts, error = %e, "readiness check failed, will retry")
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= timing.deadline {
                return Err(give_up(WaitCause::DeadlineElapsed, attempts));
            }
            let pause = timing.poll_interval.min(timing.deadline - elapsed);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(give_up(WaitCause::Cancelled, attempts));
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}
