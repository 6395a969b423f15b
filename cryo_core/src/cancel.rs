//! Cooperative cancellation and deadlines for poll loops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use cryo_traits::{AxisId, Clock};

use crate::error::{CryoError, UnresponsiveReason};

/// Shared cancel flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Clear the flag so the token can guard the next operation.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Cancel token plus optional deadline, checked once per poll cycle.
#[derive(Debug, Clone, Default)]
pub struct Watchdog {
    pub cancel: Option<CancelToken>,
    pub deadline: Option<Duration>,
}

impl Watchdog {
    /// A watchdog that never trips.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Start the deadline clock.
    pub fn arm(&self, now: Instant) -> ArmedWatchdog {
        ArmedWatchdog {
            cancel: self.cancel.clone(),
            deadline: self.deadline,
            epoch: now,
        }
    }
}

/// A [`Watchdog`] whose deadline is counting.
#[derive(Debug, Clone)]
pub struct ArmedWatchdog {
    cancel: Option<CancelToken>,
    deadline: Option<Duration>,
    epoch: Instant,
}

impl ArmedWatchdog {
    /// Returns `HardwareUnresponsive` once cancelled or past the deadline.
    pub fn check(&self, clock: &dyn Clock, axis: AxisId) -> Result<(), CryoError> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(CryoError::HardwareUnresponsive {
                axis,
                reason: UnresponsiveReason::Cancelled,
            });
        }
        if let Some(limit) = self.deadline {
            let limit_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
            if clock.ms_since(self.epoch) >= limit_ms {
                return Err(CryoError::HardwareUnresponsive {
                    axis,
                    reason: UnresponsiveReason::DeadlineExceeded {
                        deadline_ms: limit_ms,
                    },
                });
            }
        }
        Ok(())
    }
}
