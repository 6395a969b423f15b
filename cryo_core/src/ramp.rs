//! Single-axis ramp: command a target, then poll until the axis converges.
//!
//! The controller is a small state machine:
//!
//! ```text
//! Idle ──begin──▶ Requested ──command──▶ Converging ──predicate──▶ Converged
//!   │                                        │
//!   └─ Blocked / RangeViolation              └─ cancel / deadline ─▶ Aborted
//! ```
//!
//! A failed interlock or range check leaves the controller in `Idle` and no
//! command reaches the transport. Each poll cycle sleeps one poll period on the
//! injected clock, then reads the value and the axis' stability predicate.

use cryo_traits::{AxisId, ModeParams, OperatingMode};

use crate::cancel::{ArmedWatchdog, Watchdog};
use crate::config::ControlCtx;
use crate::error::{CryoError, Result};
use crate::handle::SubsystemHandle;
use crate::interlock;

/// Target and rate for one ramp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampRequest {
    pub target: f64,
    /// Units per minute.
    pub rate: f64,
    /// ADR only.
    pub mode_params: Option<ModeParams>,
}

impl RampRequest {
    pub fn new(target: f64, rate: f64) -> Self {
        Self {
            target,
            rate,
            mode_params: None,
        }
    }

    pub fn with_mode_params(mut self, params: ModeParams) -> Self {
        self.mode_params = Some(params);
        self
    }

    pub fn validate(&self, axis: AxisId) -> Result<(), CryoError> {
        if !self.target.is_finite() {
            return Err(CryoError::InvalidRequest(format!(
                "target {} is not finite",
                self.target
            )));
        }
        if !(self.rate.is_finite() && self.rate > 0.0) {
            return Err(CryoError::InvalidRequest(format!(
                "rate {} must be finite and > 0",
                self.rate
            )));
        }
        if self.mode_params.is_some() && axis != AxisId::Adr {
            return Err(CryoError::InvalidRequest(format!(
                "mode parameters apply to adr only, not {axis}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampState {
    Idle,
    Requested,
    Converging,
    Converged,
    Aborted,
}

/// Result of one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum RampStatus {
    Converging,
    Converged,
    Aborted(CryoError),
}

/// Summary of a finished ramp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampOutcome {
    pub axis: AxisId,
    pub final_value: f64,
    pub polls: u64,
}

/// Whether `handle` reports it has settled on its setpoint.
///
/// The temperature stage needs both ramping flags; every other axis uses its
/// plain stability flag.
pub fn has_converged(handle: &SubsystemHandle) -> Result<bool, CryoError> {
    match handle.id() {
        AxisId::Temperature => {
            let info = handle.ramping_info()?;
            Ok(info.ramp_done && info.ready_to_ramp)
        }
        _ => handle.stable(),
    }
}

pub struct RampController<'a> {
    handle: &'a SubsystemHandle,
    request: RampRequest,
    mode: OperatingMode,
    ctx: &'a ControlCtx,
    watchdog: ArmedWatchdog,
    state: RampState,
    polls: u64,
    last_value: Option<f64>,
}

impl<'a> RampController<'a> {
    /// Arms the watchdog immediately; nothing is sent until [`begin`](Self::begin).
    pub fn new(
        handle: &'a SubsystemHandle,
        request: RampRequest,
        mode: OperatingMode,
        ctx: &'a ControlCtx,
        watchdog: &Watchdog,
    ) -> Self {
        Self::with_armed(handle, request, mode, ctx, watchdog.arm(ctx.clock.now()))
    }

    /// Share an already running deadline, e.g. a sweep's.
    pub(crate) fn with_armed(
        handle: &'a SubsystemHandle,
        request: RampRequest,
        mode: OperatingMode,
        ctx: &'a ControlCtx,
        watchdog: ArmedWatchdog,
    ) -> Self {
        Self {
            handle,
            request,
            mode,
            ctx,
            watchdog,
            state: RampState::Idle,
            polls: 0,
            last_value: None,
        }
    }

    pub fn state(&self) -> RampState {
        self.state
    }

    pub fn polls(&self) -> u64 {
        self.polls
    }

    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }

    /// Check the interlock and range, then send the ramp command.
    pub fn begin(&mut self) -> Result<()> {
        if self.state != RampState::Idle {
            return Err(CryoError::State(format!(
                "ramp on {} already started",
                self.handle.id()
            ))
            .into());
        }
        let axis = self.handle.id();
        self.request.validate(axis)?;
        interlock::guard(self.handle)?;
        if axis.is_thermal() {
            self.ctx.arbiter.check_range(self.request.target, self.mode)?;
        }
        self.state = RampState::Requested;
        self.handle
            .command(self.request.target, self.request.rate, self.request.mode_params)?;
        self.state = RampState::Converging;
        tracing::info!(
            %axis,
            target = self.request.target,
            rate = self.request.rate,
            mode = %self.mode,
            "ramp started"
        );
        Ok(())
    }

    /// Run one poll cycle.
    pub fn step(&mut self) -> Result<RampStatus> {
        match self.state {
            RampState::Converged => return Ok(RampStatus::Converged),
            RampState::Idle | RampState::Requested => {
                return Err(CryoError::State(format!(
                    "ramp on {} has not been commanded",
                    self.handle.id()
                ))
                .into());
            }
            RampState::Aborted => {
                return Err(CryoError::State(format!(
                    "ramp on {} was aborted",
                    self.handle.id()
                ))
                .into());
            }
            RampState::Converging => {}
        }

        let axis = self.handle.id();
        if let Err(e) = self.watchdog.check(&*self.ctx.clock, axis) {
            self.abort(&e);
            return Ok(RampStatus::Aborted(e));
        }

        self.ctx.clock.sleep(self.ctx.poll.ramp_period);
        self.polls += 1;
        let value = self.handle.current_value()?;
        self.last_value = Some(value);
        let done = has_converged(self.handle)?;
        tracing::trace!(%axis, poll = self.polls, value, done, "ramp poll");

        if done {
            self.state = RampState::Converged;
            tracing::info!(%axis, value, polls = self.polls, "ramp converged");
            Ok(RampStatus::Converged)
        } else {
            Ok(RampStatus::Converging)
        }
    }

    /// Begin (if needed) and poll until converged or aborted.
    pub fn run(mut self) -> Result<RampOutcome> {
        if self.state == RampState::Idle {
            self.begin()?;
        }
        loop {
            match self.step()? {
                RampStatus::Converging => {}
                RampStatus::Converged => {
                    return Ok(RampOutcome {
                        axis: self.handle.id(),
                        final_value: self.last_value.unwrap_or(self.request.target),
                        polls: self.polls,
                    });
                }
                RampStatus::Aborted(e) => return Err(e.into()),
            }
        }
    }

    fn abort(&mut self, why: &CryoError) {
        self.state = RampState::Aborted;
        tracing::error!(axis = %self.handle.id(), error = %why, "ramp aborted");
        if self.ctx.safety.stop_on_abort
            && let Err(e) = self.handle.interrupt()
        {
            tracing::warn!(axis = %self.handle.id(), error = %e, "best-effort stop failed");
        }
    }
}

/// Ramp `handle` to `request.target`, holding the axis' operation lock for
/// the whole ramp.
pub fn ramp(
    handle: &SubsystemHandle,
    request: RampRequest,
    mode: OperatingMode,
    ctx: &ControlCtx,
    watchdog: &Watchdog,
) -> Result<RampOutcome> {
    let _lease = handle.lease()?;
    RampController::new(handle, request, mode, ctx, watchdog).run()
}
