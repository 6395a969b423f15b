//! One addressable device over the five axes.
//!
//! The facade owns every [`SubsystemHandle`] and delegates to the ramp and
//! sweep engines; it keeps no control logic of its own beyond resolving the
//! operating mode and picking default watchdogs.

use std::sync::{Arc, Mutex};

use cryo_traits::{AuxChannel, AxisId, AxisTransport, Clock, ModeParams, OperatingMode};

use crate::cancel::{CancelToken, Watchdog};
use crate::config::{ControlCtx, ControllerCfg, PollCfg, SafetyCfg};
use crate::error::{BuildError, CryoError, Report, Result};
use crate::handle::{AxisStatus, SubsystemHandle};
use crate::mode::ModeArbiter;
use crate::ramp::{self, RampOutcome, RampRequest};
use crate::sweep::{self, Sweep, SweepSpec};

/// Mode plus one status row per axis, in registry order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerStatus {
    pub mode: OperatingMode,
    pub axes: Vec<AxisStatus>,
}

pub struct ControllerFacade {
    handles: [SubsystemHandle; 5],
    mode: Mutex<OperatingMode>,
    ctx: ControlCtx,
    cancel: CancelToken,
}

impl core::fmt::Debug for ControllerFacade {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ControllerFacade")
            .field("mode", &self.mode())
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl ControllerFacade {
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::default()
    }

    #[inline]
    pub fn handle(&self, axis: AxisId) -> &SubsystemHandle {
        &self.handles[axis.index()]
    }

    pub fn field(&self) -> &SubsystemHandle {
        self.handle(AxisId::Field)
    }

    pub fn temperature(&self) -> &SubsystemHandle {
        self.handle(AxisId::Temperature)
    }

    pub fn adr(&self) -> &SubsystemHandle {
        self.handle(AxisId::Adr)
    }

    pub fn heater(&self) -> &SubsystemHandle {
        self.handle(AxisId::Heater)
    }

    pub fn loader(&self) -> &SubsystemHandle {
        self.handle(AxisId::Loader)
    }

    pub fn ctx(&self) -> &ControlCtx {
        &self.ctx
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode.lock().map(|g| *g).unwrap_or_default()
    }

    pub fn set_mode(&self, mode: OperatingMode) -> Result<()> {
        let mut g = self
            .mode
            .lock()
            .map_err(|_| CryoError::State("mode lock poisoned".into()))?;
        if *g != mode {
            tracing::info!(from = %*g, to = %mode, "operating mode changed");
        }
        *g = mode;
        Ok(())
    }

    /// Token tripped by [`ControllerFacade::ramp`] and
    /// [`ControllerFacade::sweep`] watchdogs. Not reset automatically.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Watchdog with the shared cancel token and the configured ramp deadline.
    pub fn ramp_watchdog(&self) -> Watchdog {
        Watchdog {
            cancel: Some(self.cancel.clone()),
            deadline: self.ctx.safety.ramp_deadline,
        }
    }

    /// Watchdog with the shared cancel token and the configured sweep deadline.
    pub fn sweep_watchdog(&self) -> Watchdog {
        Watchdog {
            cancel: Some(self.cancel.clone()),
            deadline: self.ctx.safety.sweep_deadline,
        }
    }

    /// Ramp `axis` to `target` at `rate` units/min and wait for convergence.
    ///
    /// An explicit `mode` on the ADR axis is forwarded as mode parameters.
    pub fn ramp(
        &self,
        axis: AxisId,
        target: f64,
        rate: f64,
        mode: Option<OperatingMode>,
    ) -> Result<RampOutcome> {
        let mut request = RampRequest::new(target, rate);
        if axis == AxisId::Adr
            && let Some(m) = mode
        {
            request = request.with_mode_params(ModeParams {
                mode: m,
                ..ModeParams::default()
            });
        }
        self.ramp_with(axis, request, mode, &self.ramp_watchdog())
    }

    pub fn ramp_with(
        &self,
        axis: AxisId,
        request: RampRequest,
        mode: Option<OperatingMode>,
        watchdog: &Watchdog,
    ) -> Result<RampOutcome> {
        let requested = mode.or(request.mode_params.map(|p| p.mode));
        let resolved = self.ctx.arbiter.resolve_mode(requested, self.mode());
        let outcome = ramp::ramp(self.handle(axis), request, resolved, &self.ctx, watchdog)?;
        if let Some(p) = request.mode_params {
            self.set_mode(p.mode)?;
        }
        Ok(outcome)
    }

    /// Start a sweep using the current mode and the default sweep watchdog.
    pub fn sweep(
        &self,
        axis: AxisId,
        spec: SweepSpec,
        channels: Vec<Box<dyn AuxChannel>>,
    ) -> Result<Sweep<'_>> {
        self.sweep_with(axis, spec, channels, None, &self.sweep_watchdog())
    }

    pub fn sweep_with(
        &self,
        axis: AxisId,
        spec: SweepSpec,
        channels: Vec<Box<dyn AuxChannel>>,
        mode: Option<OperatingMode>,
        watchdog: &Watchdog,
    ) -> Result<Sweep<'_>> {
        let requested = mode.or(spec.mode_params.map(|p| p.mode));
        let resolved = self.ctx.arbiter.resolve_mode(requested, self.mode());
        let s = sweep::sweep(self.handle(axis), spec, channels, resolved, &self.ctx, watchdog)?;
        if let Some(p) = spec.mode_params {
            self.set_mode(p.mode)?;
        }
        Ok(s)
    }

    pub fn status(&self) -> Result<ControllerStatus> {
        let axes = self
            .handles
            .iter()
            .map(SubsystemHandle::status)
            .collect::<Result<Vec<_>, CryoError>>()?;
        Ok(ControllerStatus {
            mode: self.mode(),
            axes,
        })
    }

    /// Out-of-band stop; does not wait for the axis' operation lock.
    pub fn interrupt(&self, axis: AxisId) -> Result<()> {
        self.handle(axis).interrupt()?;
        Ok(())
    }
}

/// Collects one transport per axis plus runtime settings.
pub struct ControllerBuilder {
    transports: [Option<Box<dyn AxisTransport + Send>>; 5],
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    poll: PollCfg,
    safety: SafetyCfg,
    controller: ControllerCfg,
    cancel: Option<CancelToken>,
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self {
            transports: std::array::from_fn(|_| None),
            clock: None,
            poll: PollCfg::default(),
            safety: SafetyCfg::default(),
            controller: ControllerCfg::default(),
            cancel: None,
        }
    }
}

impl ControllerBuilder {
    pub fn with_axis(mut self, axis: AxisId, transport: impl AxisTransport + Send + 'static) -> Self {
        self.transports[axis.index()] = Some(Box::new(transport));
        self
    }

    pub fn with_boxed_axis(mut self, axis: AxisId, transport: Box<dyn AxisTransport + Send>) -> Self {
        self.transports[axis.index()] = Some(transport);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_poll(mut self, poll: PollCfg) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_safety(mut self, safety: SafetyCfg) -> Self {
        self.safety = safety;
        self
    }

    pub fn with_controller_cfg(mut self, controller: ControllerCfg) -> Self {
        self.controller = controller;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Apply the `[controller]`, `[poll]` and `[safety]` sections of a config.
    pub fn apply_config(self, cfg: &cryo_config::Config) -> Self {
        self.with_controller_cfg((&cfg.controller).into())
            .with_poll((&cfg.poll).into())
            .with_safety((&cfg.safety).into())
    }

    pub fn build(self) -> Result<ControllerFacade> {
        if self.poll.ramp_period.is_zero() || self.poll.grid_period.is_zero() {
            return Err(Report::new(BuildError::InvalidConfig(
                "poll periods must be > 0",
            )));
        }
        let floor = self.controller.continuous_floor_k;
        if !(floor.is_finite() && floor > 0.0) {
            return Err(Report::new(BuildError::InvalidConfig(
                "continuous floor must be finite and > 0",
            )));
        }

        let mut transports = self.transports;
        let mut built = Vec::with_capacity(AxisId::ALL.len());
        for axis in AxisId::ALL {
            let t = transports[axis.index()]
                .take()
                .ok_or(BuildError::MissingAxis(axis))?;
            built.push(SubsystemHandle::new(axis, t));
        }
        let handles: [SubsystemHandle; 5] = built
            .try_into()
            .map_err(|_| BuildError::InvalidConfig("axis registry must hold five axes"))?;

        let mut ctx = match self.clock {
            Some(c) => ControlCtx::new(c),
            None => ControlCtx::default(),
        };
        ctx.poll = self.poll;
        ctx.safety = self.safety;
        ctx.arbiter = ModeArbiter::with_floor(floor);

        tracing::debug!(mode = %self.controller.mode, floor, "controller built");
        Ok(ControllerFacade {
            handles,
            mode: Mutex::new(self.controller.mode),
            ctx,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}
