//! Simulated cryostat backend.
//!
//! All five axes share one state behind a mutex so interlocks can be derived
//! from sibling activity. Physics is a plain slew toward the commanded
//! setpoint at the commanded rate (units per minute), advanced lazily on
//! every read against the injected clock. `time_scale` speeds simulated time
//! up relative to the clock so CLI runs finish quickly.
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use cryo_traits::{
    AuxChannel, AxisId, AxisSet, AxisTransport, Clock, ModeParams, RampingInfo, TransportResult,
};

use crate::error::{Result, TransportError};

/// Per-axis simulation parameters.
#[derive(Debug, Clone)]
pub struct SimAxisCfg {
    pub initial: f64,
    pub min: f64,
    pub max: f64,
    /// Axis stays active after reaching its setpoint until stopped.
    pub holds: bool,
    /// Axis starts out active, as if left engaged by an earlier session.
    pub active: bool,
}

impl SimAxisCfg {
    pub fn defaults_for(axis: AxisId) -> Self {
        match axis {
            AxisId::Field => Self {
                initial: 0.0,
                min: -9.0,
                max: 9.0,
                holds: false,
                active: false,
            },
            AxisId::Temperature => Self {
                initial: 4.0,
                min: 0.1,
                max: 300.0,
                holds: true,
                active: false,
            },
            AxisId::Adr => Self {
                initial: 4.0,
                min: 0.05,
                max: 10.0,
                holds: true,
                active: false,
            },
            AxisId::Heater => Self {
                initial: 0.0,
                min: 0.0,
                max: 100.0,
                holds: true,
                active: false,
            },
            AxisId::Loader => Self {
                initial: 0.0,
                min: 0.0,
                max: 1.0,
                holds: false,
                active: false,
            },
        }
    }
}

/// `axis` reports blocked while any of `while_active` is active.
#[derive(Debug, Clone)]
pub struct Interlock {
    pub axis: AxisId,
    pub while_active: Vec<AxisId>,
}

#[derive(Debug, Clone)]
pub struct SimCfg {
    /// Simulated seconds per clock second.
    pub time_scale: f64,
    /// Simulated time an axis must sit on its setpoint before reporting stable.
    pub settle: Duration,
    /// Indexed by `AxisId::index()`.
    pub axes: [SimAxisCfg; 5],
    pub interlocks: Vec<Interlock>,
    /// Every read fails with a timeout (fault injection for tests).
    pub fail_reads: bool,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            settle: Duration::from_secs(2),
            axes: AxisId::ALL.map(SimAxisCfg::defaults_for),
            interlocks: default_interlocks(),
            fail_reads: false,
        }
    }
}

/// Field and ADR share the magnet; the loader needs every cold stage idle.
pub fn default_interlocks() -> Vec<Interlock> {
    vec![
        Interlock {
            axis: AxisId::Field,
            while_active: vec![AxisId::Adr],
        },
        Interlock {
            axis: AxisId::Adr,
            while_active: vec![AxisId::Field, AxisId::Temperature],
        },
        Interlock {
            axis: AxisId::Temperature,
            while_active: vec![AxisId::Adr],
        },
        Interlock {
            axis: AxisId::Loader,
            while_active: vec![AxisId::Temperature, AxisId::Adr, AxisId::Heater],
        },
    ]
}

/// A command received by a simulated axis.
#[derive(Debug, Clone, PartialEq)]
pub enum SimCommand {
    Start {
        setpoint: f64,
        rate: f64,
        mode_params: Option<ModeParams>,
    },
    Stop,
}

#[derive(Debug)]
struct AxisState {
    value: f64,
    setpoint: f64,
    rate_per_min: f64,
    active: bool,
    /// Simulated instant at which the value landed on the setpoint.
    reached_at: Option<Duration>,
    commands: Vec<SimCommand>,
}

#[derive(Debug)]
struct SimState {
    cfg: SimCfg,
    axes: [AxisState; 5],
    /// Simulated time already applied to axis values.
    sim_now: Duration,
    last_tick: Instant,
}

impl SimState {
    fn advance(&mut self, now: Instant) {
        let real = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        let dt = real.mul_f64(self.cfg.time_scale.max(0.0));
        let t0 = self.sim_now;
        self.sim_now += dt;
        for (i, st) in self.axes.iter_mut().enumerate() {
            if st.reached_at.is_some() || st.rate_per_min <= 0.0 {
                continue;
            }
            let gap = st.setpoint - st.value;
            let step = st.rate_per_min * dt.as_secs_f64() / 60.0;
            if gap.abs() <= step {
                // Interpolate the landing instant inside this tick.
                let frac = if step > 0.0 { gap.abs() / step } else { 0.0 };
                st.value = st.setpoint;
                st.reached_at = Some(t0 + dt.mul_f64(frac));
                if !self.cfg.axes[i].holds {
                    st.active = false;
                }
            } else {
                st.value += step.copysign(gap);
            }
        }
    }

    fn settled(&self, axis: AxisId) -> bool {
        self.axes[axis.index()]
            .reached_at
            .is_some_and(|t| self.sim_now.saturating_sub(t) >= self.cfg.settle)
    }

    fn blocked_by(&self, axis: AxisId) -> AxisSet {
        self.cfg
            .interlocks
            .iter()
            .filter(|il| il.axis == axis)
            .flat_map(|il| il.while_active.iter().copied())
            .filter(|other| *other != axis && self.axes[other.index()].active)
            .collect()
    }
}

/// Shared simulated cryostat; hand out per-axis transports with [`axis`].
///
/// [`axis`]: SimulatedCryostat::axis
#[derive(Clone)]
pub struct SimulatedCryostat {
    state: Arc<Mutex<SimState>>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl core::fmt::Debug for SimulatedCryostat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimulatedCryostat").finish_non_exhaustive()
    }
}

impl SimulatedCryostat {
    pub fn new(cfg: SimCfg, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let axes = AxisId::ALL.map(|a| {
            let ax = &cfg.axes[a.index()];
            AxisState {
                value: ax.initial,
                setpoint: ax.initial,
                rate_per_min: 0.0,
                active: ax.active,
                reached_at: Some(Duration::ZERO),
                commands: Vec::new(),
            }
        });
        let last_tick = clock.now();
        // Start fully settled so a fresh simulator reports stable axes.
        let sim_now = cfg.settle;
        Self {
            state: Arc::new(Mutex::new(SimState {
                cfg,
                axes,
                sim_now,
                last_tick,
            })),
            clock,
        }
    }

    /// Transport for one axis.
    pub fn axis(&self, id: AxisId) -> SimulatedAxis {
        SimulatedAxis {
            id,
            sim: self.clone(),
        }
    }

    /// Auxiliary channel reading `gain * value(source) + offset`.
    pub fn channel(
        &self,
        id: impl Into<String>,
        source: AxisId,
        gain: f64,
        offset: f64,
    ) -> SimulatedChannel {
        SimulatedChannel {
            id: id.into(),
            source,
            gain,
            offset,
            sim: self.clone(),
        }
    }

    /// Commands received by `axis`, oldest first.
    pub fn commands(&self, axis: AxisId) -> Vec<SimCommand> {
        self.lock()
            .map(|st| st.axes[axis.index()].commands.clone())
            .unwrap_or_default()
    }

    /// Force an axis' activity flag, e.g. to set up an interlock scenario.
    pub fn set_active(&self, axis: AxisId, active: bool) -> Result<()> {
        let mut st = self.lock()?;
        st.axes[axis.index()].active = active;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, SimState>> {
        self.state.lock().map_err(|_| TransportError::Poisoned)
    }

    /// Lock and bring simulated time up to the clock.
    fn ticked(&self, axis: AxisId) -> Result<MutexGuard<'_, SimState>> {
        let mut st = self.lock()?;
        if st.cfg.fail_reads {
            return Err(TransportError::Timeout(axis));
        }
        st.advance(self.clock.now());
        Ok(st)
    }
}

/// Per-axis transport backed by a [`SimulatedCryostat`].
#[derive(Debug, Clone)]
pub struct SimulatedAxis {
    id: AxisId,
    sim: SimulatedCryostat,
}

impl SimulatedAxis {
    pub fn id(&self) -> AxisId {
        self.id
    }
}

impl AxisTransport for SimulatedAxis {
    fn read_value(&mut self) -> TransportResult<f64> {
        let st = self.sim.ticked(self.id)?;
        Ok(st.axes[self.id.index()].value)
    }

    fn read_stable(&mut self) -> TransportResult<bool> {
        let st = self.sim.ticked(self.id)?;
        Ok(st.settled(self.id))
    }

    fn read_active(&mut self) -> TransportResult<bool> {
        let st = self.sim.ticked(self.id)?;
        Ok(st.axes[self.id.index()].active)
    }

    fn read_blocked(&mut self) -> TransportResult<(bool, AxisSet)> {
        let st = self.sim.ticked(self.id)?;
        let by = st.blocked_by(self.id);
        Ok((!by.is_empty(), by))
    }

    fn read_ramping_info(&mut self) -> TransportResult<RampingInfo> {
        let st = self.sim.ticked(self.id)?;
        let ramp_done = st.axes[self.id.index()].reached_at.is_some();
        Ok(RampingInfo {
            ramp_done,
            ready_to_ramp: ramp_done && st.settled(self.id),
        })
    }

    fn start(
        &mut self,
        setpoint: f64,
        rate: f64,
        mode_params: Option<ModeParams>,
    ) -> TransportResult<()> {
        let mut st = self.sim.ticked(self.id)?;
        let limits = st.cfg.axes[self.id.index()].clone();
        if !setpoint.is_finite() || setpoint < limits.min || setpoint > limits.max {
            return Err(Box::new(TransportError::OutOfRange {
                axis: self.id,
                setpoint,
                min: limits.min,
                max: limits.max,
            }));
        }
        if !(rate.is_finite() && rate > 0.0) {
            return Err(Box::new(TransportError::Rejected {
                axis: self.id,
                reason: format!("rate {rate} must be > 0"),
            }));
        }
        let ax = &mut st.axes[self.id.index()];
        ax.commands.push(SimCommand::Start {
            setpoint,
            rate,
            mode_params,
        });
        ax.setpoint = setpoint;
        ax.rate_per_min = rate;
        ax.active = true;
        ax.reached_at = None;
        tracing::debug!(axis = %self.id, setpoint, rate, "sim ramp start");
        Ok(())
    }

    fn stop(&mut self) -> TransportResult<()> {
        let mut st = self.sim.lock()?;
        st.advance(self.sim.clock.now());
        let now = st.sim_now;
        let ax = &mut st.axes[self.id.index()];
        ax.commands.push(SimCommand::Stop);
        ax.setpoint = ax.value;
        ax.active = false;
        ax.reached_at = Some(now);
        tracing::debug!(axis = %self.id, value = ax.value, "sim stop");
        Ok(())
    }
}

/// Linear auxiliary channel over one simulated axis.
#[derive(Debug, Clone)]
pub struct SimulatedChannel {
    id: String,
    source: AxisId,
    gain: f64,
    offset: f64,
    sim: SimulatedCryostat,
}

impl AuxChannel for SimulatedChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn read(&mut self) -> TransportResult<f64> {
        let st = self.sim.ticked(self.source)?;
        Ok(self.gain * st.axes[self.source.index()].value + self.offset)
    }
}
