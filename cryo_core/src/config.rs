//! Runtime configuration for the coordination engine.
//!
//! These are the structs the engine reads while running. They are separate
//! from the TOML-deserialized config in `cryo_config`; see `conversions`.

use std::sync::Arc;
use std::time::Duration;

use cryo_traits::{Clock, MonotonicClock};

use crate::mode::ModeArbiter;

/// Poll cadences.
#[derive(Debug, Clone)]
pub struct PollCfg {
    /// Sleep between convergence checks while ramping. Default: 1 s.
    pub ramp_period: Duration,
    /// Sleep between reads while hunting value-grid points. Default: 100 ms.
    pub grid_period: Duration,
}

impl Default for PollCfg {
    fn default() -> Self {
        Self {
            ramp_period: Duration::from_millis(1000),
            grid_period: Duration::from_millis(100),
        }
    }
}

/// Deadlines and abort behavior.
#[derive(Debug, Clone)]
pub struct SafetyCfg {
    /// Default ramp deadline (None = unbounded).
    pub ramp_deadline: Option<Duration>,
    /// Default sweep deadline (None = unbounded).
    pub sweep_deadline: Option<Duration>,
    /// Issue a best-effort `stop()` when a ramp or sweep is cancelled or times out.
    pub stop_on_abort: bool,
}

impl Default for SafetyCfg {
    fn default() -> Self {
        Self {
            ramp_deadline: None,
            sweep_deadline: None,
            stop_on_abort: true,
        }
    }
}

/// Mode defaults for the facade.
#[derive(Debug, Clone, Copy)]
pub struct ControllerCfg {
    pub mode: cryo_traits::OperatingMode,
    pub continuous_floor_k: f64,
}

impl Default for ControllerCfg {
    fn default() -> Self {
        Self {
            mode: cryo_traits::OperatingMode::Continuous,
            continuous_floor_k: crate::mode::CONTINUOUS_FLOOR_K,
        }
    }
}

/// Everything a ramp or sweep needs besides the handle itself.
#[derive(Clone)]
pub struct ControlCtx {
    pub clock: Arc<dyn Clock + Send + Sync>,
    pub poll: PollCfg,
    pub safety: SafetyCfg,
    pub arbiter: ModeArbiter,
}

impl core::fmt::Debug for ControlCtx {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ControlCtx")
            .field("poll", &self.poll)
            .field("safety", &self.safety)
            .field("arbiter", &self.arbiter)
            .finish_non_exhaustive()
    }
}

impl Default for ControlCtx {
    fn default() -> Self {
        Self::new(Arc::new(MonotonicClock::new()))
    }
}

impl ControlCtx {
    pub fn new(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            clock,
            poll: PollCfg::default(),
            safety: SafetyCfg::default(),
            arbiter: ModeArbiter::default(),
        }
    }
}
