//! `From` implementations bridging `cryo_config` sections to `cryo_core` types.
//!
//! Name enums (`AxisName`, `ModeName`) convert in `cryo_config` itself.

use std::time::Duration;


use crate::config::{ControllerCfg, PollCfg, SafetyCfg};
use crate::error::CryoError;
use crate::sweep::{StepTrigger, SweepSpec};

fn deadline(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

// ── PollCfg ──────────────────────────────────────────────────────────────────

impl From<&cryo_config::PollCfg> for PollCfg {
    fn from(c: &cryo_config::PollCfg) -> Self {
        Self {
            ramp_period: Duration::from_millis(c.ramp_poll_ms),
            grid_period: Duration::from_millis(c.grid_poll_ms),
        }
    }
}

// ── SafetyCfg ────────────────────────────────────────────────────────────────

impl From<&cryo_config::Safety> for SafetyCfg {
    fn from(c: &cryo_config::Safety) -> Self {
        Self {
            ramp_deadline: deadline(c.ramp_deadline_ms),
            sweep_deadline: deadline(c.sweep_deadline_ms),
            stop_on_abort: c.stop_on_abort,
        }
    }
}

// ── ControllerCfg ────────────────────────────────────────────────────────────

impl From<&cryo_config::ControllerCfg> for ControllerCfg {
    fn from(c: &cryo_config::ControllerCfg) -> Self {
        Self {
            mode: c.mode.into(),
            continuous_floor_k: c.continuous_floor_k,
        }
    }
}

// ── SweepSpec ────────────────────────────────────────────────────────────────

impl TryFrom<&cryo_config::SweepRow> for SweepSpec {
    type Error = CryoError;

    /// Time-trigger intervals are in seconds.
    fn try_from(r: &cryo_config::SweepRow) -> Result<Self, Self::Error> {
        let trigger = match (r.trigger, r.tolerance) {
            (cryo_config::TriggerKind::Time, _) => StepTrigger::Time {
                every: Duration::try_from_secs_f64(r.interval).map_err(|e| {
                    CryoError::InvalidRequest(format!("interval {}: {e}", r.interval))
                })?,
            },
            (cryo_config::TriggerKind::Grid, Some(tolerance)) => StepTrigger::ValueGrid {
                interval: r.interval,
                tolerance,
            },
            (cryo_config::TriggerKind::Grid, None) => {
                return Err(CryoError::InvalidRequest(
                    "grid trigger requires a tolerance".into(),
                ));
            }
        };
        Ok(SweepSpec {
            start: r.start,
            end: r.end,
            rate: r.rate,
            trigger,
            overshoot: r.overshoot,
            mode_params: None,
        })
    }
}
