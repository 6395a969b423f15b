//! Operating-mode arbitration and the continuous-mode temperature floor.

use cryo_traits::OperatingMode;

use crate::error::CryoError;

/// Lowest temperature (K) continuous mode can hold.
pub const CONTINUOUS_FLOOR_K: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeArbiter {
    floor_k: f64,
}

impl Default for ModeArbiter {
    fn default() -> Self {
        Self {
            floor_k: CONTINUOUS_FLOOR_K,
        }
    }
}

impl ModeArbiter {
    pub fn with_floor(floor_k: f64) -> Self {
        Self { floor_k }
    }

    pub fn floor_k(&self) -> f64 {
        self.floor_k
    }

    /// The requested mode if given, else the current one.
    pub fn resolve_mode(
        &self,
        requested: Option<OperatingMode>,
        current: OperatingMode,
    ) -> OperatingMode {
        requested.unwrap_or(current)
    }

    /// Reject targets continuous mode cannot reach. The floor itself is allowed.
    pub fn check_range(&self, target: f64, mode: OperatingMode) -> Result<(), CryoError> {
        if mode == OperatingMode::Continuous && target < self.floor_k {
            return Err(CryoError::RangeViolation {
                target,
                mode,
                floor: self.floor_k,
            });
        }
        Ok(())
    }
}

/// [`ModeArbiter::resolve_mode`] with the default floor.
pub fn resolve_mode(requested: Option<OperatingMode>, current: OperatingMode) -> OperatingMode {
    ModeArbiter::default().resolve_mode(requested, current)
}

/// [`ModeArbiter::check_range`] with the default floor.
pub fn check_range(target: f64, mode: OperatingMode) -> Result<(), CryoError> {
    ModeArbiter::default().check_range(target, mode)
}
