//! Hardware-facing traits shared by the coordination engine and its transports.
//!
//! Everything the core needs from a physical sub-controller goes through
//! [`AxisTransport`]; auxiliary measurement channels sampled during sweeps go
//! through [`AuxChannel`]. Errors cross these boundaries boxed so transports
//! stay free to use their own error types.

pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Error type used at every transport boundary.
pub type TransportResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Identity of one independently controllable physical quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AxisId {
    Field,
    Temperature,
    Adr,
    Heater,
    Loader,
}

impl AxisId {
    /// All axes in registry order.
    pub const ALL: [AxisId; 5] = [
        AxisId::Field,
        AxisId::Temperature,
        AxisId::Adr,
        AxisId::Heater,
        AxisId::Loader,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AxisId::Field => "field",
            AxisId::Temperature => "temperature",
            AxisId::Adr => "adr",
            AxisId::Heater => "heater",
            AxisId::Loader => "loader",
        }
    }

    /// Position of this axis in [`AxisId::ALL`].
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Axes whose targets are temperatures and therefore subject to the
    /// continuous-mode floor.
    pub fn is_thermal(self) -> bool {
        matches!(self, AxisId::Temperature | AxisId::Adr)
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AxisId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "field" => Ok(AxisId::Field),
            "temperature" | "temp" => Ok(AxisId::Temperature),
            "adr" => Ok(AxisId::Adr),
            "heater" => Ok(AxisId::Heater),
            "loader" => Ok(AxisId::Loader),
            other => Err(format!("unknown axis '{other}'")),
        }
    }
}

/// Ordered set of axes, used for blocking sets.
pub type AxisSet = BTreeSet<AxisId>;

/// Refrigeration regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperatingMode {
    /// Sustainable indefinitely; cannot reach below the physical floor.
    #[default]
    Continuous,
    /// Can reach below the floor but is not continuously sustainable.
    SingleShot,
}

impl OperatingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            OperatingMode::Continuous => "continuous",
            OperatingMode::SingleShot => "single-shot",
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continuous" | "cadr" => Ok(OperatingMode::Continuous),
            "single-shot" | "single_shot" | "singleshot" | "1-shot" => {
                Ok(OperatingMode::SingleShot)
            }
            other => Err(format!("unknown operating mode '{other}'")),
        }
    }
}

/// Extra parameters carried on an ADR ramp command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeParams {
    pub mode: OperatingMode,
    pub auto_regenerate: bool,
    pub pre_regenerate: bool,
}

/// Ramping flags reported by the continuous temperature stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RampingInfo {
    pub ramp_done: bool,
    pub ready_to_ramp: bool,
}

/// Minimal capability surface of one physical axis.
///
/// Reads are pulled fresh on every call; implementations must not cache
/// interlock state on behalf of the caller.
pub trait AxisTransport {
    fn read_value(&mut self) -> TransportResult<f64>;
    fn read_stable(&mut self) -> TransportResult<bool>;
    fn read_active(&mut self) -> TransportResult<bool>;
    /// Blocked flag and the set of axes causing it.
    fn read_blocked(&mut self) -> TransportResult<(bool, AxisSet)>;
    /// Fire-and-forget ramp command.
    fn start(
        &mut self,
        setpoint: f64,
        rate: f64,
        mode_params: Option<ModeParams>,
    ) -> TransportResult<()>;
    /// Immediate interrupt.
    fn stop(&mut self) -> TransportResult<()>;

    /// Only the temperature stage reports distinct flags; other axes fold
    /// their stability flag into both.
    fn read_ramping_info(&mut self) -> TransportResult<RampingInfo> {
        let stable = self.read_stable()?;
        Ok(RampingInfo {
            ramp_done: stable,
            ready_to_ramp: stable,
        })
    }
}

impl<T: AxisTransport + ?Sized> AxisTransport for Box<T> {
    fn read_value(&mut self) -> TransportResult<f64> {
        (**self).read_value()
    }
    fn read_stable(&mut self) -> TransportResult<bool> {
        (**self).read_stable()
    }
    fn read_active(&mut self) -> TransportResult<bool> {
        (**self).read_active()
    }
    fn read_blocked(&mut self) -> TransportResult<(bool, AxisSet)> {
        (**self).read_blocked()
    }
    fn start(
        &mut self,
        setpoint: f64,
        rate: f64,
        mode_params: Option<ModeParams>,
    ) -> TransportResult<()> {
        (**self).start(setpoint, rate, mode_params)
    }
    fn stop(&mut self) -> TransportResult<()> {
        (**self).stop()
    }
    fn read_ramping_info(&mut self) -> TransportResult<RampingInfo> {
        (**self).read_ramping_info()
    }
}

/// An auxiliary measurement channel read once per sweep sample.
pub trait AuxChannel {
    fn id(&self) -> &str;
    fn read(&mut self) -> TransportResult<f64>;
}

impl<T: AuxChannel + ?Sized> AuxChannel for Box<T> {
    fn id(&self) -> &str {
        (**self).id()
    }
    fn read(&mut self) -> TransportResult<f64> {
        (**self).read()
    }
}
