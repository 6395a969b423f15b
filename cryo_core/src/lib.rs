#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Coordination engine for cryostat sub-controllers (hardware-agnostic).
//!
//! All hardware interaction goes through `cryo_traits::AxisTransport` and
//! `cryo_traits::AuxChannel`.
//!
//! ## Architecture
//!
//! - **Handles**: read-through proxies with a per-axis operation lock (`handle`)
//! - **Interlocks**: blocked-axis check before any command (`interlock`)
//! - **Mode**: continuous/single-shot arbitration and the 0.3 K floor (`mode`)
//! - **Ramp**: command then poll until the axis' stability predicate holds (`ramp`)
//! - **Sweep**: lazy start→end sampling on a time cadence or value grid (`sweep`)
//! - **Facade**: the five named control points and `status()` (`facade`)
//!
//! Every suspension goes through the injected `Clock`; every poll loop checks
//! a [`cancel::Watchdog`] once per cycle.

pub mod cancel;
pub mod config;
pub mod conversions;
pub mod error;
pub mod facade;
pub mod handle;
pub mod hw_error;
pub mod interlock;
pub mod mocks;
pub mod mode;
pub mod ramp;
pub mod sweep;
pub mod util;

pub use cancel::{CancelToken, Watchdog};
pub use config::{ControlCtx, ControllerCfg, PollCfg, SafetyCfg};
pub use error::{BuildError, CryoError, Report, Result, UnresponsiveReason};
pub use facade::{ControllerBuilder, ControllerFacade, ControllerStatus};
pub use handle::{AxisActivity, AxisSnapshot, AxisStatus, SubsystemHandle};
pub use interlock::guard;
pub use mode::{CONTINUOUS_FLOOR_K, ModeArbiter, check_range, resolve_mode};
pub use ramp::{RampController, RampOutcome, RampRequest, RampState, RampStatus, ramp};
pub use sweep::{
    MAX_GRID_POINTS, MeasuredSample, StepTrigger, Sweep, SweepEnd, SweepReport, SweepSpec,
    grid_points, sweep,
};

pub use cryo_traits::{AxisId, AxisSet, ModeParams, OperatingMode};
