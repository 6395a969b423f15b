#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and sweep-plan parsing for the cryostat controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Sweep plans are loaded from a strict-header CSV; every row is checked
//!   before any of them is handed to the engine.
use cryo_traits::{AxisId, OperatingMode};
use serde::Deserialize;

/// Axis names as they appear in TOML and CSV.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AxisName {
    Field,
    Temperature,
    Adr,
    Heater,
    Loader,
}

impl AxisName {
    pub fn as_str(self) -> &'static str {
        match self {
            AxisName::Field => "field",
            AxisName::Temperature => "temperature",
            AxisName::Adr => "adr",
            AxisName::Heater => "heater",
            AxisName::Loader => "loader",
        }
    }
}

impl From<AxisName> for AxisId {
    fn from(a: AxisName) -> Self {
        match a {
            AxisName::Field => AxisId::Field,
            AxisName::Temperature => AxisId::Temperature,
            AxisName::Adr => AxisId::Adr,
            AxisName::Heater => AxisId::Heater,
            AxisName::Loader => AxisId::Loader,
        }
    }
}

impl From<AxisId> for AxisName {
    fn from(a: AxisId) -> Self {
        match a {
            AxisId::Field => AxisName::Field,
            AxisId::Temperature => AxisName::Temperature,
            AxisId::Adr => AxisName::Adr,
            AxisId::Heater => AxisName::Heater,
            AxisId::Loader => AxisName::Loader,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ModeName {
    #[default]
    Continuous,
    #[serde(alias = "single_shot")]
    SingleShot,
}

impl From<ModeName> for OperatingMode {
    fn from(m: ModeName) -> Self {
        match m {
            ModeName::Continuous => OperatingMode::Continuous,
            ModeName::SingleShot => OperatingMode::SingleShot,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControllerCfg {
    /// Operating mode assumed until a ramp requests another one.
    pub mode: ModeName,
    /// Lowest temperature reachable in continuous mode (K).
    pub continuous_floor_k: f64,
}

impl Default for ControllerCfg {
    fn default() -> Self {
        Self {
            mode: ModeName::Continuous,
            continuous_floor_k: 0.3,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PollCfg {
    /// Convergence poll period while ramping (ms).
    pub ramp_poll_ms: u64,
    /// Tight poll period while waiting for a grid point (ms).
    pub grid_poll_ms: u64,
}

impl Default for PollCfg {
    fn default() -> Self {
        Self {
            ramp_poll_ms: 1000,
            grid_poll_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Safety {
    /// Give up on a ramp after this many ms (0 disables).
    pub ramp_deadline_ms: u64,
    /// Give up on a sweep after this many ms (0 disables).
    pub sweep_deadline_ms: u64,
    /// Send a stop to the axis when a ramp or sweep is cancelled or times out.
    pub stop_on_abort: bool,
}

impl Default for Safety {
    fn default() -> Self {
        Self {
            ramp_deadline_ms: 0,
            sweep_deadline_ms: 0,
            stop_on_abort: true,
        }
    }
}

/// Default ramp rates (units per minute) used when a command omits one.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Rates {
    pub field: f64,
    pub temperature: f64,
    pub adr: f64,
    pub heater: f64,
    pub loader: f64,
}

impl Default for Rates {
    fn default() -> Self {
        Self {
            field: 0.1,
            temperature: 0.5,
            adr: 0.1,
            heater: 1.0,
            loader: 0.5,
        }
    }
}

impl Rates {
    pub fn for_axis(&self, axis: AxisName) -> f64 {
        match axis {
            AxisName::Field => self.field,
            AxisName::Temperature => self.temperature,
            AxisName::Adr => self.adr,
            AxisName::Heater => self.heater,
            AxisName::Loader => self.loader,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Overrides for one simulated axis; unset fields keep the built-in defaults.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SimAxis {
    pub initial: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub holds: Option<bool>,
    /// Start the axis engaged (active).
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SimAxes {
    pub field: SimAxis,
    pub temperature: SimAxis,
    pub adr: SimAxis,
    pub heater: SimAxis,
    pub loader: SimAxis,
}

impl SimAxes {
    pub fn for_axis(&self, axis: AxisName) -> &SimAxis {
        match axis {
            AxisName::Field => &self.field,
            AxisName::Temperature => &self.temperature,
            AxisName::Adr => &self.adr,
            AxisName::Heater => &self.heater,
            AxisName::Loader => &self.loader,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimInterlock {
    pub axis: AxisName,
    pub while_active: Vec<AxisName>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimChannel {
    pub id: String,
    pub source: AxisName,
    #[serde(default = "one")]
    pub gain: f64,
    #[serde(default)]
    pub offset: f64,
}

fn one() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Sim {
    /// Simulated seconds per wall-clock second.
    pub time_scale: f64,
    /// Simulated ms an axis must sit on its setpoint before reporting stable.
    pub settle_ms: u64,
    pub axes: SimAxes,
    /// Replaces the built-in interlock table when present.
    pub interlocks: Option<Vec<SimInterlock>>,
    pub channels: Vec<SimChannel>,
}

impl Default for Sim {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            settle_ms: 2000,
            axes: SimAxes::default(),
            interlocks: None,
            channels: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerCfg,
    #[serde(default)]
    pub poll: PollCfg,
    #[serde(default)]
    pub safety: Safety,
    #[serde(default)]
    pub rates: Rates,
    #[serde(default)]
    pub logging: Logging,
    /// Simulated backend parameters
    #[serde(default)]
    pub sim: Sim,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

const AXES: [AxisName; 5] = [
    AxisName::Field,
    AxisName::Temperature,
    AxisName::Adr,
    AxisName::Heater,
    AxisName::Loader,
];

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Controller
        let floor = self.controller.continuous_floor_k;
        if !floor.is_finite() || floor < 0.0 {
            eyre::bail!("controller.continuous_floor_k must be a finite value >= 0");
        }

        // Poll
        if self.poll.ramp_poll_ms == 0 {
            eyre::bail!("poll.ramp_poll_ms must be >= 1");
        }
        if self.poll.grid_poll_ms == 0 {
            eyre::bail!("poll.grid_poll_ms must be >= 1");
        }
        if self.poll.grid_poll_ms > self.poll.ramp_poll_ms {
            eyre::bail!("poll.grid_poll_ms must not exceed poll.ramp_poll_ms");
        }

        // Safety
        if self.safety.ramp_deadline_ms > 7 * 24 * 60 * 60 * 1000 {
            eyre::bail!("safety.ramp_deadline_ms is unreasonably large (>7d)");
        }
        if self.safety.sweep_deadline_ms > 7 * 24 * 60 * 60 * 1000 {
            eyre::bail!("safety.sweep_deadline_ms is unreasonably large (>7d)");
        }

        // Rates
        for axis in AXES {
            let r = self.rates.for_axis(axis);
            if !(r.is_finite() && r > 0.0) {
                eyre::bail!("rates.{} must be > 0", axis.as_str());
            }
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got '{rot}'");
        }

        // Sim
        if !(self.sim.time_scale.is_finite() && self.sim.time_scale > 0.0) {
            eyre::bail!("sim.time_scale must be > 0");
        }
        for axis in AXES {
            let a = self.sim.axes.for_axis(axis);
            if let (Some(min), Some(max)) = (a.min, a.max)
                && min >= max
            {
                eyre::bail!("sim.axes.{}: min must be < max", axis.as_str());
            }
            if let Some(v) = a.initial
                && !v.is_finite()
            {
                eyre::bail!("sim.axes.{}.initial must be finite", axis.as_str());
            }
        }
        if let Some(table) = &self.sim.interlocks {
            for il in table {
                if il.while_active.contains(&il.axis) {
                    eyre::bail!(
                        "sim.interlocks: {} cannot be blocked by itself",
                        il.axis.as_str()
                    );
                }
            }
        }
        let mut seen = std::collections::BTreeSet::new();
        for ch in &self.sim.channels {
            if ch.id.trim().is_empty() {
                eyre::bail!("sim.channels: id must not be empty");
            }
            if !seen.insert(ch.id.as_str()) {
                eyre::bail!("sim.channels: duplicate id '{}'", ch.id);
            }
            if !(ch.gain.is_finite() && ch.offset.is_finite()) {
                eyre::bail!("sim.channels.{}: gain and offset must be finite", ch.id);
            }
        }

        Ok(())
    }
}

/// How a sweep decides when to sample.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// Sample every `interval` seconds.
    Time,
    /// Sample at setpoints spaced `interval` apart, within `tolerance`.
    Grid,
}

/// Sweep plan CSV schema.
///
/// Expected headers:
/// axis,start,end,rate,trigger,interval,tolerance,overshoot
///
/// Example:
/// axis,start,end,rate,trigger,interval,tolerance,overshoot
/// temperature,4.0,1.0,0.2,grid,0.5,0.02,0.05
/// field,0.0,1.0,0.1,time,10,,
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SweepRow {
    pub axis: AxisName,
    pub start: f64,
    pub end: f64,
    pub rate: f64,
    pub trigger: TriggerKind,
    pub interval: f64,
    pub tolerance: Option<f64>,
    pub overshoot: Option<f64>,
}

impl SweepRow {
    pub fn validate(&self) -> eyre::Result<()> {
        if !(self.start.is_finite() && self.end.is_finite()) {
            eyre::bail!("start and end must be finite");
        }
        if self.start == self.end {
            eyre::bail!("start and end are equal ({}); direction is ambiguous", self.start);
        }
        if !(self.rate.is_finite() && self.rate > 0.0) {
            eyre::bail!("rate must be > 0");
        }
        if !(self.interval.is_finite() && self.interval > 0.0) {
            eyre::bail!("interval must be > 0");
        }
        match (self.trigger, self.tolerance) {
            (TriggerKind::Grid, None) => eyre::bail!("grid trigger requires a tolerance"),
            (TriggerKind::Grid, Some(t)) if !(t.is_finite() && t > 0.0) => {
                eyre::bail!("tolerance must be > 0")
            }
            _ => {}
        }
        if let Some(o) = self.overshoot
            && !(o.is_finite() && o >= 0.0)
        {
            eyre::bail!("overshoot must be >= 0");
        }
        Ok(())
    }
}

const PLAN_HEADERS: [&str; 8] = [
    "axis",
    "start",
    "end",
    "rate",
    "trigger",
    "interval",
    "tolerance",
    "overshoot",
];

/// Parse a sweep plan from any reader; headers must match exactly.
pub fn parse_sweep_plan<R: std::io::Read>(rdr: R) -> eyre::Result<Vec<SweepRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(rdr);

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read sweep plan headers: {}", e))?
        .clone();
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != PLAN_HEADERS {
        eyre::bail!(
            "sweep plan CSV must have headers '{}', got: {}",
            PLAN_HEADERS.join(","),
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<SweepRow>().enumerate() {
        // +2: one for the header line, one for 1-based numbering
        let line = idx + 2;
        let row = rec.map_err(|e| eyre::eyre!("invalid sweep plan row {}: {}", line, e))?;
        row.validate()
            .map_err(|e| eyre::eyre!("invalid sweep plan row {}: {}", line, e))?;
        rows.push(row);
    }
    if rows.is_empty() {
        eyre::bail!("sweep plan contains no rows");
    }
    Ok(rows)
}

pub fn load_sweep_plan_csv(path: &std::path::Path) -> eyre::Result<Vec<SweepRow>> {
    let file = std::fs::File::open(path)
        .map_err(|e| eyre::eyre!("open sweep plan CSV {:?}: {}", path, e))?;
    parse_sweep_plan(file)
}
