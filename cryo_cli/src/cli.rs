//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use cryo_traits::{AxisId, OperatingMode};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "cryo", version, about = "Cryostat sub-controller CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/cryo_config.toml")]
    pub config: PathBuf,

    /// Print results and errors as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging].level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ramp one axis to a target and wait until it settles
    Ramp {
        /// field | temperature | adr | heater | loader
        #[arg(long)]
        axis: AxisId,
        /// Target value in the axis' units (T, K, %, position)
        #[arg(long, allow_negative_numbers = true)]
        target: f64,
        /// Rate in units per minute (default from [rates])
        #[arg(long)]
        rate: Option<f64>,
        /// Operating mode for this ramp (continuous | single-shot)
        #[arg(long)]
        mode: Option<OperatingMode>,
        /// ADR: regenerate automatically when the salt pill runs out
        #[arg(long, action = ArgAction::SetTrue)]
        auto_regenerate: bool,
        /// ADR: regenerate before starting the ramp
        #[arg(long, action = ArgAction::SetTrue)]
        pre_regenerate: bool,
        /// Give up after this many ms (overrides [safety].ramp_deadline_ms)
        #[arg(long, value_name = "MS")]
        deadline_ms: Option<u64>,
    },
    /// Sweep one axis from start to end, sampling auxiliary channels
    Sweep {
        #[arg(long, required_unless_present = "plan")]
        axis: Option<AxisId>,
        #[arg(long, required_unless_present = "plan", allow_negative_numbers = true)]
        start: Option<f64>,
        #[arg(long, required_unless_present = "plan", allow_negative_numbers = true)]
        end: Option<f64>,
        /// Rate in units per minute (default from [rates])
        #[arg(long)]
        rate: Option<f64>,
        /// Sample every N seconds
        #[arg(long, value_name = "SECS", conflicts_with = "grid")]
        every_s: Option<f64>,
        /// Sample at setpoints spaced this far apart
        #[arg(long, value_name = "INTERVAL", requires = "tolerance")]
        grid: Option<f64>,
        /// How close the axis must be to a grid point to sample it
        #[arg(long)]
        tolerance: Option<f64>,
        /// Command this far beyond the end so the axis crosses it
        #[arg(long)]
        overshoot: Option<f64>,
        /// Channel ids to sample (default: every configured channel)
        #[arg(long = "channel", value_name = "ID")]
        channels: Vec<String>,
        /// Run every row of a sweep plan CSV instead
        #[arg(long, value_name = "FILE", conflicts_with_all = ["axis", "start", "end"])]
        plan: Option<PathBuf>,
        /// Give up after this many ms (overrides [safety].sweep_deadline_ms)
        #[arg(long, value_name = "MS")]
        deadline_ms: Option<u64>,
    },
    /// Report mode and per-axis active/blocked state
    Status,
    /// Stop an axis immediately
    Interrupt {
        #[arg(long)]
        axis: AxisId,
    },
    /// Quick health check (config valid, every axis answers)
    SelfCheck,
}
