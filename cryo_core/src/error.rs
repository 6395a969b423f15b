use cryo_traits::{AxisId, AxisSet, OperatingMode};
use thiserror::Error;

/// Why an axis stopped answering in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresponsiveReason {
    /// The caller's cancel token was tripped.
    Cancelled,
    /// The operation ran past its deadline.
    DeadlineExceeded { deadline_ms: u64 },
    /// The transport itself timed out.
    Timeout,
}

impl core::fmt::Display for UnresponsiveReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            UnresponsiveReason::Cancelled => f.write_str("cancelled"),
            UnresponsiveReason::DeadlineExceeded { deadline_ms } => {
                write!(f, "deadline of {deadline_ms} ms exceeded")
            }
            UnresponsiveReason::Timeout => f.write_str("transport timeout"),
        }
    }
}

/// Render a blocking set as `adr, temperature`.
pub fn format_axes(set: &AxisSet) -> String {
    if set.is_empty() {
        return "an unreported axis".to_string();
    }
    set.iter()
        .map(|a| a.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CryoError {
    #[error("{axis} is blocked by {}", format_axes(.by))]
    Blocked { axis: AxisId, by: AxisSet },
    #[error("target {target} K is below the {floor} K floor in {mode} mode")]
    RangeViolation {
        target: f64,
        mode: OperatingMode,
        floor: f64,
    },
    #[error("sweep bounds are equal ({start} == {end}); direction is ambiguous")]
    AmbiguousDirection { start: f64, end: f64 },
    #[error("{axis} unresponsive: {reason}")]
    HardwareUnresponsive {
        axis: AxisId,
        reason: UnresponsiveReason,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("transport fault: {0}")]
    TransportFault(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing transport for axis {0}")]
    MissingAxis(AxisId),
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

/// Propagated result type; typed errors ride inside the `Report`.
pub type Result<T, E = Report> = core::result::Result<T, E>;
pub use eyre::Report;
