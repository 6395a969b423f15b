//! Human-readable error descriptions and structured JSON error formatting.

use cryo_core::error::format_axes;
use cryo_core::{BuildError, CryoError, UnresponsiveReason};

fn explain(what: impl std::fmt::Display, causes: &str, fix: &str) -> String {
    format!("What happened: {what}.\nLikely causes: {causes}.\nHow to fix: {fix}.")
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingAxis(axis) => explain(
                format_args!("No transport was provided for the {axis} axis"),
                "The backend failed to initialize or was not wired into the builder",
                "Register all five axes with with_axis(...)",
            ),
            BuildError::InvalidConfig(msg) => explain(
                format_args!("Invalid configuration ({msg})"),
                "Missing or out-of-range values in the TOML",
                "Edit the config file, then rerun",
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<CryoError>() {
        return match ce {
            CryoError::Blocked { axis, by } => explain(
                format_args!("The {axis} axis is blocked by {}", format_axes(by)),
                "A sibling operation holds an interlock on this axis",
                "Wait for the blocking axes to finish, or stop them with `cryo interrupt --axis <AXIS>`",
            ),
            CryoError::RangeViolation { target, mode, floor } => explain(
                format_args!("Target {target} K is below the {floor} K floor of {mode} mode"),
                "Continuous refrigeration cannot reach below its floor",
                "Raise the target, or request single-shot mode with --mode single-shot",
            ),
            CryoError::AmbiguousDirection { start, end } => explain(
                format_args!("Sweep start and end are both {start}"),
                "A sweep needs distinct endpoints to know its direction",
                format!("Choose an end different from {end}").as_str(),
            ),
            CryoError::HardwareUnresponsive { axis, reason } => match reason {
                UnresponsiveReason::Cancelled => explain(
                    format_args!("The {axis} operation was cancelled"),
                    "Ctrl-C was pressed or another caller tripped the cancel token",
                    "Start a new run when ready",
                ),
                UnresponsiveReason::DeadlineExceeded { deadline_ms } => explain(
                    format_args!("The {axis} axis did not settle within {deadline_ms} ms"),
                    "Rate too low for the distance, or the sub-controller is stuck",
                    "Raise --deadline-ms or [safety] deadlines, or check the sub-controller",
                ),
                UnresponsiveReason::Timeout => explain(
                    format_args!("The {axis} sub-controller did not answer in time"),
                    "Link down, controller powered off, or overloaded",
                    "Check the connection to the sub-controller and retry",
                ),
            },
            _ => explain(
                ce,
                "See logs",
                "Re-run with --log-level=debug or set RUST_LOG for more detail",
            ),
        };
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("sweep plan csv must have headers") {
        return format!(
            "Invalid headers in sweep plan CSV. Expected 'axis,start,end,rate,trigger,interval,tolerance,overshoot'.\n{msg}"
        );
    }

    if lower.contains("read config") || lower.contains("parse config") || lower.contains("invalid config") {
        let cause = err.root_cause();
        return explain(
            format_args!("Configuration could not be loaded ({cause})"),
            "Wrong --config path, TOML syntax error, or out-of-range values",
            "Fix the file and rerun; etc/cryo_config.toml is a working sample",
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per error kind; anything else returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<CryoError>() {
        Some(CryoError::Blocked { .. }) => 3,
        Some(CryoError::RangeViolation { .. }) => 4,
        Some(CryoError::AmbiguousDirection { .. }) => 5,
        Some(CryoError::HardwareUnresponsive { .. }) => 6,
        _ => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<CryoError>() {
        Some(CryoError::Blocked { .. }) => "Blocked",
        Some(CryoError::RangeViolation { .. }) => "RangeViolation",
        Some(CryoError::AmbiguousDirection { .. }) => "AmbiguousDirection",
        Some(CryoError::HardwareUnresponsive { .. }) => "HardwareUnresponsive",
        Some(CryoError::InvalidRequest(_)) => "InvalidRequest",
        Some(_) => "ControllerError",
        None if err.downcast_ref::<BuildError>().is_some() => "BuildError",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let details = match err.downcast_ref::<CryoError>() {
        Some(CryoError::Blocked { axis, by }) => Some(json!({
            "axis": axis.as_str(),
            "blocked_by": by.iter().map(|a| a.as_str()).collect::<Vec<_>>(),
        })),
        Some(CryoError::RangeViolation { target, mode, floor }) => Some(json!({
            "target": target,
            "mode": mode.as_str(),
            "floor": floor,
        })),
        Some(CryoError::HardwareUnresponsive { axis, reason }) => {
            let mut d = json!({ "axis": axis.as_str(), "cause": reason.to_string() });
            if let UnresponsiveReason::DeadlineExceeded { deadline_ms } = reason {
                d["deadline_ms"] = json!(deadline_ms);
            }
            Some(d)
        }
        _ => None,
    };

    let msg = humanize(err);
    match details {
        Some(d) => json!({ "reason": reason_name(err), "details": d, "message": msg }),
        None => json!({ "reason": reason_name(err), "message": msg }),
    }
    .to_string()
}
