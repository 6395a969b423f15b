//! Interlock check run before any ramp or sweep command.

use cryo_traits::{AxisId, AxisSet};

use crate::error::CryoError;
use crate::handle::SubsystemHandle;

/// Fail with `Blocked` when the axis currently reports an interlock.
///
/// Reads through to the transport on every call. Issues no commands.
pub fn guard(handle: &SubsystemHandle) -> Result<(), CryoError> {
    let (blocked, by) = handle.blocked()?;
    evaluate(handle.id(), blocked, by)
}

/// Pure decision behind [`guard`].
pub fn evaluate(axis: AxisId, blocked: bool, by: AxisSet) -> Result<(), CryoError> {
    if blocked {
        tracing::warn!(%axis, by = %crate::error::format_axes(&by), "interlock active");
        return Err(CryoError::Blocked { axis, by });
    }
    Ok(())
}
