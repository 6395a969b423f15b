//! Typed proxy to one physical axis.
//!
//! Every query reads through to the transport; nothing but the last commanded
//! setpoint is remembered locally. Two locks live here: the transport lock,
//! held only for the duration of one call, and the operation lock, held by a
//! ramp or sweep for its whole lifetime so operations on one axis serialize.

use std::sync::{Mutex, MutexGuard};

use cryo_traits::{AxisId, AxisSet, AxisTransport, ModeParams, RampingInfo, TransportResult};

use crate::error::CryoError;
use crate::hw_error::map_transport_error;

/// Derived per-axis state reported by [`SubsystemHandle::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisActivity {
    Active,
    Blocked,
    Idle,
}

impl AxisActivity {
    pub fn as_str(self) -> &'static str {
        match self {
            AxisActivity::Active => "active",
            AxisActivity::Blocked => "blocked",
            AxisActivity::Idle => "idle",
        }
    }
}

impl core::fmt::Display for AxisActivity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status row for one axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisStatus {
    pub axis: AxisId,
    pub active: bool,
    pub blocked: bool,
    pub blocked_by: AxisSet,
    pub state: AxisActivity,
}

/// Point-in-time view of every field of a handle.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisSnapshot {
    pub axis: AxisId,
    pub current_value: f64,
    pub setpoint: Option<f64>,
    pub stable: bool,
    pub active: bool,
    pub blocked: bool,
    pub blocked_by: AxisSet,
}

/// Exclusive right to run one operation on an axis.
pub type OpLease<'a> = MutexGuard<'a, ()>;

pub struct SubsystemHandle {
    id: AxisId,
    transport: Mutex<Box<dyn AxisTransport + Send>>,
    op: Mutex<()>,
    setpoint: Mutex<Option<f64>>,
}

impl core::fmt::Debug for SubsystemHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SubsystemHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl SubsystemHandle {
    pub fn new(id: AxisId, transport: Box<dyn AxisTransport + Send>) -> Self {
        Self {
            id,
            transport: Mutex::new(transport),
            op: Mutex::new(()),
            setpoint: Mutex::new(None),
        }
    }

    #[inline]
    pub fn id(&self) -> AxisId {
        self.id
    }

    fn call<T>(
        &self,
        op: &str,
        f: impl FnOnce(&mut (dyn AxisTransport + Send)) -> TransportResult<T>,
    ) -> Result<T, CryoError> {
        let mut t = self
            .transport
            .lock()
            .map_err(|_| CryoError::State(format!("{} transport lock poisoned", self.id)))?;
        f(&mut **t).map_err(|e| map_transport_error(self.id, op, &*e))
    }

    pub fn current_value(&self) -> Result<f64, CryoError> {
        self.call("read_value", |t| t.read_value())
    }

    pub fn stable(&self) -> Result<bool, CryoError> {
        self.call("read_stable", |t| t.read_stable())
    }

    pub fn active(&self) -> Result<bool, CryoError> {
        self.call("read_active", |t| t.read_active())
    }

    /// Blocked flag and blocking set, normalized so a non-empty set always
    /// reports blocked.
    pub fn blocked(&self) -> Result<(bool, AxisSet), CryoError> {
        let (flag, by) = self.call("read_blocked", |t| t.read_blocked())?;
        if flag && by.is_empty() {
            tracing::warn!(axis = %self.id, "transport reports blocked without a blocking set");
        }
        Ok((flag || !by.is_empty(), by))
    }

    pub fn ramping_info(&self) -> Result<RampingInfo, CryoError> {
        self.call("read_ramping_info", |t| t.read_ramping_info())
    }

    /// Last commanded setpoint, if any command has been issued.
    pub fn setpoint(&self) -> Option<f64> {
        self.setpoint.lock().map(|g| *g).unwrap_or(None)
    }

    pub fn snapshot(&self) -> Result<AxisSnapshot, CryoError> {
        let (blocked, blocked_by) = self.blocked()?;
        Ok(AxisSnapshot {
            axis: self.id,
            current_value: self.current_value()?,
            setpoint: self.setpoint(),
            stable: self.stable()?,
            active: self.active()?,
            blocked,
            blocked_by,
        })
    }

    pub fn status(&self) -> Result<AxisStatus, CryoError> {
        let active = self.active()?;
        let (blocked, blocked_by) = self.blocked()?;
        let state = if active {
            AxisActivity::Active
        } else if blocked {
            AxisActivity::Blocked
        } else {
            AxisActivity::Idle
        };
        Ok(AxisStatus {
            axis: self.id,
            active,
            blocked,
            blocked_by,
            state,
        })
    }

    /// Issue a ramp command. Callers must have passed the interlock guard.
    pub(crate) fn command(
        &self,
        setpoint: f64,
        rate: f64,
        mode_params: Option<ModeParams>,
    ) -> Result<(), CryoError> {
        self.call("start", |t| t.start(setpoint, rate, mode_params))?;
        if let Ok(mut sp) = self.setpoint.lock() {
            *sp = Some(setpoint);
        }
        tracing::debug!(axis = %self.id, setpoint, rate, "command issued");
        Ok(())
    }

    /// Out-of-band stop. Does not wait for a running operation.
    pub fn interrupt(&self) -> Result<(), CryoError> {
        self.call("stop", |t| t.stop())?;
        tracing::info!(axis = %self.id, "interrupted");
        Ok(())
    }

    /// Take the per-axis operation lock, waiting for any running operation.
    pub fn lease(&self) -> Result<OpLease<'_>, CryoError> {
        self.op
            .lock()
            .map_err(|_| CryoError::State(format!("{} operation lock poisoned", self.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::ScriptedAxis;

    #[test]
    fn blocked_set_implies_blocked_flag() {
        let axis = ScriptedAxis::new([1.0]).blocked_by([AxisId::Adr]).report_flag(false);
        let h = SubsystemHandle::new(AxisId::Field, Box::new(axis));
        let (blocked, by) = h.blocked().unwrap();
        assert!(blocked);
        assert_eq!(by, AxisSet::from([AxisId::Adr]));
    }

    #[test]
    fn status_prefers_active_over_blocked() {
        let axis = ScriptedAxis::new([1.0]).blocked_by([AxisId::Adr]).active(true);
        let h = SubsystemHandle::new(AxisId::Field, Box::new(axis));
        assert_eq!(h.status().unwrap().state, AxisActivity::Active);
    }

    #[test]
    fn command_records_setpoint() {
        let axis = ScriptedAxis::new([1.0]);
        let log = axis.log();
        let h = SubsystemHandle::new(AxisId::Heater, Box::new(axis));
        assert_eq!(h.setpoint(), None);
        h.command(12.0, 1.0, None).unwrap();
        assert_eq!(h.setpoint(), Some(12.0));
        assert_eq!(log.commands().len(), 1);
    }
}
