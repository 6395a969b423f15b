//! Scripted transports for tests and examples.
//!
//! [`ScriptedAxis`] replays a fixed value trace and reports stability after a
//! configurable number of predicate reads per command. Everything it sees is
//! recorded in a shared [`ScriptLog`] that outlives the boxed transport.

use std::sync::{Arc, Mutex};

use cryo_traits::{AuxChannel, AxisId, AxisSet, AxisTransport, ModeParams, RampingInfo, TransportResult};

/// A command received by a [`ScriptedAxis`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start {
        setpoint: f64,
        rate: f64,
        mode_params: Option<ModeParams>,
    },
    Stop,
}

#[derive(Debug, Default)]
struct LogInner {
    commands: Vec<Command>,
    value_reads: u64,
    predicate_reads: u64,
    blocked_reads: u64,
    /// Predicate reads since the last start command.
    since_command: u64,
}

/// Shared record of traffic on a [`ScriptedAxis`].
#[derive(Debug, Clone, Default)]
pub struct ScriptLog(Arc<Mutex<LogInner>>);

impl ScriptLog {
    fn with<T>(&self, f: impl FnOnce(&mut LogInner) -> T) -> T {
        match self.0.lock() {
            Ok(mut g) => f(&mut g),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    pub fn commands(&self) -> Vec<Command> {
        self.with(|l| l.commands.clone())
    }

    pub fn value_reads(&self) -> u64 {
        self.with(|l| l.value_reads)
    }

    /// Reads of `stable` or ramping info.
    pub fn predicate_reads(&self) -> u64 {
        self.with(|l| l.predicate_reads)
    }

    pub fn blocked_reads(&self) -> u64 {
        self.with(|l| l.blocked_reads)
    }
}

/// Transport replaying a value trace; the last value repeats once exhausted.
#[derive(Debug)]
pub struct ScriptedAxis {
    values: Vec<f64>,
    cursor: usize,
    /// Predicate reads needed after the n-th start command before reporting
    /// stable; the last entry applies to every later command.
    stable_after: Vec<u64>,
    /// Separate `ready_to_ramp` delay for temperature-style ramping info.
    ready_after: Option<u64>,
    blocked_by: AxisSet,
    flag: Option<bool>,
    active: bool,
    fail_values: Option<String>,
    log: ScriptLog,
}

impl ScriptedAxis {
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        Self {
            values: values.into_iter().collect(),
            cursor: 0,
            stable_after: vec![1],
            ready_after: None,
            blocked_by: AxisSet::new(),
            flag: None,
            active: false,
            fail_values: None,
            log: ScriptLog::default(),
        }
    }

    pub fn stable_after(mut self, polls: u64) -> Self {
        self.stable_after = vec![polls];
        self
    }

    pub fn stable_after_each(mut self, polls: impl IntoIterator<Item = u64>) -> Self {
        self.stable_after = polls.into_iter().collect();
        self
    }

    pub fn ready_after(mut self, polls: u64) -> Self {
        self.ready_after = Some(polls);
        self
    }

    pub fn blocked_by(mut self, axes: impl IntoIterator<Item = AxisId>) -> Self {
        self.blocked_by = axes.into_iter().collect();
        self
    }

    /// Override the raw blocked flag independently of the blocking set.
    pub fn report_flag(mut self, flag: bool) -> Self {
        self.flag = Some(flag);
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Every value read fails with `msg`.
    pub fn failing(mut self, msg: impl Into<String>) -> Self {
        self.fail_values = Some(msg.into());
        self
    }

    pub fn log(&self) -> ScriptLog {
        self.log.clone()
    }

    fn threshold(&self, commands: usize) -> u64 {
        let idx = commands.saturating_sub(1);
        self.stable_after
            .get(idx)
            .or_else(|| self.stable_after.last())
            .copied()
            .unwrap_or(0)
    }

    fn predicate_tick(&mut self) -> (u64, usize) {
        self.log.with(|l| {
            l.predicate_reads += 1;
            l.since_command += 1;
            (l.since_command, l.commands.len())
        })
    }
}

impl AxisTransport for ScriptedAxis {
    fn read_value(&mut self) -> TransportResult<f64> {
        self.log.with(|l| l.value_reads += 1);
        if let Some(msg) = &self.fail_values {
            return Err(msg.clone().into());
        }
        let v = self
            .values
            .get(self.cursor)
            .or_else(|| self.values.last())
            .copied()
            .ok_or("empty value script")?;
        self.cursor += 1;
        Ok(v)
    }

    fn read_stable(&mut self) -> TransportResult<bool> {
        let (n, cmds) = self.predicate_tick();
        Ok(n >= self.threshold(cmds))
    }

    fn read_active(&mut self) -> TransportResult<bool> {
        Ok(self.active)
    }

    fn read_blocked(&mut self) -> TransportResult<(bool, AxisSet)> {
        self.log.with(|l| l.blocked_reads += 1);
        let flag = self.flag.unwrap_or(!self.blocked_by.is_empty());
        Ok((flag, self.blocked_by.clone()))
    }

    fn start(
        &mut self,
        setpoint: f64,
        rate: f64,
        mode_params: Option<ModeParams>,
    ) -> TransportResult<()> {
        self.log.with(|l| {
            l.commands.push(Command::Start {
                setpoint,
                rate,
                mode_params,
            });
            l.since_command = 0;
        });
        Ok(())
    }

    fn stop(&mut self) -> TransportResult<()> {
        self.log.with(|l| l.commands.push(Command::Stop));
        Ok(())
    }

    fn read_ramping_info(&mut self) -> TransportResult<RampingInfo> {
        let (n, cmds) = self.predicate_tick();
        let ramp_done = n >= self.threshold(cmds);
        let ready = self.ready_after.map_or(ramp_done, |r| n >= r);
        Ok(RampingInfo {
            ramp_done,
            ready_to_ramp: ready,
        })
    }
}

/// Auxiliary channel replaying a fixed trace.
#[derive(Debug, Clone)]
pub struct ScriptedChannel {
    id: String,
    values: Vec<f64>,
    cursor: usize,
}

impl ScriptedChannel {
    pub fn new(id: impl Into<String>, values: impl IntoIterator<Item = f64>) -> Self {
        Self {
            id: id.into(),
            values: values.into_iter().collect(),
            cursor: 0,
        }
    }
}

impl AuxChannel for ScriptedChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn read(&mut self) -> TransportResult<f64> {
        let v = self
            .values
            .get(self.cursor)
            .or_else(|| self.values.last())
            .copied()
            .ok_or("empty channel script")?;
        self.cursor += 1;
        Ok(v)
    }
}
