//! Start-to-end traversal of one axis while sampling auxiliary channels.
//!
//! A sweep settles the axis at `start`, commands the (optionally overshot)
//! end target without waiting, then yields [`MeasuredSample`]s lazily until
//! one of three things happens:
//!
//! - the axis reaches or passes `end` while still moving ([`SweepEnd::PassedEnd`]),
//! - the axis reaches or passes `end` and reports stable ([`SweepEnd::Settled`]),
//! - every value-grid point is measured or skipped ([`SweepEnd::GridComplete`]).
//!
//! A stable report short of `end` never ends a sweep; the deadline does.
//!
//! The returned [`Sweep`] holds the axis' operation lock until dropped. It is
//! fused: after an error or a termination it only yields `None`.

use std::collections::BTreeSet;
use std::time::Duration;

use cryo_traits::{AuxChannel, AxisId, ModeParams, OperatingMode};

use crate::cancel::{ArmedWatchdog, Watchdog};
use crate::config::ControlCtx;
use crate::error::{CryoError, Result};
use crate::handle::{OpLease, SubsystemHandle};
use crate::hw_error::map_transport_error;
use crate::interlock;
use crate::ramp::{RampController, RampRequest, has_converged};
use crate::util::{direction, reached};

/// Upper bound on value-grid points per sweep, bounds included.
pub const MAX_GRID_POINTS: usize = 100_000;

/// When a sweep takes a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepTrigger {
    /// Fixed cadence.
    Time { every: Duration },
    /// Evenly spaced axis values, each sampled once within `tolerance`.
    ValueGrid { interval: f64, tolerance: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepSpec {
    pub start: f64,
    pub end: f64,
    /// Units per minute, used for both the settle ramp and the sweep ramp.
    pub rate: f64,
    pub trigger: StepTrigger,
    /// Extra distance commanded beyond `end` so the axis crosses it.
    pub overshoot: Option<f64>,
    /// ADR only.
    pub mode_params: Option<ModeParams>,
}

impl SweepSpec {
    pub fn new(start: f64, end: f64, rate: f64, trigger: StepTrigger) -> Self {
        Self {
            start,
            end,
            rate,
            trigger,
            overshoot: None,
            mode_params: None,
        }
    }

    pub fn with_overshoot(mut self, overshoot: f64) -> Self {
        self.overshoot = Some(overshoot);
        self
    }

    pub fn with_mode_params(mut self, params: ModeParams) -> Self {
        self.mode_params = Some(params);
        self
    }

    pub fn validate(&self, axis: AxisId) -> Result<(), CryoError> {
        if !(self.start.is_finite() && self.end.is_finite()) {
            return Err(CryoError::InvalidRequest(format!(
                "sweep bounds must be finite (start={}, end={})",
                self.start, self.end
            )));
        }
        if self.start == self.end {
            return Err(CryoError::AmbiguousDirection {
                start: self.start,
                end: self.end,
            });
        }
        if !(self.rate.is_finite() && self.rate > 0.0) {
            return Err(CryoError::InvalidRequest(format!(
                "rate {} must be finite and > 0",
                self.rate
            )));
        }
        match self.trigger {
            StepTrigger::Time { every } if every.is_zero() => {
                return Err(CryoError::InvalidRequest(
                    "time interval must be > 0".into(),
                ));
            }
            StepTrigger::ValueGrid {
                interval,
                tolerance,
            } => {
                if !(interval.is_finite() && interval > 0.0) {
                    return Err(CryoError::InvalidRequest(format!(
                        "grid interval {interval} must be finite and > 0"
                    )));
                }
                if !(tolerance.is_finite() && tolerance > 0.0) {
                    return Err(CryoError::InvalidRequest(format!(
                        "grid tolerance {tolerance} must be finite and > 0"
                    )));
                }
                let points = grid_len(self.start, self.end, interval);
                #[allow(clippy::cast_precision_loss)]
                let limit = MAX_GRID_POINTS as f64;
                if points > limit {
                    return Err(CryoError::InvalidRequest(format!(
                        "grid interval {interval} over {}..{} needs {points:.0} points, limit is {MAX_GRID_POINTS}",
                        self.start, self.end
                    )));
                }
            }
            StepTrigger::Time { .. } => {}
        }
        if let Some(o) = self.overshoot
            && !(o.is_finite() && o >= 0.0)
        {
            return Err(CryoError::InvalidRequest(format!(
                "overshoot {o} must be finite and >= 0"
            )));
        }
        if self.mode_params.is_some() && axis != AxisId::Adr {
            return Err(CryoError::InvalidRequest(format!(
                "mode parameters apply to adr only, not {axis}"
            )));
        }
        Ok(())
    }

    /// `+1.0` for an upward sweep, `-1.0` for a downward one.
    pub fn direction(&self) -> f64 {
        direction(self.start, self.end)
    }

    /// The target actually commanded for the sweep leg.
    pub fn effective_end(&self) -> f64 {
        self.end + self.direction() * self.overshoot.unwrap_or(0.0)
    }
}

/// Grid `{start, start ± interval, …, end}`, inclusive of both bounds.
///
/// Points are computed as `start + k·interval` to avoid drift. `end` is
/// appended when the span is not a whole number of intervals.
///
/// Steps are clamped to [`MAX_GRID_POINTS`]; [`SweepSpec::validate`]
/// rejects intervals that would need more points.
pub fn grid_points(start: f64, end: f64, interval: f64) -> Vec<f64> {
    let dir = direction(start, end);
    let span = (end - start).abs();
    let eps = grid_eps(span);
    let whole = ((span + eps) / interval).floor();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let n = (whole as usize).min(MAX_GRID_POINTS - 1);
    #[allow(clippy::cast_precision_loss)]
    let mut pts: Vec<f64> = (0..=n)
        .map(|k| start + dir * interval * k as f64)
        .collect();
    match pts.last_mut() {
        Some(last) if (*last - end).abs() <= eps => *last = end,
        _ => pts.push(end),
    }
    pts
}

fn grid_eps(span: f64) -> f64 {
    1e-9 * span.max(1.0)
}

/// Points [`grid_points`] would produce, as a float so huge grids don't wrap.
fn grid_len(start: f64, end: f64, interval: f64) -> f64 {
    let span = (end - start).abs();
    let whole = ((span + grid_eps(span)) / interval).floor();
    let last = start + direction(start, end) * interval * whole;
    if (last - end).abs() <= grid_eps(span) {
        whole + 1.0
    } else {
        whole + 2.0
    }
}

/// One sample taken during a sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasuredSample {
    /// 0-based ordinal within the sweep.
    pub index: usize,
    /// Midpoint of the axis reads bracketing the channel reads.
    pub axis_value: f64,
    /// Channel readings in channel order.
    pub readings: Vec<(String, f64)>,
    pub grid_index: Option<usize>,
    pub grid_point: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepEnd {
    PassedEnd,
    GridComplete,
    Settled,
}

impl SweepEnd {
    pub fn as_str(self) -> &'static str {
        match self {
            SweepEnd::PassedEnd => "passed-end",
            SweepEnd::GridComplete => "grid-complete",
            SweepEnd::Settled => "settled",
        }
    }
}

impl core::fmt::Display for SweepEnd {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a drained sweep produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepReport {
    pub samples: Vec<MeasuredSample>,
    pub end: SweepEnd,
    pub last_value: f64,
}

/// Read v1, every channel once in order, then v2.
pub(crate) fn sample_once(
    handle: &SubsystemHandle,
    channels: &mut [Box<dyn AuxChannel>],
) -> Result<(f64, f64, Vec<(String, f64)>), CryoError> {
    let v1 = handle.current_value()?;
    let mut readings = Vec::with_capacity(channels.len());
    for ch in channels.iter_mut() {
        let v = ch
            .read()
            .map_err(|e| map_transport_error(handle.id(), &format!("read {}", ch.id()), &*e))?;
        readings.push((ch.id().to_string(), v));
    }
    let v2 = handle.current_value()?;
    Ok(((v1 + v2) / 2.0, v2, readings))
}

/// Exact-once bookkeeping over a precomputed grid.
#[derive(Debug, Clone)]
struct GridCursor {
    points: Vec<f64>,
    tolerance: f64,
    measured: BTreeSet<usize>,
    skipped: BTreeSet<usize>,
}

impl GridCursor {
    fn new(points: Vec<f64>, tolerance: f64) -> Self {
        Self {
            points,
            tolerance,
            measured: BTreeSet::new(),
            skipped: BTreeSet::new(),
        }
    }

    /// First grid index neither measured nor skipped.
    fn pending(&self) -> Option<usize> {
        (0..self.points.len()).find(|i| !self.measured.contains(i) && !self.skipped.contains(i))
    }

    fn exhausted(&self) -> bool {
        self.pending().is_none()
    }

    /// Mark every pending point the axis has moved beyond by more than the
    /// tolerance as skipped.
    fn skip_passed(&mut self, axis: AxisId, dir: f64, value: f64) {
        while let Some(i) = self.pending() {
            let p = self.points[i];
            if dir * (value - p) > self.tolerance {
                tracing::warn!(%axis, grid_index = i, grid_point = p, value, "grid point passed without a sample");
                self.skipped.insert(i);
            } else {
                break;
            }
        }
    }

    /// The pending point `value` is within tolerance of, if any.
    fn hit(&self, value: f64) -> Option<usize> {
        self.pending()
            .filter(|&i| (value - self.points[i]).abs() <= self.tolerance)
    }
}

/// A running sweep; iterate it to take samples.
pub struct Sweep<'a> {
    handle: &'a SubsystemHandle,
    _lease: OpLease<'a>,
    channels: Vec<Box<dyn AuxChannel>>,
    spec: SweepSpec,
    ctx: &'a ControlCtx,
    watchdog: ArmedWatchdog,
    dir: f64,
    grid: Option<GridCursor>,
    emitted: usize,
    last_value: f64,
    outcome: Option<SweepEnd>,
    done: bool,
}

impl core::fmt::Debug for Sweep<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Sweep")
            .field("axis", &self.handle.id())
            .field("spec", &self.spec)
            .field("emitted", &self.emitted)
            .field("last_value", &self.last_value)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

/// Start a sweep on `handle`.
///
/// Validation, the interlock guard and the range checks for both `start` and
/// the effective end all run before any command is sent. Blocks until the
/// axis has settled at `start`, then returns the sample iterator.
pub fn sweep<'a>(
    handle: &'a SubsystemHandle,
    spec: SweepSpec,
    channels: Vec<Box<dyn AuxChannel>>,
    mode: OperatingMode,
    ctx: &'a ControlCtx,
    watchdog: &Watchdog,
) -> Result<Sweep<'a>> {
    let axis = handle.id();
    spec.validate(axis)?;
    let lease = handle.lease()?;
    interlock::guard(handle)?;
    let effective_end = spec.effective_end();
    if axis.is_thermal() {
        ctx.arbiter.check_range(spec.start, mode)?;
        ctx.arbiter.check_range(effective_end, mode)?;
    }
    let armed = watchdog.arm(ctx.clock.now());

    let settle = RampRequest {
        target: spec.start,
        rate: spec.rate,
        mode_params: spec.mode_params,
    };
    tracing::debug!(%axis, start = spec.start, "settling at sweep start");
    let settled = RampController::with_armed(handle, settle, mode, ctx, armed.clone()).run()?;

    interlock::guard(handle)?;
    handle.command(effective_end, spec.rate, spec.mode_params)?;

    let grid = match spec.trigger {
        StepTrigger::ValueGrid {
            interval,
            tolerance,
        } => Some(GridCursor::new(
            grid_points(spec.start, spec.end, interval),
            tolerance,
        )),
        StepTrigger::Time { .. } => None,
    };
    tracing::info!(
        %axis,
        start = spec.start,
        end = spec.end,
        effective_end,
        rate = spec.rate,
        trigger = ?spec.trigger,
        grid_points = grid.as_ref().map_or(0, |g| g.points.len()),
        "sweep started"
    );

    Ok(Sweep {
        handle,
        _lease: lease,
        channels,
        dir: spec.direction(),
        spec,
        ctx,
        watchdog: armed,
        grid,
        emitted: 0,
        last_value: settled.final_value,
        outcome: None,
        done: false,
    })
}

impl Sweep<'_> {
    pub fn axis(&self) -> AxisId {
        self.handle.id()
    }

    pub fn spec(&self) -> &SweepSpec {
        &self.spec
    }

    /// Most recent axis reading.
    pub fn last_value(&self) -> f64 {
        self.last_value
    }

    /// Why the sweep ended; `None` while running or after an error.
    pub fn outcome(&self) -> Option<SweepEnd> {
        self.outcome
    }

    pub fn samples_emitted(&self) -> usize {
        self.emitted
    }

    /// Grid points passed without a sample (value-grid sweeps only).
    pub fn skipped_grid_points(&self) -> Vec<f64> {
        self.grid
            .as_ref()
            .map(|g| g.skipped.iter().map(|&i| g.points[i]).collect())
            .unwrap_or_default()
    }

    /// Drain the sweep, stopping at the first error.
    pub fn into_report(mut self) -> Result<SweepReport> {
        let mut samples = Vec::new();
        for s in self.by_ref() {
            samples.push(s?);
        }
        let end = self
            .outcome
            .ok_or_else(|| CryoError::State("sweep ended without an outcome".into()))?;
        Ok(SweepReport {
            samples,
            end,
            last_value: self.last_value,
        })
    }

    fn termination(&self) -> Result<Option<SweepEnd>, CryoError> {
        if reached(self.dir, self.spec.end, self.last_value) {
            return Ok(Some(if has_converged(self.handle)? {
                SweepEnd::Settled
            } else {
                SweepEnd::PassedEnd
            }));
        }
        if self.grid.as_ref().is_some_and(GridCursor::exhausted) {
            return Ok(Some(SweepEnd::GridComplete));
        }
        Ok(None)
    }

    fn check_watchdog(&self) -> Result<(), CryoError> {
        let axis = self.handle.id();
        self.watchdog.check(&*self.ctx.clock, axis).inspect_err(|e| {
            tracing::error!(%axis, error = %e, "sweep aborted");
            if self.ctx.safety.stop_on_abort
                && let Err(stop) = self.handle.interrupt()
            {
                tracing::warn!(%axis, error = %stop, "best-effort stop failed");
            }
        })
    }

    fn emit(&mut self, grid_index: Option<usize>) -> Result<MeasuredSample, CryoError> {
        let (mid, v2, readings) = sample_once(self.handle, &mut self.channels)?;
        self.last_value = v2;
        let grid_point = match (grid_index, &mut self.grid) {
            (Some(i), Some(g)) => {
                g.measured.insert(i);
                Some(g.points[i])
            }
            _ => None,
        };
        let sample = MeasuredSample {
            index: self.emitted,
            axis_value: mid,
            readings,
            grid_index,
            grid_point,
        };
        self.emitted += 1;
        tracing::debug!(axis = %self.handle.id(), index = sample.index, value = mid, ?grid_point, "sample");
        Ok(sample)
    }

    fn advance(&mut self) -> Result<Option<MeasuredSample>, CryoError> {
        let axis = self.handle.id();
        loop {
            self.check_watchdog()?;
            if let Some(end) = self.termination()? {
                self.outcome = Some(end);
                return Ok(None);
            }
            match self.spec.trigger {
                StepTrigger::Time { every } => {
                    self.ctx.clock.sleep(every);
                    return self.emit(None).map(Some);
                }
                StepTrigger::ValueGrid { .. } => {
                    self.ctx.clock.sleep(self.ctx.poll.grid_period);
                    let v = self.handle.current_value()?;
                    self.last_value = v;
                    tracing::trace!(%axis, value = v, "grid poll");
                    let dir = self.dir;
                    let hit = self.grid.as_mut().and_then(|g| {
                        g.skip_passed(axis, dir, v);
                        g.hit(v)
                    });
                    if let Some(i) = hit {
                        return self.emit(Some(i)).map(Some);
                    }
                }
            }
        }
    }
}

impl Iterator for Sweep<'_> {
    type Item = Result<MeasuredSample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(s)) => Some(Ok(s)),
            Ok(None) => {
                self.done = true;
                tracing::info!(
                    axis = %self.handle.id(),
                    reason = ?self.outcome,
                    samples = self.emitted,
                    last_value = self.last_value,
                    "sweep finished"
                );
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e.into()))
            }
        }
    }
}

impl std::iter::FusedIterator for Sweep<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{ScriptedAxis, ScriptedChannel};

    #[test]
    fn grid_includes_both_bounds() {
        assert_eq!(grid_points(0.0, 3.0, 1.0), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(grid_points(0.0, 2.5, 1.0), vec![0.0, 1.0, 2.0, 2.5]);
        assert_eq!(grid_points(3.0, 0.0, 1.0), vec![3.0, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn grid_absorbs_float_drift() {
        let g = grid_points(0.0, 0.3, 0.1);
        assert_eq!(g.len(), 4);
        assert_eq!(g.last().copied(), Some(0.3));
    }

    #[test]
    fn grid_wider_than_span_is_just_the_bounds() {
        assert_eq!(grid_points(1.0, 1.5, 2.0), vec![1.0, 1.5]);
    }

    #[test]
    fn grid_len_matches_grid_points() {
        for (s, e, i) in [(0.0, 3.0, 1.0), (0.0, 2.5, 1.0), (3.0, 0.0, 1.0), (0.0, 0.3, 0.1), (1.0, 1.5, 2.0)] {
            #[allow(clippy::cast_precision_loss)]
            let n = grid_points(s, e, i).len() as f64;
            assert_eq!(grid_len(s, e, i), n, "{s}..{e} step {i}");
        }
    }

    #[test]
    fn oversize_grids_fail_validation() {
        for interval in [1e-12, 1e-300, 9.0 / 200_000.0] {
            let spec = SweepSpec::new(0.0, 9.0, 1.0, StepTrigger::ValueGrid {
                interval,
                tolerance: 1e-3,
            });
            assert!(
                matches!(spec.validate(AxisId::Field), Err(CryoError::InvalidRequest(_))),
                "interval {interval}"
            );
        }
        let at_limit = SweepSpec::new(0.0, 1.0, 1.0, StepTrigger::ValueGrid {
            interval: 1.0 / (MAX_GRID_POINTS - 1) as f64,
            tolerance: 1e-6,
        });
        assert!(at_limit.validate(AxisId::Field).is_ok());
    }

    #[test]
    fn sample_midpoint_brackets_channel_reads() {
        let h = SubsystemHandle::new(AxisId::Field, Box::new(ScriptedAxis::new([2.0, 2.4])));
        let mut channels: Vec<Box<dyn AuxChannel>> = vec![
            Box::new(ScriptedChannel::new("r_xx", [10.0])),
            Box::new(ScriptedChannel::new("r_xy", [-1.0])),
        ];
        let (mid, v2, readings) = sample_once(&h, &mut channels).unwrap();
        assert!((mid - 2.2).abs() < 1e-12);
        assert!((v2 - 2.4).abs() < 1e-12);
        assert_eq!(
            readings,
            vec![("r_xx".to_string(), 10.0), ("r_xy".to_string(), -1.0)]
        );
    }

    #[test]
    fn overshoot_extends_in_sweep_direction() {
        let up = SweepSpec::new(1.0, 2.0, 0.1, StepTrigger::Time {
            every: Duration::from_secs(1),
        })
        .with_overshoot(0.25);
        assert!((up.effective_end() - 2.25).abs() < 1e-12);
        let down = SweepSpec { start: 2.0, end: 1.0, ..up };
        assert!((down.effective_end() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn cursor_skips_points_passed_beyond_tolerance() {
        let mut c = GridCursor::new(vec![0.0, 1.0, 2.0, 3.0], 0.05);
        c.measured.insert(0);
        c.skip_passed(AxisId::Field, 1.0, 2.01);
        assert_eq!(c.skipped, BTreeSet::from([1]));
        assert_eq!(c.hit(2.01), Some(2));
    }
}
