//! Command execution: backend assembly, ramps, sweeps and status output.

use std::sync::Arc;
use std::time::Duration;

use cryo_core::{
    AxisId, CancelToken, ControllerFacade, CryoError, MeasuredSample, ModeParams, OperatingMode,
    RampRequest, StepTrigger, SweepSpec, Watchdog,
};
use cryo_hardware::{Interlock, SimAxisCfg, SimCfg, SimulatedCryostat, default_interlocks};
use cryo_traits::{AuxChannel, MonotonicClock};
use eyre::{Result, WrapErr};
use serde_json::json;

/// Env var that makes every simulated read time out (fault injection for tests).
pub const SIM_TIMEOUT_ENV: &str = "CRYO_TEST_SIM_TIMEOUT";

/// Map the `[sim]` section onto the simulator's own config.
pub fn sim_cfg(cfg: &cryo_config::Sim) -> SimCfg {
    let axes = AxisId::ALL.map(|a| {
        let d = SimAxisCfg::defaults_for(a);
        let o = cfg.axes.for_axis(a.into());
        SimAxisCfg {
            initial: o.initial.unwrap_or(d.initial),
            min: o.min.unwrap_or(d.min),
            max: o.max.unwrap_or(d.max),
            holds: o.holds.unwrap_or(d.holds),
            active: o.active.unwrap_or(d.active),
        }
    });
    let interlocks = cfg.interlocks.as_ref().map_or_else(default_interlocks, |list| {
        list.iter()
            .map(|il| Interlock {
                axis: il.axis.into(),
                while_active: il.while_active.iter().map(|&a| a.into()).collect(),
            })
            .collect()
    });
    SimCfg {
        time_scale: cfg.time_scale,
        settle: Duration::from_millis(cfg.settle_ms),
        axes,
        interlocks,
        fail_reads: std::env::var_os(SIM_TIMEOUT_ENV).is_some(),
    }
}

/// Simulated cryostat plus a facade over its five axes.
pub struct Backend {
    pub facade: ControllerFacade,
    pub sim: SimulatedCryostat,
}

pub fn build_backend(cfg: &cryo_config::Config, cancel: CancelToken) -> Result<Backend> {
    let clock = Arc::new(MonotonicClock::new());
    let sim = SimulatedCryostat::new(sim_cfg(&cfg.sim), clock.clone());
    let mut builder = ControllerFacade::builder()
        .with_clock(clock)
        .apply_config(cfg)
        .with_cancel_token(cancel);
    for axis in AxisId::ALL {
        builder = builder.with_axis(axis, sim.axis(axis));
    }
    let facade = builder.build().wrap_err("assemble controller")?;
    tracing::debug!(time_scale = cfg.sim.time_scale, "simulated cryostat ready");
    Ok(Backend { facade, sim })
}

/// Configured channels, optionally narrowed to `wanted` (in that order).
fn channels(
    cfg: &cryo_config::Config,
    sim: &SimulatedCryostat,
    wanted: &[String],
) -> Result<Vec<Box<dyn AuxChannel>>> {
    let make = |c: &cryo_config::SimChannel| -> Box<dyn AuxChannel> {
        Box::new(sim.channel(c.id.clone(), c.source.into(), c.gain, c.offset))
    };
    if wanted.is_empty() {
        return Ok(cfg.sim.channels.iter().map(&make).collect());
    }
    wanted
        .iter()
        .map(|id| {
            cfg.sim
                .channels
                .iter()
                .find(|c| &c.id == id)
                .map(&make)
                .ok_or_else(|| eyre::eyre!("unknown channel '{id}'"))
        })
        .collect()
}

fn watchdog(base: Watchdog, deadline_ms: Option<u64>) -> Watchdog {
    match deadline_ms {
        Some(0) => Watchdog {
            deadline: None,
            ..base
        },
        Some(ms) => base.with_deadline(Duration::from_millis(ms)),
        None => base,
    }
}

pub struct RampArgs {
    pub axis: AxisId,
    pub target: f64,
    pub rate: Option<f64>,
    pub mode: Option<OperatingMode>,
    pub auto_regenerate: bool,
    pub pre_regenerate: bool,
    pub deadline_ms: Option<u64>,
}

pub fn run_ramp(cfg: &cryo_config::Config, be: &Backend, args: &RampArgs, json: bool) -> Result<()> {
    let f = &be.facade;
    let rate = args.rate.unwrap_or_else(|| cfg.rates.for_axis(args.axis.into()));
    let mut request = RampRequest::new(args.target, rate);
    if args.axis == AxisId::Adr && (args.mode.is_some() || args.auto_regenerate || args.pre_regenerate) {
        request = request.with_mode_params(ModeParams {
            mode: f.ctx().arbiter.resolve_mode(args.mode, f.mode()),
            auto_regenerate: args.auto_regenerate,
            pre_regenerate: args.pre_regenerate,
        });
    } else if args.auto_regenerate || args.pre_regenerate {
        return Err(CryoError::InvalidRequest(format!(
            "regeneration flags apply to adr only, not {}",
            args.axis
        ))
        .into());
    }

    let started = std::time::Instant::now();
    let out = f.ramp_with(
        args.axis,
        request,
        args.mode,
        &watchdog(f.ramp_watchdog(), args.deadline_ms),
    )?;
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    if json {
        println!(
            "{}",
            json!({
                "event": "ramp",
                "axis": out.axis.as_str(),
                "target": args.target,
                "rate": rate,
                "mode": f.mode().as_str(),
                "final_value": out.final_value,
                "polls": out.polls,
                "duration_ms": duration_ms,
            })
        );
    } else {
        println!(
            "ramp complete: {} = {:.6} after {} polls ({duration_ms} ms)",
            out.axis, out.final_value, out.polls
        );
    }
    Ok(())
}

pub struct InlineSweep {
    pub axis: AxisId,
    pub start: f64,
    pub end: f64,
    pub rate: Option<f64>,
    pub every_s: Option<f64>,
    pub grid: Option<f64>,
    pub tolerance: Option<f64>,
    pub overshoot: Option<f64>,
}

impl InlineSweep {
    fn spec(&self, cfg: &cryo_config::Config) -> Result<SweepSpec> {
        let trigger = match (self.grid, self.tolerance, self.every_s) {
            (Some(interval), Some(tolerance), _) => StepTrigger::ValueGrid {
                interval,
                tolerance,
            },
            (Some(_), None, _) => eyre::bail!("--grid requires --tolerance"),
            (None, _, Some(secs)) => StepTrigger::Time {
                every: Duration::try_from_secs_f64(secs)
                    .map_err(|e| eyre::eyre!("--every-s {secs}: {e}"))?,
            },
            (None, _, None) => eyre::bail!("choose a trigger: --every-s SECS or --grid INTERVAL --tolerance T"),
        };
        let rate = self
            .rate
            .unwrap_or_else(|| cfg.rates.for_axis(self.axis.into()));
        let mut spec = SweepSpec::new(self.start, self.end, rate, trigger);
        spec.overshoot = self.overshoot;
        Ok(spec)
    }
}

fn print_sample(axis: AxisId, s: &MeasuredSample, json: bool) {
    if json {
        let readings: serde_json::Map<String, serde_json::Value> = s
            .readings
            .iter()
            .map(|(id, v)| (id.clone(), json!(v)))
            .collect();
        println!(
            "{}",
            json!({
                "event": "sample",
                "axis": axis.as_str(),
                "index": s.index,
                "axis_value": s.axis_value,
                "grid_point": s.grid_point,
                "readings": readings,
            })
        );
    } else {
        let cols: Vec<String> = s
            .readings
            .iter()
            .map(|(id, v)| format!("{id}={v:.6}"))
            .collect();
        println!(
            "{:>5}  {axis}={:.6}  {}",
            s.index,
            s.axis_value,
            cols.join("  ")
        );
    }
}

fn run_one_sweep(
    cfg: &cryo_config::Config,
    be: &Backend,
    axis: AxisId,
    spec: SweepSpec,
    wanted: &[String],
    deadline_ms: Option<u64>,
    json: bool,
) -> Result<()> {
    let f = &be.facade;
    let chans = channels(cfg, &be.sim, wanted)?;
    let wd = watchdog(f.sweep_watchdog(), deadline_ms);
    let mut sweep = f.sweep_with(axis, spec, chans, None, &wd)?;
    for sample in sweep.by_ref() {
        print_sample(axis, &sample?, json);
    }
    let reason = sweep.outcome().map_or("unknown", |e| e.as_str());
    let skipped = sweep.skipped_grid_points();
    if json {
        println!(
            "{}",
            json!({
                "event": "sweep_end",
                "axis": axis.as_str(),
                "reason": reason,
                "samples": sweep.samples_emitted(),
                "last_value": sweep.last_value(),
                "skipped_grid_points": skipped,
            })
        );
    } else {
        println!(
            "sweep complete: {axis} {reason} after {} samples, last value {:.6}",
            sweep.samples_emitted(),
            sweep.last_value()
        );
        if !skipped.is_empty() {
            println!("skipped grid points: {skipped:?}");
        }
    }
    Ok(())
}

pub fn run_sweep(
    cfg: &cryo_config::Config,
    be: &Backend,
    inline: Option<InlineSweep>,
    plan: Option<&std::path::Path>,
    wanted: &[String],
    deadline_ms: Option<u64>,
    json: bool,
) -> Result<()> {
    if let Some(path) = plan {
        let rows = cryo_config::load_sweep_plan_csv(path)?;
        tracing::info!(rows = rows.len(), path = %path.display(), "running sweep plan");
        // Reject the whole plan before the first row moves anything.
        let specs = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let axis: AxisId = row.axis.into();
                SweepSpec::try_from(row)
                    .and_then(|spec| spec.validate(axis).map(|()| (axis, spec)))
                    .wrap_err_with(|| format!("sweep plan row {}", i + 2))
            })
            .collect::<Result<Vec<_>>>()?;
        for (axis, spec) in specs {
            run_one_sweep(cfg, be, axis, spec, wanted, deadline_ms, json)?;
        }
        return Ok(());
    }
    let inline = inline.ok_or_else(|| eyre::eyre!("sweep needs --axis/--start/--end or --plan"))?;
    let spec = inline.spec(cfg)?;
    run_one_sweep(cfg, be, inline.axis, spec, wanted, deadline_ms, json)
}

pub fn run_status(be: &Backend, json: bool) -> Result<()> {
    let st = be.facade.status()?;
    if json {
        let axes: Vec<_> = st
            .axes
            .iter()
            .map(|a| {
                json!({
                    "axis": a.axis.as_str(),
                    "state": a.state.as_str(),
                    "active": a.active,
                    "blocked": a.blocked,
                    "blocked_by": a.blocked_by.iter().map(|b| b.as_str()).collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", json!({ "event": "status", "mode": st.mode.as_str(), "axes": axes }));
    } else {
        println!("mode: {}", st.mode);
        for a in &st.axes {
            if a.blocked_by.is_empty() {
                println!("{:<12} {}", a.axis.as_str(), a.state);
            } else {
                println!(
                    "{:<12} {} (blocked by {})",
                    a.axis.as_str(),
                    a.state,
                    cryo_core::error::format_axes(&a.blocked_by)
                );
            }
        }
    }
    Ok(())
}

pub fn run_interrupt(be: &Backend, axis: AxisId, json: bool) -> Result<()> {
    be.facade.interrupt(axis)?;
    if json {
        println!("{}", json!({ "event": "interrupt", "axis": axis.as_str() }));
    } else {
        println!("interrupted {axis}");
    }
    Ok(())
}

/// Every axis must answer a full snapshot.
pub fn self_check(be: &Backend) -> Result<()> {
    for axis in AxisId::ALL {
        be.facade
            .handle(axis)
            .snapshot()
            .wrap_err_with(|| format!("self-check {axis}"))?;
    }
    println!("OK");
    Ok(())
}
