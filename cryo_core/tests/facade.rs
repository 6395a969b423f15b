use std::sync::Arc;
use std::time::Duration;

use cryo_core::mocks::ScriptedAxis;
use cryo_core::{
    AxisActivity, AxisId, AxisSet, BuildError, ControllerFacade, OperatingMode, PollCfg,
};
use cryo_hardware::{SimCfg, SimCommand, SimulatedCryostat};
use cryo_traits::clock::test_clock::TestClock;

fn sim_facade() -> (ControllerFacade, SimulatedCryostat, TestClock) {
    let clock = TestClock::new();
    let sim = SimulatedCryostat::new(SimCfg::default(), Arc::new(clock.clone()));
    let mut b = ControllerFacade::builder().with_clock(Arc::new(clock.clone()));
    for a in AxisId::ALL {
        b = b.with_axis(a, sim.axis(a));
    }
    (b.build().expect("build"), sim, clock)
}

#[test]
fn builder_requires_every_axis() {
    let mut b = ControllerFacade::builder();
    for a in [AxisId::Field, AxisId::Temperature, AxisId::Adr, AxisId::Heater] {
        b = b.with_axis(a, ScriptedAxis::new([0.0]));
    }
    let err = b.build().unwrap_err();
    assert_eq!(
        err.downcast_ref::<BuildError>(),
        Some(&BuildError::MissingAxis(AxisId::Loader))
    );
}

#[test]
fn builder_rejects_zero_poll_period() {
    let mut b = ControllerFacade::builder().with_poll(PollCfg {
        ramp_period: Duration::ZERO,
        grid_period: Duration::from_millis(100),
    });
    for a in AxisId::ALL {
        b = b.with_axis(a, ScriptedAxis::new([0.0]));
    }
    assert!(matches!(
        b.build().unwrap_err().downcast_ref::<BuildError>(),
        Some(BuildError::InvalidConfig(_))
    ));
}

#[test]
fn builder_applies_config_sections() {
    let cfg = cryo_config::load_toml(
        r#"
        [controller]
        mode = "single-shot"
        [poll]
        ramp_poll_ms = 250
        grid_poll_ms = 50
        "#,
    )
    .expect("toml");
    let mut b = ControllerFacade::builder().apply_config(&cfg);
    for a in AxisId::ALL {
        b = b.with_axis(a, ScriptedAxis::new([0.0]));
    }
    let facade = b.build().expect("build");
    assert_eq!(facade.mode(), OperatingMode::SingleShot);
    assert_eq!(facade.ctx().poll.ramp_period, Duration::from_millis(250));
    assert_eq!(facade.ctx().poll.grid_period, Duration::from_millis(50));
}

#[test]
fn idle_cryostat_reports_every_axis_idle() {
    let (facade, _sim, _clock) = sim_facade();
    let status = facade.status().expect("status");
    assert_eq!(status.mode, OperatingMode::Continuous);
    assert_eq!(status.axes.len(), 5);
    for (row, axis) in status.axes.iter().zip(AxisId::ALL) {
        assert_eq!(row.axis, axis);
        assert_eq!(row.state, AxisActivity::Idle);
        assert!(row.blocked_by.is_empty());
    }
}

#[test]
fn active_adr_blocks_its_neighbours() {
    let (facade, sim, _clock) = sim_facade();
    sim.set_active(AxisId::Adr, true).expect("set active");
    let status = facade.status().expect("status");
    let row = |a: AxisId| status.axes[a.index()].clone();

    assert_eq!(row(AxisId::Adr).state, AxisActivity::Active);
    assert_eq!(row(AxisId::Heater).state, AxisActivity::Idle);
    for a in [AxisId::Field, AxisId::Temperature, AxisId::Loader] {
        let r = row(a);
        assert_eq!(r.state, AxisActivity::Blocked, "{a}");
        assert!(r.blocked);
        assert_eq!(r.blocked_by, AxisSet::from([AxisId::Adr]));
    }
}

#[test]
fn interrupt_clears_the_interlock() {
    let (facade, sim, _clock) = sim_facade();
    sim.set_active(AxisId::Adr, true).expect("set active");
    assert!(facade.field().blocked().expect("blocked").0);
    facade.interrupt(AxisId::Adr).expect("interrupt");
    assert_eq!(sim.commands(AxisId::Adr), vec![SimCommand::Stop]);
    assert!(!facade.field().blocked().expect("blocked").0);
}

#[test]
fn interrupt_does_not_wait_for_the_operation_lock() {
    let (facade, sim, _clock) = sim_facade();
    let _lease = facade.heater().lease().expect("lease");
    facade.interrupt(AxisId::Heater).expect("interrupt");
    assert_eq!(sim.commands(AxisId::Heater), vec![SimCommand::Stop]);
}

#[test]
fn simulated_field_ramp_lands_on_target() {
    let (facade, sim, clock) = sim_facade();
    let out = facade.ramp(AxisId::Field, 1.0, 1.0, None).expect("ramp");
    assert!((out.final_value - 1.0).abs() < 1e-9);
    // 60 s of slew plus the 2 s settle window at one poll per second
    assert!((62..=63).contains(&out.polls), "polls = {}", out.polls);
    assert_eq!(clock.sleeps(), out.polls);
    assert_eq!(sim.commands(AxisId::Field).len(), 1);
    assert!(!facade.field().active().expect("active"));
}

#[test]
fn simulated_temperature_ramp_below_floor_needs_single_shot() {
    let (facade, _sim, _clock) = sim_facade();
    assert!(facade.ramp(AxisId::Temperature, 0.2, 5.0, None).is_err());
    facade
        .set_mode(OperatingMode::SingleShot)
        .expect("set mode");
    let out = facade
        .ramp(AxisId::Temperature, 0.2, 5.0, None)
        .expect("ramp");
    assert!((out.final_value - 0.2).abs() < 1e-9);
}
