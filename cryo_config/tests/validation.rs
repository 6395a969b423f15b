use cryo_config::{ModeName, load_toml};
use rstest::rstest;

const FULL: &str = r#"
[controller]
mode = "single-shot"
continuous_floor_k = 0.3

[poll]
ramp_poll_ms = 500
grid_poll_ms = 50

[safety]
ramp_deadline_ms = 600000
sweep_deadline_ms = 0
stop_on_abort = false

[rates]
field = 0.2
adr = 0.05

[logging]
level = "debug"
rotation = "daily"

[sim]
time_scale = 60.0
settle_ms = 500

[sim.axes.field]
initial = 0.5
min = -1.0
max = 1.0

[[sim.interlocks]]
axis = "field"
while_active = ["adr"]

[[sim.channels]]
id = "hall"
source = "field"
gain = 2.0
"#;

#[test]
fn parses_full_config() {
    let cfg = load_toml(FULL).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.controller.mode, ModeName::SingleShot);
    assert_eq!(cfg.poll.grid_poll_ms, 50);
    assert!(!cfg.safety.stop_on_abort);
    assert_eq!(cfg.rates.field, 0.2);
    // unset rates keep their defaults
    assert_eq!(cfg.rates.temperature, 0.5);
    assert_eq!(cfg.sim.axes.field.initial, Some(0.5));
    assert_eq!(cfg.sim.axes.temperature.initial, None);
    assert_eq!(cfg.sim.interlocks.as_ref().map(Vec::len), Some(1));
    assert_eq!(cfg.sim.channels[0].gain, 2.0);
    assert_eq!(cfg.sim.channels[0].offset, 0.0);
}

#[test]
fn empty_config_uses_defaults() {
    let cfg = load_toml("").expect("parse TOML");
    cfg.validate().expect("defaults are valid");
    assert_eq!(cfg.controller.mode, ModeName::Continuous);
    assert_eq!(cfg.controller.continuous_floor_k, 0.3);
    assert_eq!(cfg.poll.ramp_poll_ms, 1000);
    assert!(cfg.safety.stop_on_abort);
    assert!(cfg.sim.interlocks.is_none());
}

#[rstest]
#[case("[poll]\nramp_poll_ms = 0\n", "poll.ramp_poll_ms must be >= 1")]
#[case("[poll]\ngrid_poll_ms = 0\n", "poll.grid_poll_ms must be >= 1")]
#[case(
    "[poll]\nramp_poll_ms = 100\ngrid_poll_ms = 200\n",
    "must not exceed poll.ramp_poll_ms"
)]
#[case("[rates]\nheater = 0.0\n", "rates.heater must be > 0")]
#[case("[controller]\ncontinuous_floor_k = -1.0\n", "continuous_floor_k")]
#[case("[logging]\nrotation = \"weekly\"\n", "logging.rotation")]
#[case("[sim]\ntime_scale = 0.0\n", "sim.time_scale must be > 0")]
#[case("[sim.axes.adr]\nmin = 2.0\nmax = 1.0\n", "sim.axes.adr: min must be < max")]
#[case(
    "[[sim.interlocks]]\naxis = \"adr\"\nwhile_active = [\"adr\"]\n",
    "cannot be blocked by itself"
)]
#[case(
    "[[sim.channels]]\nid = \"r\"\nsource = \"heater\"\n[[sim.channels]]\nid = \"r\"\nsource = \"field\"\n",
    "duplicate id 'r'"
)]
fn rejects_invalid_values(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    let msg = format!("{err}");
    assert!(msg.contains(needle), "expected '{needle}' in '{msg}'");
}

#[test]
fn rejects_unknown_axis_names() {
    let toml = "[[sim.channels]]\nid = \"x\"\nsource = \"magnet\"\n";
    assert!(load_toml(toml).is_err());
}

#[test]
fn rejects_unknown_mode() {
    assert!(load_toml("[controller]\nmode = \"turbo\"\n").is_err());
}

#[test]
fn shipped_sample_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../etc/cryo_config.toml");
    let text = std::fs::read_to_string(path).unwrap();
    let cfg = load_toml(&text).unwrap();
    cfg.validate().unwrap();
    assert_eq!(cfg.controller.mode, ModeName::Continuous);
    assert_eq!(cfg.sim.channels.len(), 2);
}

#[test]
fn names_convert_to_engine_ids() {
    use cryo_config::AxisName;
    use cryo_traits::{AxisId, OperatingMode};
    for id in AxisId::ALL {
        let name = AxisName::from(id);
        assert_eq!(name.as_str(), id.as_str());
        assert_eq!(AxisId::from(name), id);
    }
    assert_eq!(OperatingMode::from(ModeName::SingleShot), OperatingMode::SingleShot);
}
