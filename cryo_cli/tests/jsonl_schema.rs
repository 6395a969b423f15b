use assert_cmd::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[poll]
ramp_poll_ms = 5
grid_poll_ms = 1

[safety]
sweep_deadline_ms = 10000

[sim]
time_scale = 600.0
settle_ms = 200

[[sim.channels]]
id = "hall"
source = "field"
gain = 2.0
offset = 0.5

[[sim.channels]]
id = "stage_t"
source = "temperature"
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn json_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap_or_else(|e| panic!("not JSON ({e}): {l}")))
        .collect()
}

/// A successful ramp prints exactly one `ramp` object.
#[rstest]
fn jsonl_ramp_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("cryo").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("warn")
        .arg("--config")
        .arg(&cfg)
        .args(["ramp", "--axis", "field", "--target", "0.4", "--rate", "0.6"]);
    let out = cmd.output().unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let lines = json_lines(&out.stdout);
    assert_eq!(lines.len(), 1);
    let v = &lines[0];
    assert_eq!(v["event"], "ramp");
    assert_eq!(v["axis"], "field");
    assert_eq!(v["mode"], "continuous");
    for key in ["target", "rate", "final_value", "polls", "duration_ms"] {
        assert!(v.get(key).is_some(), "missing key {key}");
    }
    let final_value = v["final_value"].as_f64().unwrap();
    assert!((final_value - 0.4).abs() < 1e-9, "final_value = {final_value}");
}

/// Grid sweeps print one `sample` per measured point, then a `sweep_end`.
#[rstest]
fn jsonl_sweep_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("cryo").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("warn")
        .arg("--config")
        .arg(&cfg)
        .args([
            "sweep",
            "--axis",
            "field",
            "--start",
            "0",
            "--end",
            "0.5",
            "--rate",
            "0.6",
            "--grid",
            "0.25",
            "--tolerance",
            "0.05",
            "--channel",
            "hall",
        ]);
    let out = cmd.output().unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let lines = json_lines(&out.stdout);
    let (end, samples) = lines.split_last().expect("at least the end line");
    assert_eq!(end["event"], "sweep_end");
    assert_eq!(end["axis"], "field");
    assert!(matches!(
        end["reason"].as_str(),
        Some("passed-end" | "settled" | "grid-complete")
    ));
    assert_eq!(end["samples"].as_u64(), Some(samples.len() as u64));
    assert!(!samples.is_empty());

    for (i, s) in samples.iter().enumerate() {
        assert_eq!(s["event"], "sample");
        assert_eq!(s["index"].as_u64(), Some(i as u64));
        let readings = s["readings"].as_object().unwrap();
        assert_eq!(readings.len(), 1, "only the requested channel");
        let hall = readings["hall"].as_f64().unwrap();
        let point = s["grid_point"].as_f64().unwrap();
        // hall = 2 * field + 0.5; field was near the grid point when sampled
        assert!((hall - (2.0 * point + 0.5)).abs() <= 0.2, "{s}");
    }
    // Grid points are visited in sweep order.
    let points: Vec<f64> = samples
        .iter()
        .map(|s| s["grid_point"].as_f64().unwrap())
        .collect();
    assert!(points.windows(2).all(|w| w[0] < w[1]), "{points:?}");
}

#[rstest]
fn jsonl_status_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("cryo").unwrap();
    cmd.arg("--json")
        .arg("--config")
        .arg(&cfg)
        .arg("status");
    let out = cmd.output().unwrap();
    assert!(out.status.success());

    let lines = json_lines(&out.stdout);
    assert_eq!(lines.len(), 1);
    let v = &lines[0];
    assert_eq!(v["event"], "status");
    let axes = v["axes"].as_array().unwrap();
    let names: Vec<&str> = axes.iter().map(|a| a["axis"].as_str().unwrap()).collect();
    assert_eq!(names, ["field", "temperature", "adr", "heater", "loader"]);
    for a in axes {
        assert_eq!(a["state"], "idle");
        assert_eq!(a["blocked_by"], serde_json::json!([]));
    }
}

#[rstest]
fn jsonl_error_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("cryo").unwrap();
    cmd.arg("--json")
        .arg("--config")
        .arg(&cfg)
        .args(["ramp", "--axis", "adr", "--target", "0.1"]);
    let out = cmd.output().unwrap();
    assert_eq!(out.status.code(), Some(4));

    let lines = json_lines(&out.stdout);
    let v = lines.last().unwrap();
    assert_eq!(v["reason"], "RangeViolation");
    assert_eq!(v["details"]["mode"], "continuous");
    assert_eq!(v["details"]["floor"].as_f64(), Some(0.3));
    assert!(v["message"].as_str().unwrap().contains("What happened"));
}
