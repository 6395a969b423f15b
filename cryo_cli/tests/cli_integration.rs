use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Fast simulator: ten simulated minutes per wall-clock second.
const FAST_SIM: &str = r#"
[poll]
ramp_poll_ms = 5
grid_poll_ms = 1

[safety]
ramp_deadline_ms = 10000
sweep_deadline_ms = 10000

[sim]
time_scale = 600.0
settle_ms = 200
"#;

fn write_config(dir: &tempfile::TempDir, extra: &str) -> PathBuf {
    let path = dir.path().join("cfg.toml");
    fs::write(&path, format!("{FAST_SIM}\n{extra}")).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["ramp", "--axis", "field", "--target", "0.5", "--rate", "0.6"], 0, "ramp complete: field", "stdout")]
#[case(&["ramp", "--axis", "field", "--target", "-0.25", "--rate", "0.6"], 0, "ramp complete", "stdout")]
#[case(&["ramp", "--axis", "bogus", "--target", "1"], 2, "unknown axis", "stderr")]
#[case(&["ramp", "--axis", "temperature", "--target", "0.1"], 4, "below the 0.3 K floor", "stderr")]
#[case(&["ramp", "--axis", "heater", "--target", "5", "--auto-regenerate"], 1, "adr only", "stderr")]
#[case(&["sweep", "--axis", "field", "--start", "0.2", "--end", "0.2", "--every-s", "0.01"], 5, "both 0.2", "stderr")]
#[case(&["sweep", "--axis", "field", "--start", "0", "--end", "0.5", "--rate", "0.6", "--every-s", "0.01"], 0, "sweep complete: field", "stdout")]
#[case(&["sweep", "--axis", "field", "--start", "0", "--end", "9", "--grid", "1e-12", "--tolerance", "1e-13"], 1, "limit is 100000", "stderr")]
#[case(&["sweep", "--axis", "field", "--start", "0", "--end", "0.5"], 1, "choose a trigger", "stderr")]
#[case(&["status"], 0, "mode: continuous", "stdout")]
#[case(&["interrupt", "--axis", "heater"], 0, "interrupted heater", "stdout")]
#[case(&["self-check"], 0, "OK", "stdout")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");

    let mut cmd = Command::cargo_bin("cryo").unwrap();
    cmd.arg("--config").arg(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        _ => {
            assert.stderr(predicate::str::contains(needle));
        }
    }
}

#[rstest]
fn engaged_sibling_blocks_ramp() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[sim.axes.adr]\nactive = true\n");

    let mut cmd = Command::cargo_bin("cryo").unwrap();
    cmd.arg("--config")
        .arg(&cfg)
        .args(["ramp", "--axis", "field", "--target", "0.5"]);
    cmd.assert()
        .code(3)
        .stderr(predicate::str::contains(
            "What happened: The field axis is blocked by adr",
        ));

    // Nothing was commanded, so a status read still shows the block.
    let mut status = Command::cargo_bin("cryo").unwrap();
    status.arg("--config").arg(&cfg).arg("status");
    status
        .assert()
        .success()
        .stdout(predicate::str::contains("blocked (blocked by adr)"));
}

#[rstest]
fn single_shot_ramp_reaches_below_floor() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");

    let mut cmd = Command::cargo_bin("cryo").unwrap();
    cmd.arg("--config").arg(&cfg).args([
        "ramp",
        "--axis",
        "adr",
        "--target",
        "0.2",
        "--rate",
        "6",
        "--mode",
        "single-shot",
    ]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("ramp complete: adr = 0.2"));
}

#[rstest]
fn short_deadline_aborts_ramp() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");

    let mut cmd = Command::cargo_bin("cryo").unwrap();
    cmd.arg("--config").arg(&cfg).args([
        "ramp",
        "--axis",
        "heater",
        "--target",
        "90",
        "--rate",
        "0.01",
        "--deadline-ms",
        "30",
    ]);
    cmd.assert()
        .code(6)
        .stderr(predicate::str::contains("did not settle within 30 ms"));
}

#[rstest]
fn sweep_plan_with_bad_headers_is_rejected() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let plan = dir.path().join("plan.csv");
    fs::write(&plan, "axis,from,to\nfield,0,1\n").unwrap();

    let mut cmd = Command::cargo_bin("cryo").unwrap();
    cmd.arg("--config")
        .arg(&cfg)
        .arg("sweep")
        .arg("--plan")
        .arg(&plan);
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid headers in sweep plan CSV"));
}

#[rstest]
fn sweep_plan_runs_every_row() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let plan = dir.path().join("plan.csv");
    fs::write(
        &plan,
        "axis,start,end,rate,trigger,interval,tolerance,overshoot\n\
         field,0.0,0.3,0.6,time,0.01,,\n\
         heater,0.0,2.0,6.0,grid,0.5,0.2,\n",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("cryo").unwrap();
    cmd.arg("--config")
        .arg(&cfg)
        .arg("sweep")
        .arg("--plan")
        .arg(&plan);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("sweep complete: field"))
        .stdout(predicate::str::contains("sweep complete: heater"));
}

#[rstest]
fn oversize_grid_row_rejects_the_whole_plan() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let plan = dir.path().join("plan.csv");
    fs::write(
        &plan,
        "axis,start,end,rate,trigger,interval,tolerance,overshoot\n\
         field,0.0,0.3,0.6,time,0.01,,\n\
         field,0.0,9.0,0.6,grid,1e-300,1e-301,\n",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("cryo").unwrap();
    cmd.arg("--config")
        .arg(&cfg)
        .arg("sweep")
        .arg("--plan")
        .arg(&plan);
    cmd.assert()
        .code(1)
        .stdout(predicate::str::contains("sweep complete").not())
        .stderr(predicate::str::contains("limit is 100000"));
}

#[rstest]
fn missing_config_explains_itself() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("cryo").unwrap();
    cmd.arg("--config")
        .arg(dir.path().join("nope.toml"))
        .arg("status");
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration could not be loaded"));
}

#[rstest]
fn invalid_config_values_fail_validation() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[rates]\nfield = 0.0\n");
    let mut cmd = Command::cargo_bin("cryo").unwrap();
    cmd.arg("--config").arg(&cfg).arg("self-check");
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("rates.field must be > 0"));
}
