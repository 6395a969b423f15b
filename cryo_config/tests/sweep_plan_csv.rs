use std::fs::File;
use std::io::Write;

use cryo_config::{AxisName, SweepRow, TriggerKind, load_sweep_plan_csv, parse_sweep_plan};
use rstest::rstest;
use tempfile::tempdir;

const HEADER: &str = "axis,start,end,rate,trigger,interval,tolerance,overshoot";

#[rstest]
fn parses_mixed_plan_from_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("plan.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "{HEADER}").unwrap();
    writeln!(f, "temperature, 4.0, 1.0, 0.2, grid, 0.5, 0.02, 0.05").unwrap();
    writeln!(f, "field,0.0,1.0,0.1,time,10,,").unwrap();
    drop(f);

    let rows = load_sweep_plan_csv(&path).expect("load plan");
    assert_eq!(
        rows,
        vec![
            SweepRow {
                axis: AxisName::Temperature,
                start: 4.0,
                end: 1.0,
                rate: 0.2,
                trigger: TriggerKind::Grid,
                interval: 0.5,
                tolerance: Some(0.02),
                overshoot: Some(0.05),
            },
            SweepRow {
                axis: AxisName::Field,
                start: 0.0,
                end: 1.0,
                rate: 0.1,
                trigger: TriggerKind::Time,
                interval: 10.0,
                tolerance: None,
                overshoot: None,
            },
        ]
    );
}

#[rstest]
fn rejects_wrong_headers() {
    let csv = "axis,from,to,rate,trigger,interval,tolerance,overshoot\nfield,0,1,0.1,time,1,,\n";
    let err = parse_sweep_plan(csv.as_bytes()).expect_err("bad headers");
    assert!(format!("{err}").contains("must have headers"));
}

#[rstest]
#[case("field,1.0,1.0,0.1,time,1,,", "direction is ambiguous")]
#[case("field,0.0,1.0,0.0,time,1,,", "rate must be > 0")]
#[case("field,0.0,1.0,0.1,time,0,,", "interval must be > 0")]
#[case("adr,2.0,1.0,0.1,grid,0.1,,", "requires a tolerance")]
#[case("adr,2.0,1.0,0.1,grid,0.1,-0.1,", "tolerance must be > 0")]
#[case("adr,2.0,1.0,0.1,grid,0.1,0.01,-1", "overshoot must be >= 0")]
#[case("magnet,0.0,1.0,0.1,time,1,,", "row 2")]
fn rejects_invalid_rows(#[case] row: &str, #[case] needle: &str) {
    let csv = format!("{HEADER}\n{row}\n");
    let err = parse_sweep_plan(csv.as_bytes()).expect_err("should reject row");
    let msg = format!("{err}");
    assert!(msg.contains(needle), "expected '{needle}' in '{msg}'");
}

#[rstest]
fn rejects_empty_plan() {
    let csv = format!("{HEADER}\n");
    let err = parse_sweep_plan(csv.as_bytes()).expect_err("empty plan");
    assert!(format!("{err}").contains("no rows"));
}
