#![no_main]
use cryo_core::{AxisId, SweepSpec};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Every accepted row must have passed validation.
    if let Ok(rows) = cryo_config::parse_sweep_plan(data) {
        assert!(!rows.is_empty());
        for row in &rows {
            assert!(row.validate().is_ok());
            assert!(row.start != row.end);
            // Accepted grids stay within the point cap.
            if let Ok(spec) = SweepSpec::try_from(row)
                && spec.validate(AxisId::from(row.axis)).is_ok()
                && let cryo_core::StepTrigger::ValueGrid { interval, .. } = spec.trigger
            {
                let points = cryo_core::grid_points(spec.start, spec.end, interval);
                assert!(points.len() <= cryo_core::MAX_GRID_POINTS);
            }
        }
    }
});
