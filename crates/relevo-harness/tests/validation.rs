//! Validation runs against real compiled units.
//!
//! The unit tests in `run.rs` use hand-rolled fakes; these go through the
//! actual build path: netlist text, lowered schedule, interpreted unit.

use relevo_compile::{InterpretedUnit, Schedule, parse_netlist};
use relevo_harness::{ParameterTimeline, TestFailure, TestSignal, ValidationConfig, validate};

const SR: f32 = 48000.0;
const BLOCK: usize = 256;

fn interpreted(text: &str) -> InterpretedUnit {
    let graph = parse_netlist(text).unwrap();
    let schedule = Schedule::from_graph(&graph).unwrap();
    InterpretedUnit::new(schedule, SR)
}

const PEDAL: &str = "graph pedal\n\
                     node in input\n\
                     node drive saturate shape=tanh drive@0\n\
                     node lp filter mode=lowpass cutoff_hz@1\n\
                     node echo delay time_ms=80 feedback@2\n\
                     node out output\n\
                     route in.0 -> drive.0\n\
                     route drive.0 -> lp.0\n\
                     route lp.0 -> echo.0\n\
                     route echo.0 -> out.0\n";

const TRIM: &str = "graph trim\n\
                    node in input\n\
                    node trim gain gain_db@0\n\
                    node out output\n\
                    route in.0 -> trim.0\n\
                    route trim.0 -> out.0\n";

#[test]
fn compiled_pedal_chain_passes() {
    let mut unit = interpreted(PEDAL);
    let run = validate(
        &mut unit,
        SR,
        BLOCK,
        &ParameterTimeline::new(),
        &ValidationConfig::default(),
    );

    assert!(run.passed(), "failure: {:?}", run.failure);
    assert_eq!(run.blocks, 64);
    assert!(run.peak > 0.0);
    assert!(run.cpu_fraction < 0.9);
}

#[test]
fn scripted_gain_drop_shows_up_in_the_stats() {
    let config = ValidationConfig {
        signal: TestSignal::Dc,
        ..ValidationConfig::default()
    };
    let half = (config.max_blocks * BLOCK / 2) as u64;

    let mut steady = interpreted(TRIM);
    let flat = validate(&mut steady, SR, BLOCK, &ParameterTimeline::new(), &config);
    assert!(flat.passed());
    assert!((flat.rms - 1.0).abs() < 1e-3);

    let mut timeline = ParameterTimeline::new();
    timeline.push(0, -60.0, half);
    let mut automated = interpreted(TRIM);
    let dropped = validate(&mut automated, SR, BLOCK, &timeline, &config);
    assert!(dropped.passed());

    // Half the run at unity, half near silence: power halves.
    let expected = flat.rms / std::f32::consts::SQRT_2;
    assert!(
        (dropped.rms - expected).abs() < 0.01,
        "rms {} vs expected {expected}",
        dropped.rms
    );
}

#[test]
fn zero_cpu_ceiling_rejects_a_real_unit() {
    let mut unit = interpreted(PEDAL);
    let config = ValidationConfig {
        cpu_ceiling: 0.0,
        ..ValidationConfig::default()
    };
    let run = validate(&mut unit, SR, BLOCK, &ParameterTimeline::new(), &config);

    assert!(matches!(
        run.failure,
        Some(TestFailure::CpuOverrun { .. })
    ));
}
