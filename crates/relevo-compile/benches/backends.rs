//! Criterion benchmarks comparing the processing backends.
//!
//! Measures the interpreter's per-frame schedule walk against the fused
//! straight-line executor on the same lowered schedules. Two axes:
//!
//! - **Build** — parse + lower cost per backend
//! - **Execute** — `process()` throughput at varying block sizes
//!
//! Run with: `cargo bench -p relevo-compile -- backends/`
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use relevo_compile::{FusedUnit, InterpretedUnit, Schedule, parse_netlist};
use relevo_core::{ParameterEvent, RenderUnit};

const SAMPLE_RATE: f32 = 48000.0;
const BLOCK_SIZES: &[usize] = &[64, 128, 256, 512, 1024];

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Serial pedalboard: saturate into filter into delay, one slot per stage.
const CHAIN: &str = "graph chain\n\
                     node in input\n\
                     node drive saturate shape=tanh drive@0\n\
                     node lp filter mode=lowpass cutoff_hz@1\n\
                     node echo delay time_ms=125 feedback@2\n\
                     node out output\n\
                     route in.0 -> drive.0\n\
                     route drive.0 -> lp.0\n\
                     route lp.0 -> echo.0\n\
                     route echo.0 -> out.0\n";

/// Wet/dry split with a crossfade at the end.
const SPLIT: &str = "graph split\n\
                     node in input\n\
                     node drive saturate shape=hard drive@0\n\
                     node echo delay time_ms=40 mix@1\n\
                     node blend mix balance@2\n\
                     node out output\n\
                     route in.0 -> drive.0\n\
                     route drive.0 -> echo.0\n\
                     route in.0 -> blend.0\n\
                     route echo.0 -> blend.1\n\
                     route blend.0 -> out.0\n";

fn schedule_for(text: &str) -> Schedule {
    let graph = parse_netlist(text).unwrap();
    Schedule::from_graph(&graph).unwrap()
}

fn signal(len: usize) -> Vec<f32> {
    (0..len).map(|i| ((i as f32) * 0.11).sin() * 0.7).collect()
}

// ---------------------------------------------------------------------------
// Build benchmarks
// ---------------------------------------------------------------------------

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("backends/build");

    group.bench_function("interpreted", |b| {
        b.iter(|| {
            let schedule = schedule_for(black_box(CHAIN));
            black_box(InterpretedUnit::new(schedule, SAMPLE_RATE));
        });
    });

    group.bench_function("fused", |b| {
        b.iter(|| {
            let schedule = schedule_for(black_box(CHAIN));
            black_box(FusedUnit::new(schedule, SAMPLE_RATE));
        });
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Execute benchmarks — block size sweep on the serial chain
// ---------------------------------------------------------------------------

fn bench_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("backends/execute");

    for &block_size in BLOCK_SIZES {
        let mut block = signal(block_size);

        let mut interp = InterpretedUnit::new(schedule_for(CHAIN), SAMPLE_RATE);
        interp.prepare(SAMPLE_RATE, block_size);
        group.bench_with_input(
            BenchmarkId::new("interpreted", block_size),
            &block_size,
            |b, _| {
                b.iter(|| {
                    interp.process(black_box(&mut block), &[]);
                    black_box(&block);
                });
            },
        );

        let mut fused = FusedUnit::new(schedule_for(CHAIN), SAMPLE_RATE);
        fused.prepare(SAMPLE_RATE, block_size);
        group.bench_with_input(
            BenchmarkId::new("fused", block_size),
            &block_size,
            |b, _| {
                b.iter(|| {
                    fused.process(black_box(&mut block), &[]);
                    black_box(&block);
                });
            },
        );
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Automation cost — event splitting on the split topology, 256 frames
// ---------------------------------------------------------------------------

fn bench_automation(c: &mut Criterion) {
    let mut group = c.benchmark_group("backends/automation");

    let events: Vec<ParameterEvent> = (0..8)
        .map(|i| ParameterEvent::at(i % 3, 0.4, i * 31))
        .collect();
    let mut block = signal(256);

    let mut interp = InterpretedUnit::new(schedule_for(SPLIT), SAMPLE_RATE);
    interp.prepare(SAMPLE_RATE, 256);
    group.bench_function("interpreted_8ev_block256", |b| {
        b.iter(|| {
            interp.process(black_box(&mut block), black_box(&events));
            black_box(&block);
        });
    });

    let mut fused = FusedUnit::new(schedule_for(SPLIT), SAMPLE_RATE);
    fused.prepare(SAMPLE_RATE, 256);
    group.bench_function("fused_8ev_block256", |b| {
        b.iter(|| {
            fused.process(black_box(&mut block), black_box(&events));
            black_box(&block);
        });
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

criterion_group!(benches, bench_build, bench_execute, bench_automation);
criterion_main!(benches);
