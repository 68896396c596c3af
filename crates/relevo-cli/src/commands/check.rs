//! Offline graph validation command.
//!
//! Runs the same path a live edit would take, minus the swap: generate
//! netlist text, build a unit, and put it through the validation harness.

use std::path::PathBuf;

use clap::Args;
use relevo_compile::{FusedUnit, InterpretedUnit, Schedule, parse_netlist};
use relevo_config::EngineConfig;
use relevo_core::{RenderUnit, SourceMode};
use relevo_harness::{ParameterTimeline, TestSignal, ValidationConfig, validate};

use super::common::{CliMode, load_graph, seed_bound_values};

#[derive(Args)]
pub struct CheckArgs {
    /// Graph JSON file
    #[arg(value_name = "GRAPH")]
    graph: PathBuf,

    /// Backend to build
    #[arg(long, value_enum, default_value = "interpreted")]
    mode: CliMode,

    /// Sample rate for the validation run
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Block size for the validation run
    #[arg(long, default_value = "512")]
    block_size: usize,

    /// Blocks to render (defaults to the config value)
    #[arg(long)]
    blocks: Option<usize>,

    /// CPU ceiling as a fraction of realtime (defaults to the config value)
    #[arg(long)]
    cpu_ceiling: Option<f64>,

    /// Test signal: silence, dc, ramp, fastramp, impulse, sine[:HZ],
    /// saw[:HZ], sweep[:START:END], noise[:SEED], or a WAV file path
    #[arg(long, value_parser = parse_signal, default_value = "sine:1000")]
    signal: TestSignal,

    /// Engine config TOML (defaults apply when absent)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn parse_signal(s: &str) -> Result<TestSignal, String> {
    if s.to_lowercase().ends_with(".wav") {
        return Ok(TestSignal::WavFile(PathBuf::from(s)));
    }

    let mut parts = s.split(':');
    let head = parts.next().unwrap_or("").to_lowercase();
    let rest: Vec<&str> = parts.collect();
    let num = |i: usize, fallback: f32| -> Result<f32, String> {
        match rest.get(i) {
            None => Ok(fallback),
            Some(v) => v.parse().map_err(|_| format!("'{}' is not a number", v)),
        }
    };

    match head.as_str() {
        "silence" => Ok(TestSignal::Silence),
        "dc" => Ok(TestSignal::Dc),
        "ramp" => Ok(TestSignal::Ramp),
        "fastramp" => Ok(TestSignal::FastRamp),
        "impulse" => Ok(TestSignal::Impulse),
        "sine" => Ok(TestSignal::Sine {
            freq_hz: num(0, 1000.0)?,
        }),
        "saw" => Ok(TestSignal::Saw {
            freq_hz: num(0, 220.0)?,
        }),
        "sweep" => Ok(TestSignal::Sweep {
            start_hz: num(0, 20.0)?,
            end_hz: num(1, 20000.0)?,
        }),
        "noise" => {
            let seed = match rest.first() {
                None => 0,
                Some(v) => v.parse().map_err(|_| format!("'{}' is not a seed", v))?,
            };
            Ok(TestSignal::Noise { seed })
        }
        other => Err(format!(
            "unknown signal '{}' (try sine, sweep, noise, impulse, or a .wav path)",
            other
        )),
    }
}

pub fn run(args: CheckArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    println!("Reading {}...", args.graph.display());
    let graph = load_graph(&args.graph)?;
    println!("  graph '{}': {} node(s)", graph.name, graph.nodes().len());

    let netlist = relevo_codegen::generate(&graph)
        .map_err(|e| anyhow::anyhow!("graph rejected: {}", e))?;
    println!("\nGenerated netlist:");
    for line in netlist.lines() {
        println!("  {}", line);
    }

    // Bound values travel with the snapshot, not the text. Show them so a
    // bare netlist above is not mistaken for the whole story.
    let mut bound: Vec<(u32, String, f32)> = graph
        .nodes()
        .iter()
        .flat_map(|n| {
            n.params
                .iter()
                .map(|p| (p.slot, format!("{}.{}", n.name, p.name), p.value))
        })
        .collect();
    bound.sort_by_key(|(slot, ..)| *slot);
    if !bound.is_empty() {
        println!("\nBound values (outside the text):");
        for (slot, name, value) in &bound {
            println!("  @{}: {} = {}", slot, name, value);
        }
    }

    let sample_rate = args.sample_rate as f32;
    let parsed = parse_netlist(&netlist)?;
    let schedule = Schedule::from_graph(&parsed)?;
    let slots = schedule.slot_count();

    let mode = SourceMode::from(args.mode);
    let mut unit: Box<dyn RenderUnit> = match args.mode {
        CliMode::Interpreted => Box::new(InterpretedUnit::new(schedule, sample_rate)),
        CliMode::Jit => Box::new(FusedUnit::new(schedule, sample_rate)),
    };
    seed_bound_values(unit.as_mut(), &graph);

    let vconfig = ValidationConfig {
        signal: args.signal,
        max_blocks: args.blocks.unwrap_or(config.validation.max_blocks),
        cpu_ceiling: args.cpu_ceiling.unwrap_or(config.validation.cpu_ceiling),
    };

    println!(
        "\nValidating {} unit: {} block(s) of {} at {} Hz...",
        mode, vconfig.max_blocks, args.block_size, args.sample_rate
    );
    let run = validate(
        unit.as_mut(),
        sample_rate,
        args.block_size,
        &ParameterTimeline::new(),
        &vconfig,
    );

    println!(
        "  {} blocks, {} samples, {} automation slot(s)",
        run.blocks, run.samples, slots
    );
    println!(
        "  Peak {:.1} dB, RMS {:.1} dB",
        linear_to_db(run.peak),
        linear_to_db(run.rms)
    );
    println!(
        "  CPU {:.2}% of realtime (ceiling {:.0}%)",
        run.cpu_fraction * 100.0,
        vconfig.cpu_ceiling * 100.0
    );

    match run.failure {
        None => {
            println!("\nCheck passed.");
            Ok(())
        }
        Some(failure) => anyhow::bail!("check failed: {}", failure),
    }
}

fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        -120.0
    } else {
        20.0 * linear.log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_tokens_parse() {
        assert_eq!(parse_signal("silence").unwrap(), TestSignal::Silence);
        assert_eq!(
            parse_signal("sine").unwrap(),
            TestSignal::Sine { freq_hz: 1000.0 }
        );
        assert_eq!(
            parse_signal("sine:440").unwrap(),
            TestSignal::Sine { freq_hz: 440.0 }
        );
        assert_eq!(
            parse_signal("sweep:100:8000").unwrap(),
            TestSignal::Sweep {
                start_hz: 100.0,
                end_hz: 8000.0
            }
        );
        assert_eq!(
            parse_signal("noise:7").unwrap(),
            TestSignal::Noise { seed: 7 }
        );
        assert_eq!(
            parse_signal("riff.wav").unwrap(),
            TestSignal::WavFile(PathBuf::from("riff.wav"))
        );
    }

    #[test]
    fn bad_signal_tokens_are_refused() {
        assert!(parse_signal("warble").is_err());
        assert!(parse_signal("sine:loud").is_err());
        assert!(parse_signal("noise:many").is_err());
    }
}
