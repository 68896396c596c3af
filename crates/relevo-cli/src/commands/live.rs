//! Live engine command: compile, validate, and swap while audio plays.
//!
//! Drives the full engine path with a real audio stream. A looped WAV or
//! a test tone feeds the active unit from the output callback; the main
//! thread pumps the engine and prints its events. With `--watch`, edits
//! saved to the graph file recompile live and the replacement is adopted
//! at a block boundary, which is the whole point of the engine.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use clap::Args;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use relevo_engine::{DynamicArtifact, Engine, EngineConfig, EngineEvent, SourceMode};

use super::common::{CliMode, load_graph, parse_slot_val};
use crate::wav::read_wav;

#[derive(Args)]
pub struct LiveArgs {
    /// Graph JSON file to compile
    #[arg(short, long)]
    graph: Option<PathBuf>,

    /// Raw netlist text file to run as custom code
    #[arg(short, long)]
    netlist: Option<PathBuf>,

    /// Prebuilt artifact manifest to run
    #[arg(short, long)]
    artifact: Option<PathBuf>,

    /// Backend for graph sources
    #[arg(long, value_enum, default_value = "interpreted")]
    mode: CliMode,

    /// WAV file looped through the graph (a test tone plays when absent)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Test tone frequency in Hz
    #[arg(long, default_value = "220.0")]
    freq: f32,

    /// Test tone amplitude (0-1)
    #[arg(long, default_value = "0.5")]
    amplitude: f32,

    /// Output device name
    #[arg(long)]
    device: Option<String>,

    /// Sample rate
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Buffer size in frames
    #[arg(long, default_value = "256")]
    buffer_size: u32,

    /// Initial parameter overrides (e.g. "0=-6.0")
    #[arg(long, value_parser = parse_slot_val, number_of_values = 1)]
    set: Vec<(u32, f32)>,

    /// Engine config TOML (defaults apply when absent)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Recompile when the graph file changes on disk
    #[arg(long)]
    watch: bool,
}

/// What the output callback feeds into the active unit.
enum LiveSource {
    /// A WAV file played end to end, forever.
    Loop { samples: Vec<f32>, pos: usize },
    /// A fixed sine, generated in place.
    Tone {
        phase: f32,
        step: f32,
        amplitude: f32,
    },
}

impl LiveSource {
    fn fill(&mut self, out: &mut [f32]) {
        match self {
            Self::Loop { samples, pos } => {
                for sample in out.iter_mut() {
                    *sample = samples[*pos];
                    *pos = (*pos + 1) % samples.len();
                }
            }
            Self::Tone {
                phase,
                step,
                amplitude,
            } => {
                for sample in out.iter_mut() {
                    *sample = (std::f32::consts::TAU * *phase).sin() * *amplitude;
                    *phase = (*phase + *step).fract();
                }
            }
        }
    }
}

pub fn run(args: LiveArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if args.watch && args.graph.is_none() {
        anyhow::bail!("--watch needs --graph");
    }

    let (mut engine, events) = Engine::new(config);
    let mut entry = engine
        .take_render_entry()
        .ok_or_else(|| anyhow::anyhow!("render entry already taken"))?;
    entry.prepare(args.sample_rate as f32, args.buffer_size as usize);

    // Feed the engine its source. Compiles run off-thread; the stream
    // starts silent and adopts the first unit that passes validation.
    let label = if let Some(path) = &args.graph {
        let graph = load_graph(path)?;
        let name = graph.name.clone();
        engine.submit_graph(graph);
        if matches!(args.mode, CliMode::Jit) {
            engine.set_source(SourceMode::JitCompiled);
        }
        format!("graph '{}'", name)
    } else if let Some(path) = &args.netlist {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;
        engine.set_custom_code(text);
        format!("netlist {}", path.display())
    } else if let Some(path) = &args.artifact {
        let artifact = DynamicArtifact::load(path)?;
        let name = artifact.name().to_string();
        engine.load_dynamic_unit(artifact);
        format!("artifact '{}'", name)
    } else {
        anyhow::bail!("No source specified. Use --graph, --netlist, or --artifact");
    };

    for &(slot, value) in &args.set {
        engine.push_parameter(slot, value);
    }

    let (mut source, source_label) = match &args.input {
        Some(path) => {
            let (samples, rate) = read_wav(path)?;
            if samples.is_empty() {
                anyhow::bail!("{} holds no samples", path.display());
            }
            if rate != args.sample_rate {
                println!(
                    "  note: {} is {} Hz, playing at {} Hz",
                    path.display(),
                    rate,
                    args.sample_rate
                );
            }
            (
                LiveSource::Loop { samples, pos: 0 },
                format!("loop {}", path.display()),
            )
        }
        None => (
            LiveSource::Tone {
                phase: 0.0,
                step: args.freq / args.sample_rate as f32,
                amplitude: args.amplitude,
            },
            format!("{} Hz tone", args.freq),
        ),
    };

    let host = cpal::default_host();
    let device = match &args.device {
        Some(name) => find_output_device(&host, name)?,
        None => host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("no default output device"))?,
    };
    let out_name = device_name(&device).unwrap_or_else(|_| "unknown".to_string());

    println!("Live engine: {}", label);
    println!("  Output: {}", out_name);
    println!("  Source: {}", source_label);
    println!("  Sample rate: {} Hz", args.sample_rate);
    println!("  Buffer size: {} frames", args.buffer_size);
    println!("\nPress Ctrl+C to stop...\n");

    let channels = 2usize;
    let stream_config = cpal::StreamConfig {
        channels: channels as u16,
        sample_rate: args.sample_rate,
        buffer_size: cpal::BufferSize::Fixed(args.buffer_size),
    };

    let mut mono = vec![0.0f32; args.buffer_size as usize];
    let stream = device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            if mono.len() < frames {
                // Only hit when the host ignores the fixed buffer request.
                mono.resize(frames, 0.0);
            }
            let block = &mut mono[..frames];
            source.fill(block);
            entry.process(block, &[]);
            for (frame, &sample) in data.chunks_mut(channels).zip(block.iter()) {
                frame.fill(sample);
            }
        },
        move |err| {
            eprintln!("audio stream error: {}", err);
        },
        None,
    )?;
    stream.play()?;

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        println!("\nStopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    let mut watch: Option<(PathBuf, Option<SystemTime>)> = match (&args.graph, args.watch) {
        (Some(path), true) => {
            let stamp = std::fs::metadata(path).and_then(|m| m.modified()).ok();
            Some((path.clone(), stamp))
        }
        _ => None,
    };

    while running.load(Ordering::SeqCst) {
        engine.pump();
        for event in events.try_iter() {
            print_event(&event);
        }

        if let Some((path, last)) = watch.as_mut()
            && let Ok(modified) = std::fs::metadata(&*path).and_then(|m| m.modified())
            && Some(modified) != *last
        {
            *last = Some(modified);
            // A half-written file fails to parse; the next save retries.
            match load_graph(path) {
                Ok(graph) => {
                    println!("[watch] {} changed, resubmitting", path.display());
                    engine.submit_graph(graph);
                }
                Err(e) => println!("[watch] reload failed: {}", e),
            }
        }

        std::thread::sleep(Duration::from_millis(10));
    }

    drop(stream);
    println!("Done!");
    Ok(())
}

fn print_event(event: &EngineEvent) {
    match event {
        EngineEvent::Recompiled {
            mode,
            diagnostic: None,
        } => println!("[engine] recompiled ({})", mode),
        EngineEvent::Recompiled {
            mode,
            diagnostic: Some(d),
        } => println!("[engine] rejected ({}): {}", mode, d),
        EngineEvent::ModeChanged(mode) => println!("[engine] mode: {}", mode),
        EngineEvent::TestCompleted(run) => {
            if run.passed() {
                println!(
                    "[engine] validated: {} blocks, peak {:.2}, cpu {:.1}%",
                    run.blocks,
                    run.peak,
                    run.cpu_fraction * 100.0
                );
            }
        }
        EngineEvent::StateChanged(state) => {
            println!("[engine] state: {}", format!("{:?}", state).to_lowercase());
        }
    }
}

/// Find a cpal output device by name, case-insensitive substring match.
fn find_output_device(host: &cpal::Host, name: &str) -> anyhow::Result<cpal::Device> {
    let search = name.to_lowercase();
    let devices = host.output_devices()?;
    for device in devices {
        if let Ok(dev_name) = device_name(&device)
            && dev_name.to_lowercase().contains(&search)
        {
            return Ok(device);
        }
    }
    anyhow::bail!("no output device matching '{}'", name)
}

/// Extract device name via `description()` (cpal 0.17+).
fn device_name(device: &cpal::Device) -> Result<String, cpal::DeviceNameError> {
    device.description().map(|d| d.name().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_source_wraps_around() {
        let mut source = LiveSource::Loop {
            samples: vec![1.0, 2.0, 3.0],
            pos: 0,
        };
        let mut out = [0.0f32; 7];
        source.fill(&mut out);
        assert_eq!(out, [1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn tone_source_is_a_scaled_sine() {
        // One cycle every four samples.
        let mut source = LiveSource::Tone {
            phase: 0.0,
            step: 0.25,
            amplitude: 0.5,
        };
        let mut out = [0.0f32; 4];
        source.fill(&mut out);
        assert!(out[0].abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert!(out[2].abs() < 1e-6);
        assert!((out[3] + 0.5).abs() < 1e-6);
    }
}
