//! File-based offline render command.

use std::path::PathBuf;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use relevo_compile::{
    ARTIFACT_ABI, DynamicArtifact, FusedUnit, InterpretedUnit, LibraryUnit, Schedule,
    parse_netlist,
};
use relevo_core::{LibraryView, RenderUnit, SourceMode};

use super::common::{CliMode, load_graph, parse_slot_val, seed_bound_values};
use crate::wav::{read_wav, write_wav};

#[derive(Args)]
pub struct RenderArgs {
    /// Input WAV file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output WAV file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Graph JSON file to compile
    #[arg(short, long)]
    graph: Option<PathBuf>,

    /// Raw netlist text file to compile as-is
    #[arg(short, long)]
    netlist: Option<PathBuf>,

    /// Prebuilt artifact manifest to run
    #[arg(short, long)]
    artifact: Option<PathBuf>,

    /// Backend for graph and netlist sources
    #[arg(long, value_enum, default_value = "interpreted")]
    mode: CliMode,

    /// Parameter overrides (e.g. "0=-6.0"), applied after the graph's
    /// bound values
    #[arg(long, value_parser = parse_slot_val, number_of_values = 1)]
    set: Vec<(u32, f32)>,

    /// Processing block size
    #[arg(long, default_value = "512")]
    block_size: usize,

    /// Output bit depth (16, 24, or 32)
    #[arg(long, default_value = "32")]
    bit_depth: u16,
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    println!("Reading {}...", args.input.display());
    let (samples, sample_rate) = read_wav(&args.input)?;
    if samples.is_empty() {
        anyhow::bail!("{} holds no samples", args.input.display());
    }
    println!(
        "  {} samples, {} Hz, {:.2}s",
        samples.len(),
        sample_rate,
        samples.len() as f32 / sample_rate as f32
    );

    let rate = sample_rate as f32;
    let mode = SourceMode::from(args.mode);

    let (mut unit, label): (Box<dyn RenderUnit>, String) = if let Some(path) = &args.graph {
        let graph = load_graph(path)?;
        let netlist = relevo_codegen::generate(&graph)
            .map_err(|e| anyhow::anyhow!("graph rejected: {}", e))?;
        let mut unit = build_backend(schedule_of(&netlist)?, args.mode, rate);
        seed_bound_values(unit.as_mut(), &graph);
        (unit, format!("graph '{}' ({})", graph.name, mode))
    } else if let Some(path) = &args.netlist {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;
        // Netlist text carries bindings, never values; the unit starts at
        // kind defaults unless --set says otherwise.
        let unit = build_backend(schedule_of(&text)?, args.mode, rate);
        (unit, format!("netlist {} ({})", path.display(), mode))
    } else if let Some(path) = &args.artifact {
        let artifact = DynamicArtifact::load(path)?;
        if artifact.abi_version() != ARTIFACT_ABI {
            anyhow::bail!(
                "artifact '{}' targets abi {} but this engine runs abi {}",
                artifact.name(),
                artifact.abi_version(),
                ARTIFACT_ABI
            );
        }
        let schedule = schedule_of(artifact.netlist())?;
        let unit = LibraryUnit::from_schedule(schedule, &artifact, rate)?;
        (Box::new(unit), format!("artifact '{}'", artifact.name()))
    } else {
        anyhow::bail!("No source specified. Use --graph, --netlist, or --artifact");
    };

    for &(slot, value) in &args.set {
        unit.set_parameter(slot, value);
    }

    println!("Rendering through {}...", label);
    unit.prepare(rate, args.block_size);

    let input_rms = rms(&samples);
    let input_peak = peak(&samples);

    let pb = ProgressBar::new(samples.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap()
            .progress_chars("##-"),
    );

    let total = samples.len();
    let mut output = samples;
    for (i, chunk) in output.chunks_mut(args.block_size).enumerate() {
        unit.process(chunk, &[]);
        pb.set_position(((i + 1) * args.block_size).min(total) as u64);
    }

    pb.finish_with_message("done");

    let output_rms = rms(&output);
    let output_peak = peak(&output);

    println!("\nStats:");
    println!(
        "  Input:  RMS {:.1} dB, Peak {:.1} dB",
        linear_to_db(input_rms),
        linear_to_db(input_peak)
    );
    println!(
        "  Output: RMS {:.1} dB, Peak {:.1} dB",
        linear_to_db(output_rms),
        linear_to_db(output_peak)
    );

    println!("\nWriting {}...", args.output.display());
    write_wav(&args.output, &output, sample_rate, args.bit_depth)?;
    println!("Done!");

    Ok(())
}

fn schedule_of(netlist: &str) -> anyhow::Result<Schedule> {
    let graph = parse_netlist(netlist)?;
    Ok(Schedule::from_graph(&graph)?)
}

fn build_backend(schedule: Schedule, mode: CliMode, sample_rate: f32) -> Box<dyn RenderUnit> {
    match mode {
        CliMode::Interpreted => Box::new(InterpretedUnit::new(schedule, sample_rate)),
        CliMode::Jit => Box::new(FusedUnit::new(schedule, sample_rate)),
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

fn peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0, f32::max)
}

fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        -120.0
    } else {
        20.0 * linear.log10()
    }
}
