//! Relevo CLI - offline workbench for the relevo graph engine.

mod commands;
mod wav;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relevo")]
#[command(author, version, about = "Relevo graph engine workbench", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a graph and run the validation harness on it
    Check(commands::check::CheckArgs),

    /// Build a loadable artifact from a graph
    Build(commands::build::BuildArgs),

    /// Render a WAV file through a compiled graph
    Render(commands::render::RenderArgs),

    /// Run the live engine with audio output
    Live(commands::live::LiveArgs),
}

fn main() -> anyhow::Result<()> {
    // Stdout belongs to the command output; tracing stays quiet unless
    // RUST_LOG asks for more.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();
    tracing_log::LogTracer::init().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check(args) => commands::check::run(args),
        Commands::Build(args) => commands::build::run(args),
        Commands::Render(args) => commands::render::run(args),
        Commands::Live(args) => commands::live::run(args),
    }
}
