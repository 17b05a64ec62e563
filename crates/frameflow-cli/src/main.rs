//! `frameflow` — command-line front end for the pipeline core in
//! `frameflow-engine`. Everything the GUI control surface would otherwise
//! drive (file pickers, sliders, a live chart) is out of scope for this
//! crate; this binary exists to exercise the same `Controller` surface from
//! a terminal and in the integration tests that can't spin up a GUI.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "frameflow")]
#[command(author, version, about = "Parallel video effect pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a source video through an effect chain to a destination video.
    Run(commands::run::RunArgs),

    /// List the built-in effect catalog.
    Effects(commands::effects::EffectsArgs),
}

fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Effects(args) => commands::effects::run(args),
    }
}
