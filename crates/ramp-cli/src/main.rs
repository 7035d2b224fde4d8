mod commands;
mod rng;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ramp", about = "Detector ramp jump detection and fitting")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic ramp cube and run the fitter on it
    Simulate(commands::simulate::SimulateArgs),
    /// Fit a ramp cube loaded from a raw binary file
    Fit(commands::fit::FitArgs),
    /// Print the default ramp-fit configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Simulate(args) => commands::simulate::run(args),
        Commands::Fit(args) => commands::fit::run(args),
        Commands::Config => commands::config::run(),
    }
}
