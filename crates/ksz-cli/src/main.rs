use std::error::Error;

use clap::{Parser, Subcommand};
use commands::{
    cache::{self, CacheArgs},
    plan::{self, PlanArgs},
    run::{self, RunArgs},
};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "ksz-forecast", about = "kSZ axion pairwise-velocity derivative forecasts")]
struct Cli {
    /// Log verbosity (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: tracing::Level,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the default forecast plan as YAML.
    Plan(PlanArgs),
    /// Execute a forecast plan.
    Run(RunArgs),
    /// Inspect the run cache.
    Cache(CacheArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .init();
    match cli.command {
        Command::Plan(args) => plan::run(&args),
        Command::Run(args) => run::run(&args),
        Command::Cache(args) => cache::run(&args),
    }
}
