use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Args, Subcommand};
use ksz_cache::{CacheConfig, RunCache, RunId, RunRecord};
use ksz_forecast::load_plan;

#[derive(Args, Debug)]
pub struct CacheArgs {
    /// Cache CSV file; defaults to the plan's or `cache/cosmo_db.csv`.
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,
    /// Take the cache location from this plan.
    #[arg(long, global = true, conflicts_with = "database")]
    pub plan: Option<PathBuf>,
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// One line per record plus a summary.
    List,
    /// Full record as JSON.
    Show {
        /// Record id.
        id: usize,
    },
}

pub fn run(args: &CacheArgs) -> Result<(), Box<dyn Error>> {
    let config = match (&args.database, &args.plan) {
        (Some(database), _) => CacheConfig {
            database: database.clone(),
            ..CacheConfig::default()
        },
        (None, Some(plan)) => load_plan(plan)?.cache_config(),
        (None, None) => CacheConfig::default(),
    };
    let cache = RunCache::open(config)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match &args.command {
        CacheCommand::List => list(&cache, &mut out)?,
        CacheCommand::Show { id } => {
            let record = cache.record(RunId::from_raw(*id))?;
            writeln!(out, "{}", serde_json::to_string_pretty(record)?)?;
        }
    }
    Ok(())
}

fn status(record: &RunRecord) -> &'static str {
    match (record.ran, record.succeeded) {
        (false, _) => "pending",
        (true, true) => "ok",
        (true, false) => "failed",
    }
}

fn list(cache: &RunCache, out: &mut impl Write) -> io::Result<()> {
    for record in cache.records() {
        writeln!(
            out,
            "{}\t{}\th={} omega_cdm={} omega_axion={} m_axion={:e}\t{}",
            record.id,
            status(record),
            record.h,
            record.omega_cdm,
            record.omega_axion,
            record.m_axion,
            record.output_path.display()
        )?;
    }
    let summary = cache.summary();
    writeln!(
        out,
        "total={} ok={} failed={} pending={}",
        summary.total, summary.succeeded, summary.failed, summary.pending
    )
}
