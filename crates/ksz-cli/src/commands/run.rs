use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use ksz_cache::RunCache;
use ksz_forecast::{load_plan, CommandSolver, ForecastDriver, TabulatedPairwiseModel};
use ksz_queue::BackendSpec;
use tracing::info;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// YAML forecast plan.
    #[arg(long)]
    pub plan: PathBuf,
    /// Override the plan's backend with a rayon pool of this many threads.
    #[arg(long)]
    pub threads: Option<usize>,
}

pub fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let plan = load_plan(&args.plan)?;
    let backend = match args.threads {
        Some(threads) => BackendSpec::Rayon { threads },
        None => plan.backend,
    };
    let cache = RunCache::open(plan.cache_config())?;
    info!(records = cache.len(), backend = ?backend, "starting forecast");
    let solver = Arc::new(CommandSolver::new(plan.solver.clone()));
    let model = Arc::new(TabulatedPairwiseModel::default());
    let mut driver = ForecastDriver::new(plan, cache, solver, model, backend);
    let report = driver.run()?;
    for mass in &report.masses {
        let status = if mass.succeeded() { "ok" } else { "failed" };
        println!("{:.3E}\t{}\t{} derivatives", mass.axion_mass, status, mass.derivatives);
    }
    if report.completed() < report.masses.len() {
        return Err(format!(
            "{} of {} masses did not complete",
            report.masses.len() - report.completed(),
            report.masses.len()
        )
        .into());
    }
    Ok(())
}
