use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::Args;
use ksz_forecast::ForecastPlan;

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Destination file; printed to stdout when omitted.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn run(args: &PlanArgs) -> Result<(), Box<dyn Error>> {
    let yaml = ForecastPlan::default().to_yaml_string()?;
    match &args.out {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, yaml)?;
        }
        None => print!("{yaml}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksz_forecast::load_plan;

    #[test]
    fn written_plan_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("plans/default.yaml");
        run(&PlanArgs {
            out: Some(out.clone()),
        })
        .unwrap();
        let plan = load_plan(&out).unwrap();
        assert_eq!(plan.axion_masses, ForecastPlan::default().axion_masses);
        assert_eq!(plan.base_dir, dir.path().join("plans"));
    }
}
