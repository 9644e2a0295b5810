//! External transfer-function solver invocation.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use ksz_cache::RunState;
use ksz_core::{to_canonical_json_bytes, CosmoParams, Cosmology, KszError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::artifact_path;

/// Runs the solver for one cosmology; `true` means the outputs are usable.
///
/// Failures are reported through the return value and recorded in the run
/// cache, never raised.
pub trait TransferSolver: Send + Sync {
    /// Produces the artefacts under `run.output_path`.
    fn run(&self, cosmology: &Cosmology, run: &RunState) -> bool;
}

/// Solver command line from the forecast plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverSpec {
    /// Executable invoked once per cosmology.
    pub program: PathBuf,
    /// Arguments placed before the parameter file and output root.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for SolverSpec {
    fn default() -> Self {
        Self {
            program: PathBuf::from("axion-camb-runner"),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SolverInput<'a> {
    #[serde(flatten)]
    params: &'a CosmoParams,
    read_hubble: bool,
    output_root: &'a Path,
}

/// Spawns `program [args..] <output_path>_params.json <output_path>`.
///
/// Stdout and stderr are redirected to the record's log file.
#[derive(Debug, Clone)]
pub struct CommandSolver {
    spec: SolverSpec,
}

impl CommandSolver {
    pub fn new(spec: SolverSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &SolverSpec {
        &self.spec
    }

    fn invoke(&self, cosmology: &Cosmology, run: &RunState) -> Result<bool, KszError> {
        for dir in [run.output_path.parent(), run.log_path.parent()].into_iter().flatten() {
            fs::create_dir_all(dir).map_err(|err| KszError::io("solver-mkdir", dir, err))?;
        }
        let params_path = artifact_path(&run.output_path, "_params.json");
        let input = SolverInput {
            params: cosmology.params(),
            read_hubble: cosmology.reads_hubble_from_file(),
            output_root: &run.output_path,
        };
        fs::write(&params_path, to_canonical_json_bytes(&input)?)
            .map_err(|err| KszError::io("solver-params", &params_path, err))?;

        let log = File::create(&run.log_path)
            .map_err(|err| KszError::io("solver-log", &run.log_path, err))?;
        let log_err = log
            .try_clone()
            .map_err(|err| KszError::io("solver-log", &run.log_path, err))?;
        let status = Command::new(&self.spec.program)
            .args(&self.spec.args)
            .arg(&params_path)
            .arg(&run.output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .status()
            .map_err(|err| KszError::io("solver-spawn", &self.spec.program, err))?;
        debug!(run = %run.id, status = %status, "solver exited");
        Ok(status.success())
    }
}

impl TransferSolver for CommandSolver {
    fn run(&self, cosmology: &Cosmology, run: &RunState) -> bool {
        match self.invoke(cosmology, run) {
            Ok(true) => true,
            Ok(false) => {
                warn!(run = %run.id, log = %run.log_path.display(), "solver reported failure");
                false
            }
            Err(err) => {
                warn!(run = %run.id, error = %err, "solver could not be run");
                false
            }
        }
    }
}
