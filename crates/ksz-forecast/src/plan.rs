//! YAML forecast plans.

use std::fs;
use std::path::{Path, PathBuf};

use ksz_cache::CacheConfig;
use ksz_core::{stable_hash_string, CosmoParameter, ErrorInfo, KszError};
use ksz_queue::BackendSpec;
use ksz_stencil::{finite_difference_coefficients, Perturbation};
use serde::{Deserialize, Serialize};

use crate::solver::SolverSpec;
use crate::survey::SurveyPreset;

fn yaml_error(code: &str, err: impl ToString) -> KszError {
    KszError::Serde(ErrorInfo::new(code, err.to_string()))
}

fn config_error(code: &str, message: &str) -> KszError {
    KszError::Config(ErrorInfo::new(code, message))
}

/// One varied parameter and the fractional step sizes to differentiate with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name, e.g. `omega_cdm`.
    pub parameter: CosmoParameter,
    /// Each step yields its own derivative.
    pub steps: Vec<f64>,
}

impl ParameterSpec {
    fn new(parameter: CosmoParameter, steps: &[f64]) -> Self {
        Self {
            parameter,
            steps: steps.to_vec(),
        }
    }
}

/// Separations `r_min, r_min + delta_r, ...` strictly below `r_max`, in `Mpc/h`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeparationGrid {
    pub r_min: f64,
    pub r_max: f64,
    pub delta_r: f64,
}

impl Default for SeparationGrid {
    fn default() -> Self {
        Self {
            r_min: 20.0,
            r_max: 180.0,
            delta_r: 2.0,
        }
    }
}

impl SeparationGrid {
    pub fn values(&self) -> Vec<f64> {
        if !(self.delta_r > 0.0) {
            return Vec::new();
        }
        (0..)
            .map(|i| self.r_min + i as f64 * self.delta_r)
            .take_while(|r| *r < self.r_max)
            .collect()
    }
}

/// Full description of a forecast sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPlan {
    /// Axion masses in eV; one derivative tensor per mass.
    pub axion_masses: Vec<f64>,
    /// Fiducial axion fractions evaluated for every mass.
    pub axion_fractions: Vec<f64>,
    /// Parameters to differentiate, in tensor order.
    pub parameters: Vec<ParameterSpec>,
    /// Finite-difference multipliers shared by all parameters.
    #[serde(default = "ForecastPlan::default_stencil")]
    pub stencil: Vec<f64>,
    #[serde(default)]
    pub perturbation: Perturbation,
    /// Solver reads the Hubble rate from its own output.
    #[serde(default = "ForecastPlan::default_read_hubble")]
    pub read_hubble_from_file: bool,
    #[serde(default)]
    pub survey: SurveyPreset,
    #[serde(default)]
    pub separations: SeparationGrid,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub solver: SolverSpec,
    #[serde(default)]
    pub backend: BackendSpec,
    /// Directory receiving tensors and the run report.
    #[serde(default = "ForecastPlan::default_output_dir")]
    pub output_dir: PathBuf,
    /// Directory containing the plan on disk (ignored when serializing).
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for ForecastPlan {
    fn default() -> Self {
        Self {
            axion_masses: vec![1.0e-26],
            axion_fractions: vec![1.0e-2],
            parameters: vec![
                ParameterSpec::new(CosmoParameter::H, &[0.05]),
                ParameterSpec::new(CosmoParameter::OmegaCdm, &[0.05]),
                ParameterSpec::new(CosmoParameter::OmegaB, &[0.05]),
                ParameterSpec::new(CosmoParameter::NS, &[0.005]),
                ParameterSpec::new(CosmoParameter::AxionFrac, &[0.01, 0.05, 0.1, 0.2]),
            ],
            stencil: Self::default_stencil(),
            perturbation: Perturbation::default(),
            read_hubble_from_file: Self::default_read_hubble(),
            survey: SurveyPreset::default(),
            separations: SeparationGrid::default(),
            cache: CacheConfig::default(),
            solver: SolverSpec::default(),
            backend: BackendSpec::default(),
            output_dir: Self::default_output_dir(),
            base_dir: PathBuf::new(),
        }
    }
}

impl ForecastPlan {
    fn default_stencil() -> Vec<f64> {
        vec![-2.0, -1.0, 0.0, 1.0, 2.0]
    }

    const fn default_read_hubble() -> bool {
        true
    }

    fn default_output_dir() -> PathBuf {
        PathBuf::from("forecast_out")
    }

    /// Deterministic hash of the plan contents.
    pub fn plan_hash(&self) -> Result<String, KszError> {
        stable_hash_string(self)
    }

    pub fn to_yaml_string(&self) -> Result<String, KszError> {
        serde_yaml::to_string(self).map_err(|err| yaml_error("yaml-serialize", err))
    }

    /// Resolves a plan-relative path against the plan's directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Cache configuration with paths resolved against the plan directory.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            database: self.resolve(&self.cache.database),
            outputs_root: self.resolve(&self.cache.outputs_root),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.output_dir)
    }

    /// Number of derivatives produced per fiducial cosmology.
    pub fn derivatives_per_fiducial(&self) -> usize {
        self.parameters.iter().map(|spec| spec.steps.len()).sum()
    }

    /// Rejects plans that could only fail at run time.
    pub fn validate(&self) -> Result<(), KszError> {
        if self.axion_masses.is_empty() {
            return Err(config_error("plan-masses", "plan lists no axion masses"));
        }
        if self.axion_masses.iter().any(|m| !(m.is_finite() && *m > 0.0)) {
            return Err(config_error("plan-masses", "axion masses must be positive"));
        }
        if self.axion_fractions.is_empty() {
            return Err(config_error("plan-fractions", "plan lists no axion fractions"));
        }
        if self.axion_fractions.iter().any(|f| !(0.0..=1.0).contains(f)) {
            return Err(config_error("plan-fractions", "axion fractions must lie in [0, 1]"));
        }
        if self.derivatives_per_fiducial() == 0 {
            return Err(config_error("plan-parameters", "plan varies no parameters"));
        }
        for spec in &self.parameters {
            if spec.steps.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
                return Err(KszError::Config(
                    ErrorInfo::new("plan-steps", "step sizes must be positive")
                        .with_context("parameter", spec.parameter.name()),
                ));
            }
        }
        finite_difference_coefficients(&self.stencil, 1)?;
        if self.separations.values().is_empty() {
            return Err(config_error("plan-separations", "separation grid is empty"));
        }
        Ok(())
    }
}

/// Loads and validates a plan, remembering its directory for relative paths.
pub fn load_plan<P: AsRef<Path>>(path: P) -> Result<ForecastPlan, KszError> {
    let plan_path = path.as_ref();
    let bytes = fs::read(plan_path).map_err(|err| KszError::io("plan-read", plan_path, err))?;
    let mut plan: ForecastPlan =
        serde_yaml::from_slice(&bytes).map_err(|err| yaml_error("yaml-deserialize", err))?;
    plan.base_dir = plan_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    plan.validate()?;
    Ok(plan)
}
