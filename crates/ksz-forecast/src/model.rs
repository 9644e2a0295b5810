//! Observable evaluation over one solver run's artefacts.

use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};

use ksz_cache::RunState;
use ksz_core::{Cosmology, ErrorInfo, HubbleTable, KszError};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::mpv::mean_pairwise_velocity;

/// Redshift and separation samples every evaluation is reported on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationGrid {
    /// Survey bin centres.
    pub redshifts: Vec<f64>,
    /// Pair separations in `Mpc/h`.
    pub separations: Vec<f64>,
}

impl EvaluationGrid {
    /// `(redshifts, separations)` shape of evaluation results.
    pub fn shape(&self) -> (usize, usize) {
        (self.redshifts.len(), self.separations.len())
    }
}

/// Observable computed for one cosmology from its completed solver run.
pub trait ObservableModel: Send + Sync {
    /// Returns a matrix of shape [`EvaluationGrid::shape`].
    fn evaluate(
        &self,
        cosmology: &Cosmology,
        run: &RunState,
        grid: &EvaluationGrid,
    ) -> Result<DMatrix<f64>, KszError>;
}

/// `<output_path><suffix>`, the naming scheme for every artefact of a run.
pub fn artifact_path(output_path: &Path, suffix: &str) -> PathBuf {
    let mut raw = OsString::from(output_path.as_os_str());
    raw.push(suffix);
    PathBuf::from(raw)
}

#[derive(Debug, Deserialize)]
struct HubbleRow {
    z: f64,
    hubble: f64,
}

/// Reads the Hubble-rate table written next to a run's output.
pub fn load_hubble_table(output_path: &Path) -> Result<HubbleTable, KszError> {
    let path = artifact_path(output_path, "_hubble.csv");
    let rows: Vec<HubbleRow> = read_rows(&path)?;
    let (z, hubble) = rows.into_iter().map(|row| (row.z, row.hubble)).unzip();
    HubbleTable::new(z, hubble)
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct CorrelationRow {
    z: f64,
    r: f64,
    xi: f64,
    dbarxi_dloga: f64,
}

/// Mean pairwise velocity from tabulated correlation functions.
///
/// Expects `<output_path>_correlations.csv` with columns
/// `z,r,xi,dbarxi_dloga` covering every grid point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TabulatedPairwiseModel {
    tolerance: f64,
}

impl Default for TabulatedPairwiseModel {
    fn default() -> Self {
        Self { tolerance: 1e-6 }
    }
}

impl TabulatedPairwiseModel {
    /// Model matching grid coordinates within `tolerance`.
    pub fn with_tolerance(tolerance: f64) -> Self {
        Self { tolerance }
    }
}

impl ObservableModel for TabulatedPairwiseModel {
    fn evaluate(
        &self,
        _cosmology: &Cosmology,
        run: &RunState,
        grid: &EvaluationGrid,
    ) -> Result<DMatrix<f64>, KszError> {
        let path = artifact_path(&run.output_path, "_correlations.csv");
        let rows: Vec<CorrelationRow> = read_rows(&path)?;
        let (nz, nr) = grid.shape();
        let mut out = DMatrix::zeros(nz, nr);
        for (i, &z) in grid.redshifts.iter().enumerate() {
            for (j, &r) in grid.separations.iter().enumerate() {
                let row = rows
                    .iter()
                    .find(|row| (row.z - z).abs() <= self.tolerance && (row.r - r).abs() <= self.tolerance)
                    .ok_or_else(|| {
                        KszError::MissingOutput(
                            ErrorInfo::new("correlation-missing", "correlation table lacks a grid point")
                                .with_context("path", path.display().to_string())
                                .with_context("z", z.to_string())
                                .with_context("r", r.to_string()),
                        )
                    })?;
                out[(i, j)] = mean_pairwise_velocity(row.r, row.xi, row.dbarxi_dloga);
            }
        }
        Ok(out)
    }
}

fn read_rows<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, KszError> {
    let file = File::open(path).map_err(|err| KszError::io("artifact-open", path, err))?;
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file)
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|err| {
            KszError::SchemaMismatch(
                ErrorInfo::new("artifact-row", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
}
