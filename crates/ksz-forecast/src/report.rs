//! Run report summarising every mass iteration.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use ksz_cache::CacheSummary;
use ksz_core::{to_canonical_json_bytes, KszError};
use serde::{Deserialize, Serialize};

use crate::output::TensorFiles;
use crate::scheduler::PhaseStats;

/// Derivative that could not be assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivativeFailure {
    pub label: String,
    pub axion_frac: f64,
    pub error: KszError,
}

/// Outcome of one axion mass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MassStatus {
    /// Tensor written.
    Completed { files: TensorFiles },
    /// One or more derivatives failed; no tensor was written.
    Incomplete { failures: Vec<DerivativeFailure> },
    /// The iteration aborted before derivatives were assembled.
    Aborted { error: KszError },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassReport {
    pub axion_mass: f64,
    pub derivatives: usize,
    #[serde(default)]
    pub precompute: PhaseStats,
    #[serde(default)]
    pub evaluation: PhaseStats,
    #[serde(flatten)]
    pub status: MassStatus,
}

impl MassReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, MassStatus::Completed { .. })
    }
}

/// Report written as `forecast_report.json` after the cache is saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastReport {
    pub created_at: String,
    pub plan_hash: String,
    pub masses: Vec<MassReport>,
    pub cache: CacheSummary,
    pub tool_version: String,
}

impl ForecastReport {
    pub fn new(plan_hash: String, masses: Vec<MassReport>, cache: CacheSummary) -> Self {
        Self {
            created_at: Utc::now().to_rfc3339(),
            plan_hash,
            masses,
            cache,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Number of masses whose tensor was written.
    pub fn completed(&self) -> usize {
        self.masses.iter().filter(|m| m.succeeded()).count()
    }

    pub fn write(&self, dir: &Path) -> Result<PathBuf, KszError> {
        fs::create_dir_all(dir).map_err(|err| KszError::io("report-mkdir", dir, err))?;
        let path = dir.join("forecast_report.json");
        fs::write(&path, to_canonical_json_bytes(self)?)
            .map_err(|err| KszError::io("report-write", &path, err))?;
        Ok(path)
    }
}
