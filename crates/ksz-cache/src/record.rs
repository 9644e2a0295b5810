use std::fmt;
use std::path::{Path, PathBuf};

use ksz_core::{CosmoParams, Cosmology, Fingerprint};
use serde::{Deserialize, Serialize};

/// Stable row identifier of a run record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(usize);

impl RunId {
    /// Creates an identifier from its row index.
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// Row index of the record.
    pub fn as_raw(&self) -> usize {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of the run cache, keyed by cosmology fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub output_path: PathBuf,
    pub log_path: PathBuf,
    pub fingerprint: Fingerprint,
    pub ran: bool,
    pub succeeded: bool,
    pub h: f64,
    pub omega_cdm: f64,
    pub omega_b: f64,
    pub omega_axion: f64,
    pub m_axion: f64,
    pub n_s: f64,
    #[serde(rename = "A_s")]
    pub a_s: f64,
    pub read_hubble: bool,
}

/// Column order of the backing CSV file.
pub const RECORD_COLUMNS: [&str; 14] = [
    "id",
    "output_path",
    "log_path",
    "fingerprint",
    "ran",
    "succeeded",
    "h",
    "omega_cdm",
    "omega_b",
    "omega_axion",
    "m_axion",
    "n_s",
    "A_s",
    "read_hubble",
];

impl RunRecord {
    pub(crate) fn pending(id: RunId, cosmology: &Cosmology, outputs_root: &Path) -> Self {
        let p = cosmology.params();
        Self {
            id,
            output_path: outputs_root.join(format!("solver_out_ID={}", id)),
            log_path: outputs_root
                .join("logs")
                .join(format!("solver_log_ID={}.log", id)),
            fingerprint: cosmology.fingerprint(),
            ran: false,
            succeeded: false,
            h: p.h,
            omega_cdm: p.omega_cdm,
            omega_b: p.omega_b,
            omega_axion: p.omega_axion,
            m_axion: p.m_axion,
            n_s: p.n_s,
            a_s: p.a_s,
            read_hubble: cosmology.reads_hubble_from_file(),
        }
    }

    /// Reconstructs the cosmology this record was created for.
    pub fn cosmology(&self) -> Cosmology {
        Cosmology::new(
            CosmoParams {
                h: self.h,
                omega_cdm: self.omega_cdm,
                omega_b: self.omega_b,
                omega_axion: self.omega_axion,
                m_axion: self.m_axion,
                n_s: self.n_s,
                a_s: self.a_s,
            },
            self.read_hubble,
        )
    }

    /// Run-state view of the record.
    pub fn state(&self) -> RunState {
        RunState {
            id: self.id,
            ran: self.ran,
            succeeded: self.succeeded,
            output_path: self.output_path.clone(),
            log_path: self.log_path.clone(),
        }
    }
}

/// The four run-state fields every lookup returns, plus the record id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub id: RunId,
    pub ran: bool,
    pub succeeded: bool,
    pub output_path: PathBuf,
    pub log_path: PathBuf,
}

impl RunState {
    /// True when the solver ran for this cosmology and reported failure.
    pub fn failed(&self) -> bool {
        self.ran && !self.succeeded
    }
}

/// Result of [`crate::RunCache::add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Whether this call created the record.
    pub is_new: bool,
    pub state: RunState,
}

/// Aggregate counts over the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheSummary {
    pub total: usize,
    pub ran: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub pending: usize,
}
