use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use ksz_core::{Cosmology, ErrorInfo, Fingerprint, KszError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::record::{Admission, CacheSummary, RunId, RunRecord, RunState, RECORD_COLUMNS};

/// Location of the backing table and of the solver artefacts it points to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// CSV file holding the run table.
    pub database: PathBuf,
    /// Directory under which solver outputs and logs are placed.
    pub outputs_root: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("cache/cosmo_db.csv"),
            outputs_root: PathBuf::from("cache/solver_outputs"),
        }
    }
}

/// Append-only table of solver runs with a fingerprint index.
///
/// Record ids are row positions and never change once assigned. The
/// coordinator is the only writer and mutates the table between job-phase
/// barriers, so no locking is involved.
#[derive(Debug, Clone)]
pub struct RunCache {
    config: CacheConfig,
    records: Vec<RunRecord>,
    index: HashMap<Fingerprint, RunId>,
}

impl RunCache {
    /// Creates an empty cache without touching the backing store.
    pub fn empty(config: CacheConfig) -> Self {
        Self {
            config,
            records: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Opens the cache, restoring the table when the backing file exists.
    pub fn open(config: CacheConfig) -> Result<Self, KszError> {
        let mut cache = Self::empty(config);
        cache.load()?;
        Ok(cache)
    }

    /// Backing store configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Replaces the in-memory table with the backing file contents.
    ///
    /// A missing file yields an empty table; every other failure propagates.
    pub fn load(&mut self) -> Result<(), KszError> {
        let path = self.config.database.clone();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "run cache file absent, starting empty");
                self.records.clear();
                self.index.clear();
                return Ok(());
            }
            Err(err) => return Err(KszError::io("cache-open", &path, err)),
        };
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
        let headers = reader
            .headers()
            .map_err(|err| schema_error("cache-header", &path, err))?
            .clone();
        if !headers.iter().eq(RECORD_COLUMNS.iter().copied()) {
            return Err(KszError::SchemaMismatch(
                ErrorInfo::new("cache-header", "unexpected run cache columns")
                    .with_context("path", path.display().to_string())
                    .with_context("found", headers.iter().collect::<Vec<_>>().join(","))
                    .with_hint(RECORD_COLUMNS.join(",")),
            ));
        }

        let mut records = Vec::new();
        let mut index = HashMap::new();
        for (row, result) in reader.deserialize::<RunRecord>().enumerate() {
            let record = result.map_err(|err| schema_error("cache-row", &path, err))?;
            validate_row(&path, row, &record, &index)?;
            index.insert(record.fingerprint.clone(), record.id);
            records.push(record);
        }
        info!(path = %path.display(), records = records.len(), "run cache loaded");
        self.records = records;
        self.index = index;
        Ok(())
    }

    /// Writes the whole table to the backing file, replacing it.
    pub fn save(&self) -> Result<(), KszError> {
        let path = &self.config.database;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| KszError::io("cache-mkdir", parent, err))?;
            }
        }
        let file = File::create(path).map_err(|err| KszError::io("cache-create", path, err))?;
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::new(file));
        writer
            .write_record(RECORD_COLUMNS)
            .map_err(|err| wrap_csv("cache-write-header", path, err))?;
        for record in &self.records {
            writer
                .serialize(record)
                .map_err(|err| wrap_csv("cache-write-row", path, err))?;
        }
        writer
            .flush()
            .map_err(|err| KszError::io("cache-flush", path, err))?;
        info!(path = %path.display(), records = self.records.len(), "run cache saved");
        Ok(())
    }

    /// Looks up the cosmology by fingerprint, inserting a pending record on a miss.
    ///
    /// Callers schedule a solver run only for records that have not run yet.
    pub fn add(&mut self, cosmology: &Cosmology) -> Admission {
        let fingerprint = cosmology.fingerprint();
        if let Some(id) = self.index.get(&fingerprint) {
            return Admission {
                is_new: false,
                state: self.records[id.as_raw()].state(),
            };
        }
        let id = RunId::from_raw(self.records.len());
        let record = RunRecord::pending(id, cosmology, &self.config.outputs_root);
        debug!(id = %id, fingerprint = %fingerprint, "registered new cosmology");
        let state = record.state();
        self.index.insert(fingerprint, id);
        self.records.push(record);
        Admission {
            is_new: true,
            state,
        }
    }

    /// Full record for an id.
    pub fn record(&self, id: RunId) -> Result<&RunRecord, KszError> {
        self.records.get(id.as_raw()).ok_or_else(|| not_found_id(id))
    }

    /// Run state for an id.
    pub fn get_by_id(&self, id: RunId) -> Result<RunState, KszError> {
        match self.records.get(id.as_raw()) {
            Some(record) => Ok(record.state()),
            None => {
                warn!(id = %id, "run cache lookup by id missed");
                Err(not_found_id(id))
            }
        }
    }

    /// Run state for a fingerprint.
    pub fn get_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<RunState, KszError> {
        self.index
            .get(fingerprint)
            .map(|id| self.records[id.as_raw()].state())
            .ok_or_else(|| {
                KszError::NotFound(
                    ErrorInfo::new("cache-fingerprint", "not found")
                        .with_context("fingerprint", fingerprint.to_string()),
                )
            })
    }

    /// Run state for a cosmology, via its fingerprint.
    pub fn get_by_cosmology(&self, cosmology: &Cosmology) -> Result<RunState, KszError> {
        self.get_by_fingerprint(&cosmology.fingerprint())
    }

    /// Records the outcome of the solver run for `id`.
    pub fn mark_run(&mut self, id: RunId, succeeded: bool) -> Result<(), KszError> {
        let record = self
            .records
            .get_mut(id.as_raw())
            .ok_or_else(|| not_found_id(id))?;
        record.ran = true;
        record.succeeded = succeeded;
        if succeeded {
            debug!(id = %id, "solver run recorded as succeeded");
        } else {
            warn!(id = %id, log = %record.log_path.display(), "solver run recorded as failed");
        }
        Ok(())
    }

    /// Records the outcome of the solver run for a cosmology.
    pub fn mark_run_by_cosmology(
        &mut self,
        cosmology: &Cosmology,
        succeeded: bool,
    ) -> Result<(), KszError> {
        let state = self.get_by_cosmology(cosmology)?;
        self.mark_run(state.id, succeeded)
    }

    /// All records in id order.
    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the table holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Counts of pending, succeeded and failed runs.
    pub fn summary(&self) -> CacheSummary {
        self.records
            .iter()
            .fold(CacheSummary::default(), |mut summary, record| {
                summary.total += 1;
                match (record.ran, record.succeeded) {
                    (true, true) => {
                        summary.ran += 1;
                        summary.succeeded += 1;
                    }
                    (true, false) => {
                        summary.ran += 1;
                        summary.failed += 1;
                    }
                    (false, _) => summary.pending += 1,
                }
                summary
            })
    }
}

fn validate_row(
    path: &Path,
    row: usize,
    record: &RunRecord,
    index: &HashMap<Fingerprint, RunId>,
) -> Result<(), KszError> {
    let mismatch = |code: &str, message: &str| {
        KszError::SchemaMismatch(
            ErrorInfo::new(code, message)
                .with_context("path", path.display().to_string())
                .with_context("row", row.to_string()),
        )
    };
    if record.id.as_raw() != row {
        return Err(mismatch("cache-id", "record id does not match its row index"));
    }
    if index.contains_key(&record.fingerprint) {
        return Err(mismatch("cache-duplicate", "fingerprint appears more than once"));
    }
    if record.cosmology().fingerprint() != record.fingerprint {
        return Err(mismatch(
            "cache-fingerprint",
            "stored fingerprint does not match the stored parameters",
        ));
    }
    Ok(())
}

fn not_found_id(id: RunId) -> KszError {
    KszError::NotFound(ErrorInfo::new("cache-id", "not found").with_context("id", id.to_string()))
}

fn schema_error(code: &str, path: &Path, err: csv::Error) -> KszError {
    KszError::SchemaMismatch(
        ErrorInfo::new(code, "malformed run cache file")
            .with_context("path", path.display().to_string())
            .with_hint(err.to_string()),
    )
}

fn wrap_csv(code: &str, path: &Path, err: csv::Error) -> KszError {
    KszError::Io(
        ErrorInfo::new(code, "CSV run cache failure")
            .with_context("path", path.display().to_string())
            .with_hint(err.to_string()),
    )
}
