use std::panic::{catch_unwind, AssertUnwindSafe};

use ksz_core::{ErrorInfo, KszError};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A queued unit of work.
pub type Job<T> = Box<dyn FnOnce() -> T + Send>;

/// Executes a batch of jobs and returns their outputs in submission order.
pub trait JobBackend {
    /// Runs every job to completion; output `i` belongs to job `i`.
    fn execute<T: Send>(&self, jobs: Vec<Job<T>>) -> Result<Vec<T>, KszError>;

    /// Short label for logs.
    fn label(&self) -> String;
}

/// Runs jobs one after another on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialBackend;

impl JobBackend for SerialBackend {
    fn execute<T: Send>(&self, jobs: Vec<Job<T>>) -> Result<Vec<T>, KszError> {
        jobs.into_iter()
            .enumerate()
            .map(|(index, job)| run_guarded(index, job))
            .collect()
    }

    fn label(&self) -> String {
        "serial".to_string()
    }
}

/// Runs jobs on a dedicated rayon pool.
#[derive(Debug, Clone, Copy)]
pub struct RayonBackend {
    threads: usize,
}

impl RayonBackend {
    /// Creates a backend with `threads` workers (at least one).
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }
}

impl JobBackend for RayonBackend {
    fn execute<T: Send>(&self, jobs: Vec<Job<T>>) -> Result<Vec<T>, KszError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|err| {
                KszError::Queue(
                    ErrorInfo::new("thread-pool", err.to_string())
                        .with_context("threads", self.threads.to_string()),
                )
            })?;
        let results: Result<Vec<(usize, T)>, KszError> = pool.install(|| {
            jobs.into_par_iter()
                .enumerate()
                .map(|(index, job)| run_guarded(index, job).map(|out| (index, out)))
                .collect()
        });
        let mut ordered = results?;
        ordered.sort_by_key(|(index, _)| *index);
        Ok(ordered.into_iter().map(|(_, out)| out).collect())
    }

    fn label(&self) -> String {
        format!("rayon({})", self.threads)
    }
}

/// Serializable backend selection used by forecast plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendSpec {
    /// In-line execution.
    #[default]
    Serial,
    /// Rayon pool with the given worker count.
    Rayon {
        /// Worker threads in the pool.
        #[serde(default = "BackendSpec::default_threads")]
        threads: usize,
    },
}

impl BackendSpec {
    fn default_threads() -> usize {
        4
    }
}

impl JobBackend for BackendSpec {
    fn execute<T: Send>(&self, jobs: Vec<Job<T>>) -> Result<Vec<T>, KszError> {
        match self {
            BackendSpec::Serial => SerialBackend.execute(jobs),
            BackendSpec::Rayon { threads } => RayonBackend::new(*threads).execute(jobs),
        }
    }

    fn label(&self) -> String {
        match self {
            BackendSpec::Serial => SerialBackend.label(),
            BackendSpec::Rayon { threads } => RayonBackend::new(*threads).label(),
        }
    }
}

fn run_guarded<T>(index: usize, job: Job<T>) -> Result<T, KszError> {
    catch_unwind(AssertUnwindSafe(job)).map_err(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "job panicked".to_string());
        KszError::Queue(
            ErrorInfo::new("job-panic", reason).with_context("index", index.to_string()),
        )
    })
}
