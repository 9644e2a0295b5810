use std::collections::BTreeMap;
use std::fmt;

use ksz_core::{ErrorInfo, KszError};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::{Job, JobBackend};

/// The two job phases of a forecast sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// External solver runs, one per distinct cosmology.
    Precompute,
    /// Observable evaluation per stencil point.
    Evaluation,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Precompute => f.write_str("precompute"),
            Phase::Evaluation => f.write_str("evaluation"),
        }
    }
}

/// Identifier handed out at submission; outputs are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId {
    phase: Phase,
    seq: u64,
}

impl JobId {
    /// Phase the job was submitted to.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Submission sequence number within the phase.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.phase, self.seq)
    }
}

/// Queue for one phase: `submit` only enqueues, `run_to_completion` is the barrier.
pub struct PhaseQueue<T> {
    phase: Phase,
    next_seq: u64,
    pending: Vec<(JobId, Job<T>)>,
    outputs: BTreeMap<JobId, T>,
}

impl<T: Send + 'static> PhaseQueue<T> {
    /// Creates an empty queue for `phase`.
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            next_seq: 0,
            pending: Vec::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Phase served by this queue.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Enqueues a job and returns the id its output will be stored under.
    pub fn submit<F>(&mut self, job: F) -> JobId
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let id = JobId {
            phase: self.phase,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.pending.push((id, Box::new(job)));
        id
    }

    /// Number of jobs submitted but not yet executed.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Executes every pending job and stores the outputs by job id.
    ///
    /// Returns the number of jobs executed by this call.
    pub fn run_to_completion<B: JobBackend>(&mut self, backend: &B) -> Result<usize, KszError> {
        let batch = std::mem::take(&mut self.pending);
        if batch.is_empty() {
            return Ok(0);
        }
        let (ids, jobs): (Vec<JobId>, Vec<Job<T>>) = batch.into_iter().unzip();
        info!(phase = %self.phase, jobs = ids.len(), backend = %backend.label(), "running job phase");
        let outputs = backend.execute(jobs)?;
        if outputs.len() != ids.len() {
            return Err(KszError::Queue(
                ErrorInfo::new("output-count", "backend returned a different number of outputs")
                    .with_context("phase", self.phase.to_string())
                    .with_context("submitted", ids.len().to_string())
                    .with_context("returned", outputs.len().to_string()),
            ));
        }
        let executed = ids.len();
        self.outputs.extend(ids.into_iter().zip(outputs));
        Ok(executed)
    }

    /// Outputs of all completed jobs.
    pub fn outputs(&self) -> &BTreeMap<JobId, T> {
        &self.outputs
    }

    /// Output of one completed job.
    pub fn output(&self, id: JobId) -> Option<&T> {
        self.outputs.get(&id)
    }
}

impl<T> fmt::Debug for PhaseQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseQueue")
            .field("phase", &self.phase)
            .field("pending", &self.pending.len())
            .field("completed", &self.outputs.len())
            .finish()
    }
}
