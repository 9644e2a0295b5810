use ksz_cache::RunId;
use ksz_core::{Cosmology, KszError};
use ksz_queue::JobId;
use serde::{Deserialize, Serialize};

/// Where a stencil point's evaluation stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvalTicket {
    /// Evaluation not requested yet.
    Pending,
    /// Evaluation job submitted; its output will be stored under this id.
    Scheduled(JobId),
    /// Evaluation deliberately not submitted, typically because the solver run failed.
    Skipped {
        /// Run record the point depends on.
        run: RunId,
        /// Human readable cause.
        reason: String,
    },
}

/// Admits a stencil cosmology into the run cache and queues its solver run when needed.
pub trait PrecomputeHook {
    /// Returns the cache id the point's cosmology is recorded under.
    fn schedule(&mut self, cosmology: &Cosmology) -> Result<RunId, KszError>;
}

impl<F> PrecomputeHook for F
where
    F: FnMut(&Cosmology) -> Result<RunId, KszError>,
{
    fn schedule(&mut self, cosmology: &Cosmology) -> Result<RunId, KszError> {
        self(cosmology)
    }
}

/// Queues the observable evaluation for a completed cosmology.
///
/// The hook may attach post-run data (the Hubble table) to the cosmology
/// before capturing it into the job.
pub trait EvaluationHook {
    /// Returns the ticket recorded on the stencil point.
    fn schedule(&mut self, cosmology: &mut Cosmology, run: RunId) -> Result<EvalTicket, KszError>;
}

impl<F> EvaluationHook for F
where
    F: FnMut(&mut Cosmology, RunId) -> Result<EvalTicket, KszError>,
{
    fn schedule(&mut self, cosmology: &mut Cosmology, run: RunId) -> Result<EvalTicket, KszError> {
        self(cosmology, run)
    }
}
