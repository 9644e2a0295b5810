#![deny(missing_docs)]
#![doc = "Submit / run / collect job queue used by the precompute and evaluation phases."]

/// Execution backends.
pub mod backend;
/// Phase queues and job identifiers.
pub mod queue;

pub use backend::{BackendSpec, Job, JobBackend, RayonBackend, SerialBackend};
pub use queue::{JobId, Phase, PhaseQueue};
