//! Cache-aware schedulers for the precompute and evaluation phases.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use ksz_cache::{RunCache, RunId};
use ksz_core::{Cosmology, ErrorInfo, HubbleTable, KszError};
use ksz_queue::{JobBackend, JobId, Phase, PhaseQueue};
use ksz_stencil::{EvalOutput, EvalTicket, EvaluationHook, PrecomputeHook};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::model::{load_hubble_table, EvaluationGrid, ObservableModel};
use crate::solver::TransferSolver;

/// Job counts of one completed phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhaseStats {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Requests served by an earlier job or record instead of a new submission.
    pub reused: usize,
    /// Stencil points left without a job because their run is unusable.
    #[serde(default)]
    pub skipped: usize,
}

/// Solver runs for cosmologies the cache has not seen run yet.
pub struct PrecomputePhase {
    queue: PhaseQueue<bool>,
    job_runs: BTreeMap<JobId, RunId>,
    queued: HashSet<RunId>,
    solver: Arc<dyn TransferSolver>,
    reused: usize,
}

impl PrecomputePhase {
    pub fn new(solver: Arc<dyn TransferSolver>) -> Self {
        Self {
            queue: PhaseQueue::new(Phase::Precompute),
            job_runs: BTreeMap::new(),
            queued: HashSet::new(),
            solver,
            reused: 0,
        }
    }

    /// Admits `cosmology` and submits a solver job unless the record already
    /// ran or is queued in this phase.
    pub fn admit(&mut self, cache: &mut RunCache, cosmology: &Cosmology) -> Result<RunId, KszError> {
        let admission = cache.add(cosmology);
        let run = admission.state.id;
        if admission.state.ran || self.queued.contains(&run) {
            self.reused += 1;
            return Ok(run);
        }
        let solver = Arc::clone(&self.solver);
        let cosmo = cosmology.clone();
        let state = admission.state;
        let job = self.queue.submit(move || solver.run(&cosmo, &state));
        debug!(run = %run, job = %job, new = admission.is_new, "solver run queued");
        self.job_runs.insert(job, run);
        self.queued.insert(run);
        Ok(run)
    }

    /// Adapter handing this phase to [`ksz_stencil::StencilDerivative::prep_parameters`].
    pub fn scheduler<'a>(&'a mut self, cache: &'a mut RunCache) -> PrecomputeScheduler<'a> {
        PrecomputeScheduler { phase: self, cache }
    }

    /// Runs the queued solver jobs and records each outcome against its run id.
    pub fn run<B: JobBackend>(&mut self, backend: &B, cache: &mut RunCache) -> Result<PhaseStats, KszError> {
        self.queue.run_to_completion(backend)?;
        let mut stats = PhaseStats {
            submitted: self.job_runs.len(),
            reused: self.reused,
            ..PhaseStats::default()
        };
        for (job, run) in &self.job_runs {
            let succeeded = *self.queue.output(*job).ok_or_else(|| {
                KszError::MissingOutput(
                    ErrorInfo::new("missing-output", "solver job produced no output")
                        .with_context("job", job.to_string())
                        .with_context("run", run.to_string()),
                )
            })?;
            cache.mark_run(*run, succeeded)?;
            if succeeded {
                stats.succeeded += 1;
            } else {
                stats.failed += 1;
                warn!(run = %run, job = %job, "solver run failed");
            }
        }
        info!(
            submitted = stats.submitted,
            succeeded = stats.succeeded,
            failed = stats.failed,
            reused = stats.reused,
            "precompute phase complete"
        );
        Ok(stats)
    }

    /// Explicit job to run-record map of this phase.
    pub fn job_runs(&self) -> &BTreeMap<JobId, RunId> {
        &self.job_runs
    }
}

/// [`PrecomputeHook`] borrowing the phase and the run cache.
pub struct PrecomputeScheduler<'a> {
    phase: &'a mut PrecomputePhase,
    cache: &'a mut RunCache,
}

impl PrecomputeHook for PrecomputeScheduler<'_> {
    fn schedule(&mut self, cosmology: &Cosmology) -> Result<RunId, KszError> {
        self.phase.admit(self.cache, cosmology)
    }
}

/// Observable evaluations, at most one per run record.
pub struct EvaluationPhase {
    queue: PhaseQueue<EvalOutput>,
    by_run: HashMap<RunId, (JobId, Option<HubbleTable>)>,
    model: Arc<dyn ObservableModel>,
    grid: Arc<EvaluationGrid>,
    reused: usize,
    skipped: usize,
}

impl EvaluationPhase {
    pub fn new(model: Arc<dyn ObservableModel>, grid: EvaluationGrid) -> Self {
        Self {
            queue: PhaseQueue::new(Phase::Evaluation),
            by_run: HashMap::new(),
            model,
            grid: Arc::new(grid),
            reused: 0,
            skipped: 0,
        }
    }

    pub fn grid(&self) -> &EvaluationGrid {
        &self.grid
    }

    /// Submits the evaluation for a completed run, or skips it when the run
    /// did not succeed.
    pub fn request(
        &mut self,
        cache: &RunCache,
        cosmology: &mut Cosmology,
        run: RunId,
    ) -> Result<EvalTicket, KszError> {
        let state = cache.get_by_id(run)?;
        if !state.succeeded {
            let reason = if state.ran {
                "solver run failed"
            } else {
                "solver run never completed"
            };
            self.skipped += 1;
            return Ok(EvalTicket::Skipped {
                run,
                reason: reason.to_string(),
            });
        }
        if let Some((job, table)) = self.by_run.get(&run) {
            if let Some(table) = table {
                cosmology.attach_hubble(table.clone())?;
            }
            self.reused += 1;
            return Ok(EvalTicket::Scheduled(*job));
        }
        let mut table = None;
        if cosmology.reads_hubble_from_file() {
            match load_hubble_table(&state.output_path) {
                Ok(loaded) => {
                    cosmology.attach_hubble(loaded.clone())?;
                    table = Some(loaded);
                }
                Err(err) => {
                    warn!(run = %run, error = %err, "hubble table unavailable");
                    self.skipped += 1;
                    return Ok(EvalTicket::Skipped {
                        run,
                        reason: format!("hubble table unavailable: {err}"),
                    });
                }
            }
        }
        let model = Arc::clone(&self.model);
        let grid = Arc::clone(&self.grid);
        let cosmo = cosmology.clone();
        let job = self
            .queue
            .submit(move || model.evaluate(&cosmo, &state, &grid));
        self.by_run.insert(run, (job, table));
        Ok(EvalTicket::Scheduled(job))
    }

    /// Adapter handing this phase to [`ksz_stencil::StencilDerivative::prep_evaluation`].
    pub fn scheduler<'a>(&'a mut self, cache: &'a RunCache) -> EvaluationScheduler<'a> {
        EvaluationScheduler { phase: self, cache }
    }

    /// Runs every queued evaluation.
    pub fn run<B: JobBackend>(&mut self, backend: &B) -> Result<PhaseStats, KszError> {
        self.queue.run_to_completion(backend)?;
        let outputs = self.queue.outputs();
        let failed = outputs.values().filter(|out| out.is_err()).count();
        let stats = PhaseStats {
            submitted: outputs.len(),
            succeeded: outputs.len() - failed,
            failed,
            reused: self.reused,
            skipped: self.skipped,
        };
        info!(
            submitted = stats.submitted,
            failed = stats.failed,
            skipped = stats.skipped,
            "evaluation phase complete"
        );
        Ok(stats)
    }

    /// Outputs keyed by job id, read by [`ksz_stencil::StencilDerivative::derivs`].
    pub fn outputs(&self) -> &BTreeMap<JobId, EvalOutput> {
        self.queue.outputs()
    }
}

/// [`EvaluationHook`] borrowing the phase and the run cache.
pub struct EvaluationScheduler<'a> {
    phase: &'a mut EvaluationPhase,
    cache: &'a RunCache,
}

impl EvaluationHook for EvaluationScheduler<'_> {
    fn schedule(&mut self, cosmology: &mut Cosmology, run: RunId) -> Result<EvalTicket, KszError> {
        self.phase.request(self.cache, cosmology, run)
    }
}
