//! Sweep coordinator: one two-phase pass per axion mass.

use std::sync::Arc;

use ksz_cache::RunCache;
use ksz_core::{Cosmology, ErrorInfo, GenerateParams, KszError};
use ksz_queue::JobBackend;
use ksz_stencil::StencilDerivative;
use nalgebra::DMatrix;
use tracing::{error, info, info_span, warn};

use crate::model::{EvaluationGrid, ObservableModel};
use crate::output::{format_mass, DerivativeLabel, DerivativeTensor};
use crate::plan::ForecastPlan;
use crate::report::{DerivativeFailure, ForecastReport, MassReport, MassStatus};
use crate::scheduler::{EvaluationPhase, PrecomputePhase};
use crate::solver::TransferSolver;

struct PlannedDerivative {
    stencil: StencilDerivative,
    label: DerivativeLabel,
}

/// Owns the run cache for the duration of a sweep and is its only writer.
pub struct ForecastDriver<B> {
    plan: ForecastPlan,
    cache: RunCache,
    solver: Arc<dyn TransferSolver>,
    model: Arc<dyn ObservableModel>,
    backend: B,
}

impl<B: JobBackend> ForecastDriver<B> {
    pub fn new(
        plan: ForecastPlan,
        cache: RunCache,
        solver: Arc<dyn TransferSolver>,
        model: Arc<dyn ObservableModel>,
        backend: B,
    ) -> Self {
        Self {
            plan,
            cache,
            solver,
            model,
            backend,
        }
    }

    pub fn plan(&self) -> &ForecastPlan {
        &self.plan
    }

    pub fn cache(&self) -> &RunCache {
        &self.cache
    }

    /// Hands the cache back, e.g. to inspect it after a run.
    pub fn into_cache(self) -> RunCache {
        self.cache
    }

    /// Runs every mass, saves the cache once, then writes the report.
    ///
    /// A failing mass is recorded in the report and the sweep moves on;
    /// only cache and report persistence errors abort the run.
    pub fn run(&mut self) -> Result<ForecastReport, KszError> {
        self.plan.validate()?;
        let output_dir = self.plan.output_dir();
        let masses = self.plan.axion_masses.clone();
        let mut reports = Vec::with_capacity(masses.len());
        for mass in masses {
            let span = info_span!("axion_mass", mass = %format_mass(mass));
            let _guard = span.enter();
            let report = self.run_mass(mass).unwrap_or_else(|err| {
                error!(error = %err, "mass iteration aborted");
                MassReport {
                    axion_mass: mass,
                    derivatives: 0,
                    precompute: Default::default(),
                    evaluation: Default::default(),
                    status: MassStatus::Aborted { error: err },
                }
            });
            reports.push(report);
        }

        self.cache.save()?;
        let report = ForecastReport::new(self.plan.plan_hash()?, reports, self.cache.summary());
        let path = report.write(&output_dir)?;
        info!(
            path = %path.display(),
            completed = report.completed(),
            masses = report.masses.len(),
            "forecast finished"
        );
        Ok(report)
    }

    fn fiducials(&self, mass: f64) -> Result<Vec<Cosmology>, KszError> {
        self.plan
            .axion_fractions
            .iter()
            .map(|&axion_frac| {
                Cosmology::generate(GenerateParams {
                    axion_frac,
                    m_axion: mass,
                    read_hubble_from_file: self.plan.read_hubble_from_file,
                    ..GenerateParams::default()
                })
            })
            .collect()
    }

    fn build_derivatives(&self, fiducials: &[Cosmology]) -> Result<Vec<PlannedDerivative>, KszError> {
        let mut planned = Vec::new();
        for (fiducial, &axion_frac) in fiducials.iter().zip(&self.plan.axion_fractions) {
            for spec in &self.plan.parameters {
                for &step_size in &spec.steps {
                    let stencil = StencilDerivative::with_perturbation(
                        fiducial,
                        spec.parameter,
                        &self.plan.stencil,
                        step_size,
                        self.plan.perturbation,
                    )?;
                    planned.push(PlannedDerivative {
                        stencil,
                        label: DerivativeLabel {
                            parameter: spec.parameter,
                            step_size,
                            axion_frac,
                        },
                    });
                }
            }
        }
        Ok(planned)
    }

    fn run_mass(&mut self, mass: f64) -> Result<MassReport, KszError> {
        let fiducials = self.fiducials(mass)?;
        let survey = match fiducials.first() {
            Some(fiducial) => self.plan.survey.build(fiducial)?,
            None => {
                return Err(KszError::Config(ErrorInfo::new(
                    "plan-fractions",
                    "plan lists no axion fractions",
                )))
            }
        };
        let grid = EvaluationGrid {
            redshifts: survey.center_z().to_vec(),
            separations: self.plan.separations.values(),
        };
        let mut planned = self.build_derivatives(&fiducials)?;
        info!(derivatives = planned.len(), "stencils built");

        let mut precompute = PrecomputePhase::new(Arc::clone(&self.solver));
        for item in &mut planned {
            item.stencil
                .prep_parameters(&mut precompute.scheduler(&mut self.cache))?;
        }
        let precompute_stats = precompute.run(&self.backend, &mut self.cache)?;

        let mut evaluation = EvaluationPhase::new(Arc::clone(&self.model), grid);
        for item in &mut planned {
            item.stencil
                .prep_evaluation(&mut evaluation.scheduler(&self.cache))?;
        }
        let evaluation_stats = evaluation.run(&self.backend)?;

        let mut matrices: Vec<DMatrix<f64>> = Vec::with_capacity(planned.len());
        let mut failures = Vec::new();
        for item in &mut planned {
            match item.stencil.derivs(evaluation.outputs()) {
                Ok(matrix) => matrices.push(matrix),
                Err(err) => {
                    warn!(derivative = %item.stencil.label(), error = %err, "derivative failed");
                    failures.push(DerivativeFailure {
                        label: item.stencil.label(),
                        axion_frac: item.label.axion_frac,
                        error: err,
                    });
                }
            }
        }

        let status = if failures.is_empty() {
            let grid = evaluation.grid();
            let tensor = DerivativeTensor::from_matrices(
                mass,
                planned.iter().map(|item| item.label.clone()).collect(),
                grid.redshifts.clone(),
                grid.separations.clone(),
                &matrices,
            )?;
            let files = tensor.write(&self.plan.output_dir())?;
            info!(path = %files.tensor.display(), "derivative tensor written");
            MassStatus::Completed { files }
        } else {
            MassStatus::Incomplete { failures }
        };
        Ok(MassReport {
            axion_mass: mass,
            derivatives: planned.len(),
            precompute: precompute_stats,
            evaluation: evaluation_stats,
            status,
        })
    }
}
