use std::collections::BTreeMap;
use std::fmt;

use ksz_cache::RunId;
use ksz_core::{CosmoParameter, Cosmology, ErrorInfo, KszError};
use ksz_queue::JobId;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coefficients::{finite_difference_coefficients, Perturbation};
use crate::hooks::{EvalTicket, EvaluationHook, PrecomputeHook};

/// Output of one evaluation job: a `(redshift, separation)` array or the error it raised.
pub type EvalOutput = Result<DMatrix<f64>, KszError>;

/// Lifecycle of a [`StencilDerivative`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StencilState {
    /// Points computed, nothing scheduled.
    Built,
    /// Every point admitted to the run cache.
    PrecomputeScheduled,
    /// Every point has an evaluation ticket.
    EvaluationScheduled,
    /// Derivative assembled.
    Resolved,
}

impl fmt::Display for StencilState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StencilState::Built => "built",
            StencilState::PrecomputeScheduled => "precompute-scheduled",
            StencilState::EvaluationScheduled => "evaluation-scheduled",
            StencilState::Resolved => "resolved",
        };
        f.write_str(label)
    }
}

/// One perturbed cosmology of a stencil.
#[derive(Debug, Clone)]
pub struct StencilPoint {
    /// Stencil offset.
    pub multiplier: f64,
    /// Parameter value at this offset.
    pub value: f64,
    /// Cosmology with only the target parameter changed.
    pub cosmology: Cosmology,
    /// Run cache record, set by `prep_parameters`.
    pub run: Option<RunId>,
    /// Evaluation job, set by `prep_evaluation`.
    pub ticket: EvalTicket,
}

/// Finite-difference derivative of an observable with respect to one parameter.
#[derive(Debug, Clone)]
pub struct StencilDerivative {
    parameter: CosmoParameter,
    fiducial: Cosmology,
    fiducial_value: f64,
    step_size: f64,
    perturbation: Perturbation,
    coefficients: Vec<f64>,
    points: Vec<StencilPoint>,
    state: StencilState,
    resolved: Option<DMatrix<f64>>,
}

impl StencilDerivative {
    /// Builds a multiplicative stencil around the fiducial value of `parameter`.
    pub fn new(
        fiducial: &Cosmology,
        parameter: CosmoParameter,
        multipliers: &[f64],
        step_size: f64,
    ) -> Result<Self, KszError> {
        Self::with_perturbation(
            fiducial,
            parameter,
            multipliers,
            step_size,
            Perturbation::Multiplicative,
        )
    }

    /// Builds a stencil with an explicit perturbation policy.
    pub fn with_perturbation(
        fiducial: &Cosmology,
        parameter: CosmoParameter,
        multipliers: &[f64],
        step_size: f64,
        perturbation: Perturbation,
    ) -> Result<Self, KszError> {
        if !(step_size.is_finite() && step_size > 0.0) {
            return Err(KszError::Stencil(
                ErrorInfo::new("stencil-step", "step size must be positive and finite")
                    .with_context("parameter", parameter.name())
                    .with_context("step", step_size.to_string()),
            ));
        }
        let coefficients = finite_difference_coefficients(multipliers, 1)?;
        let fiducial_value = fiducial.value(parameter);
        let scale = perturbation.scale(fiducial_value, step_size);
        if !(scale.is_finite() && scale != 0.0) {
            return Err(KszError::Stencil(
                ErrorInfo::new("stencil-scale", "stencil spacing is zero or non-finite")
                    .with_context("parameter", parameter.name())
                    .with_context("fiducial", fiducial_value.to_string())
                    .with_hint("use an additive perturbation for parameters with a zero fiducial"),
            ));
        }

        let points = multipliers
            .iter()
            .map(|&multiplier| {
                let value = perturbation.value(fiducial_value, multiplier, step_size);
                Ok(StencilPoint {
                    multiplier,
                    value,
                    cosmology: fiducial.with_value(parameter, value)?,
                    run: None,
                    ticket: EvalTicket::Pending,
                })
            })
            .collect::<Result<Vec<_>, KszError>>()?;

        Ok(Self {
            parameter,
            fiducial: fiducial.clone(),
            fiducial_value,
            step_size,
            perturbation,
            coefficients,
            points,
            state: StencilState::Built,
            resolved: None,
        })
    }

    /// Parameter being differentiated.
    pub fn parameter(&self) -> CosmoParameter {
        self.parameter
    }

    /// Fiducial cosmology the stencil is centred on.
    pub fn fiducial(&self) -> &Cosmology {
        &self.fiducial
    }

    /// Fiducial value of the parameter.
    pub fn fiducial_value(&self) -> f64 {
        self.fiducial_value
    }

    /// Fractional (or absolute, for additive stencils) step size.
    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    /// Perturbation policy.
    pub fn perturbation(&self) -> Perturbation {
        self.perturbation
    }

    /// Stencil offsets in construction order.
    pub fn multipliers(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.multiplier).collect()
    }

    /// Parameter values in construction order.
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Finite-difference weights aligned with the multipliers.
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Stencil points.
    pub fn points(&self) -> &[StencilPoint] {
        &self.points
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StencilState {
        self.state
    }

    /// Label such as `axion_frac@0.05` used in logs and output metadata.
    pub fn label(&self) -> String {
        format!("{}@{}", self.parameter, self.step_size)
    }

    /// Admits every stencil cosmology through the precompute hook.
    pub fn prep_parameters<H>(&mut self, hook: &mut H) -> Result<(), KszError>
    where
        H: PrecomputeHook + ?Sized,
    {
        self.expect_state(StencilState::Built, "prep_parameters")?;
        for point in &mut self.points {
            point.run = Some(hook.schedule(&point.cosmology)?);
        }
        debug!(derivative = %self.label(), points = self.points.len(), "stencil admitted");
        self.state = StencilState::PrecomputeScheduled;
        Ok(())
    }

    /// Requests an evaluation ticket for every point once the precompute phase is done.
    pub fn prep_evaluation<H>(&mut self, hook: &mut H) -> Result<(), KszError>
    where
        H: EvaluationHook + ?Sized,
    {
        self.expect_state(StencilState::PrecomputeScheduled, "prep_evaluation")?;
        let label = self.label();
        for point in &mut self.points {
            let run = point.run.ok_or_else(|| {
                KszError::Stencil(
                    ErrorInfo::new("stencil-unadmitted", "stencil point has no run record")
                        .with_context("derivative", label.clone())
                        .with_context("multiplier", point.multiplier.to_string()),
                )
            })?;
            point.ticket = hook.schedule(&mut point.cosmology, run)?;
        }
        self.state = StencilState::EvaluationScheduled;
        Ok(())
    }

    /// Combines this stencil's evaluation outputs into the derivative.
    ///
    /// Every point must have an output; a missing job id, a skipped point or a
    /// failed evaluation fails the whole derivative.
    pub fn derivs(
        &mut self,
        outputs: &BTreeMap<JobId, EvalOutput>,
    ) -> Result<DMatrix<f64>, KszError> {
        if let Some(resolved) = &self.resolved {
            return Ok(resolved.clone());
        }
        self.expect_state(StencilState::EvaluationScheduled, "derivs")?;
        let label = self.label();

        let mut acc: Option<DMatrix<f64>> = None;
        for (point, &coefficient) in self.points.iter().zip(&self.coefficients) {
            let result = match &point.ticket {
                EvalTicket::Scheduled(job) => match outputs.get(job) {
                    Some(Ok(result)) => result,
                    Some(Err(err)) => return Err(err.clone()),
                    None => {
                        return Err(KszError::MissingOutput(
                            ErrorInfo::new("missing-output", "evaluation output absent")
                                .with_context("derivative", label)
                                .with_context("job", job.to_string())
                                .with_context("multiplier", point.multiplier.to_string()),
                        ))
                    }
                },
                EvalTicket::Skipped { run, reason } => {
                    return Err(KszError::RunFailure(
                        ErrorInfo::new("stencil-point-skipped", reason.clone())
                            .with_context("derivative", label)
                            .with_context("run", run.to_string())
                            .with_context("multiplier", point.multiplier.to_string()),
                    ))
                }
                EvalTicket::Pending => {
                    return Err(KszError::Stencil(
                        ErrorInfo::new("stencil-unscheduled", "stencil point was never scheduled")
                            .with_context("derivative", label)
                            .with_context("multiplier", point.multiplier.to_string()),
                    ))
                }
            };
            acc = Some(match acc.take() {
                None => result * coefficient,
                Some(mut sum) => {
                    if sum.shape() != result.shape() {
                        return Err(KszError::Stencil(
                            ErrorInfo::new("stencil-shape", "evaluation outputs differ in shape")
                                .with_context("derivative", label)
                                .with_context("expected", format!("{:?}", sum.shape()))
                                .with_context("found", format!("{:?}", result.shape())),
                        ));
                    }
                    sum += result * coefficient;
                    sum
                }
            });
        }

        let scale = self.perturbation.scale(self.fiducial_value, self.step_size);
        let derivative = acc
            .map(|sum| sum / scale)
            .ok_or_else(|| KszError::Stencil(ErrorInfo::new("stencil-empty", "stencil has no points")))?;
        self.resolved = Some(derivative.clone());
        self.state = StencilState::Resolved;
        debug!(derivative = %self.label(), "derivative resolved");
        Ok(derivative)
    }

    fn expect_state(&self, expected: StencilState, operation: &str) -> Result<(), KszError> {
        if self.state == expected {
            return Ok(());
        }
        Err(KszError::Stencil(
            ErrorInfo::new("invalid-transition", "operation not allowed in the current state")
                .with_context("derivative", self.label())
                .with_context("operation", operation)
                .with_context("state", self.state.to_string())
                .with_context("expected", expected.to_string()),
        ))
    }
}
