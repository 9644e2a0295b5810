use std::collections::BTreeMap;

use ksz_cache::{CacheConfig, RunCache, RunId};
use ksz_core::{CosmoParameter, Cosmology, GenerateParams, KszError};
use ksz_queue::{JobId, Phase, PhaseQueue, SerialBackend};
use ksz_stencil::{EvalOutput, EvalTicket, Perturbation, StencilDerivative, StencilState};
use nalgebra::DMatrix;
use proptest::prelude::*;

fn fiducial(h: f64) -> Cosmology {
    Cosmology::generate(GenerateParams {
        h,
        axion_frac: 0.05,
        ..GenerateParams::default()
    })
    .unwrap()
}

/// Minimal coordinator: admits, runs the solver stub, evaluates `observable`.
struct Harness {
    cache: RunCache,
    precompute: PhaseQueue<bool>,
    evaluation: PhaseQueue<EvalOutput>,
    job_runs: BTreeMap<JobId, RunId>,
    solver_succeeds: bool,
}

impl Harness {
    fn new(solver_succeeds: bool) -> Self {
        Self {
            cache: RunCache::empty(CacheConfig::default()),
            precompute: PhaseQueue::new(Phase::Precompute),
            evaluation: PhaseQueue::new(Phase::Evaluation),
            job_runs: BTreeMap::new(),
            solver_succeeds,
        }
    }

    fn resolve(
        &mut self,
        stencils: &mut [StencilDerivative],
        param: CosmoParameter,
        observable: fn(f64) -> f64,
    ) -> Vec<Result<DMatrix<f64>, KszError>> {
        for stencil in stencils.iter_mut() {
            let cache = &mut self.cache;
            let queue = &mut self.precompute;
            let job_runs = &mut self.job_runs;
            let succeeds = self.solver_succeeds;
            stencil
                .prep_parameters(&mut |cosmo: &Cosmology| -> Result<RunId, KszError> {
                    let admission = cache.add(cosmo);
                    if !admission.state.ran && !job_runs.values().any(|r| *r == admission.state.id) {
                        let job = queue.submit(move || succeeds);
                        job_runs.insert(job, admission.state.id);
                    }
                    Ok(admission.state.id)
                })
                .unwrap();
        }
        self.precompute.run_to_completion(&SerialBackend).unwrap();
        for (job, run) in &self.job_runs {
            let ok = self.precompute.outputs()[job];
            self.cache.mark_run(*run, ok).unwrap();
        }

        for stencil in stencils.iter_mut() {
            let cache = &self.cache;
            let queue = &mut self.evaluation;
            stencil
                .prep_evaluation(&mut |cosmo: &mut Cosmology, run: RunId| -> Result<EvalTicket, KszError> {
                    let state = cache.get_by_id(run)?;
                    if state.failed() {
                        return Ok(EvalTicket::Skipped {
                            run,
                            reason: "solver failed".to_string(),
                        });
                    }
                    let x = cosmo.value(param);
                    Ok(EvalTicket::Scheduled(queue.submit(move || {
                        Ok(DMatrix::from_element(1, 2, observable(x)))
                    })))
                })
                .unwrap();
        }
        self.evaluation.run_to_completion(&SerialBackend).unwrap();
        let outputs = self.evaluation.outputs();
        stencils.iter_mut().map(|s| s.derivs(outputs)).collect()
    }
}

#[test]
fn five_point_stencil_is_exact_for_quadratics() {
    let fid = fiducial(0.7);
    let mut stencils =
        vec![StencilDerivative::new(&fid, CosmoParameter::H, &[-2.0, -1.0, 0.0, 1.0, 2.0], 0.05).unwrap()];
    let mut harness = Harness::new(true);
    let result = harness.resolve(&mut stencils, CosmoParameter::H, |x| x * x);
    let derivative = result[0].as_ref().unwrap();
    assert_eq!(derivative.shape(), (1, 2));
    assert!((derivative[(0, 0)] - 1.4).abs() < 1.4e-3);
    assert_eq!(stencils[0].state(), StencilState::Resolved);
}

#[test]
fn three_point_hubble_stencil_end_to_end() {
    let fid = fiducial(0.7);
    let mut stencils =
        vec![StencilDerivative::new(&fid, CosmoParameter::H, &[-1.0, 0.0, 1.0], 0.1).unwrap()];
    let values = stencils[0].values();
    assert!((values[0] - 0.63).abs() < 1e-12);
    assert!((values[2] - 0.77).abs() < 1e-12);

    let mut harness = Harness::new(true);
    let result = harness.resolve(&mut stencils, CosmoParameter::H, |x| x);
    assert!((result[0].as_ref().unwrap()[(0, 1)] - 1.0).abs() < 1e-9);
    let summary = harness.cache.summary();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 3);
}

#[test]
fn stencils_share_the_fiducial_run() {
    let fid = fiducial(0.7);
    let mut stencils = vec![
        StencilDerivative::new(&fid, CosmoParameter::H, &[-1.0, 0.0, 1.0], 0.1).unwrap(),
        StencilDerivative::new(&fid, CosmoParameter::H, &[-1.0, 0.0, 1.0], 0.05).unwrap(),
        StencilDerivative::new(&fid, CosmoParameter::AxionFrac, &[-1.0, 0.0, 1.0], 0.1).unwrap(),
    ];
    let mut harness = Harness::new(true);
    for stencil in &mut stencils {
        let cache = &mut harness.cache;
        stencil
            .prep_parameters(&mut |c: &Cosmology| -> Result<RunId, KszError> { Ok(cache.add(c).state.id) })
            .unwrap();
    }
    // Three stencils of three points each, sharing one zero-offset cosmology.
    assert_eq!(harness.cache.len(), 7);
    let centre: Vec<_> = stencils.iter().map(|s| s.points()[1].run).collect();
    assert!(centre.iter().all(|run| *run == centre[0]));
}

#[test]
fn failed_runs_fail_the_derivative() {
    let fid = fiducial(0.7);
    let mut stencils =
        vec![StencilDerivative::new(&fid, CosmoParameter::NS, &[-1.0, 0.0, 1.0], 0.1).unwrap()];
    let mut harness = Harness::new(false);
    let result = harness.resolve(&mut stencils, CosmoParameter::NS, |x| x);
    match &result[0] {
        Err(KszError::RunFailure(info)) => assert_eq!(info.code, "stencil-point-skipped"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(harness.evaluation.outputs().len(), 0);
}

fn scheduled(fid: &Cosmology, queue: &mut PhaseQueue<EvalOutput>) -> StencilDerivative {
    let mut stencil =
        StencilDerivative::new(fid, CosmoParameter::OmegaB, &[-1.0, 0.0, 1.0], 0.1).unwrap();
    let mut next = 0usize;
    stencil
        .prep_parameters(&mut |_: &Cosmology| -> Result<RunId, KszError> {
            next += 1;
            Ok(RunId::from_raw(next - 1))
        })
        .unwrap();
    stencil
        .prep_evaluation(&mut |_: &mut Cosmology, _: RunId| -> Result<EvalTicket, KszError> {
            Ok(EvalTicket::Scheduled(queue.submit(|| Ok(DMatrix::zeros(2, 2)))))
        })
        .unwrap();
    stencil
}

#[test]
fn missing_output_is_reported() {
    let fid = fiducial(0.7);
    let mut queue = PhaseQueue::new(Phase::Evaluation);
    let mut stencil = scheduled(&fid, &mut queue);
    let err = stencil.derivs(&BTreeMap::new()).unwrap_err();
    assert!(matches!(err, KszError::MissingOutput(_)));
    assert_eq!(stencil.state(), StencilState::EvaluationScheduled);
}

#[test]
fn evaluation_errors_pass_through() {
    let fid = fiducial(0.7);
    let mut queue = PhaseQueue::new(Phase::Evaluation);
    let mut stencil = scheduled(&fid, &mut queue);
    queue.run_to_completion(&SerialBackend).unwrap();
    let mut outputs = queue.outputs().clone();
    let first = *outputs.keys().next().unwrap();
    let failure = KszError::Config(ksz_core::ErrorInfo::new("hubble-range", "out of range"));
    outputs.insert(first, Err(failure.clone()));
    assert_eq!(stencil.derivs(&outputs).unwrap_err(), failure);
}

#[test]
fn shape_mismatch_is_rejected() {
    let fid = fiducial(0.7);
    let mut queue = PhaseQueue::new(Phase::Evaluation);
    let mut stencil = scheduled(&fid, &mut queue);
    queue.run_to_completion(&SerialBackend).unwrap();
    let mut outputs = queue.outputs().clone();
    let last = *outputs.keys().last().unwrap();
    outputs.insert(last, Ok(DMatrix::zeros(3, 2)));
    let err = stencil.derivs(&outputs).unwrap_err();
    assert_eq!(err.info().code, "stencil-shape");
}

#[test]
fn out_of_order_transitions_are_rejected() {
    let fid = fiducial(0.7);
    let mut stencil =
        StencilDerivative::new(&fid, CosmoParameter::H, &[-1.0, 0.0, 1.0], 0.1).unwrap();
    let err = stencil
        .prep_evaluation(&mut |_: &mut Cosmology, run: RunId| -> Result<EvalTicket, KszError> {
            Ok(EvalTicket::Skipped {
                run,
                reason: String::new(),
            })
        })
        .unwrap_err();
    assert_eq!(err.info().code, "invalid-transition");
    assert!(stencil.derivs(&BTreeMap::new()).is_err());

    stencil
        .prep_parameters(&mut |_: &Cosmology| -> Result<RunId, KszError> { Ok(RunId::from_raw(0)) })
        .unwrap();
    let err = stencil
        .prep_parameters(&mut |_: &Cosmology| -> Result<RunId, KszError> { Ok(RunId::from_raw(0)) })
        .unwrap_err();
    assert!(matches!(err, KszError::Stencil(_)));
    assert_eq!(stencil.state(), StencilState::PrecomputeScheduled);
}

#[test]
fn resolved_derivative_is_memoised() {
    let fid = fiducial(0.7);
    let mut queue = PhaseQueue::new(Phase::Evaluation);
    let mut stencil = scheduled(&fid, &mut queue);
    queue.run_to_completion(&SerialBackend).unwrap();
    let first = stencil.derivs(queue.outputs()).unwrap();
    let again = stencil.derivs(&BTreeMap::new()).unwrap();
    assert_eq!(first, again);
}

#[test]
fn additive_stencils_handle_zero_fiducials() {
    let fid = Cosmology::generate(GenerateParams::default()).unwrap();
    assert!(StencilDerivative::new(&fid, CosmoParameter::AxionFrac, &[0.0, 1.0, 2.0], 0.1).is_err());
    let stencil = StencilDerivative::with_perturbation(
        &fid,
        CosmoParameter::AxionFrac,
        &[0.0, 1.0, 2.0],
        0.01,
        Perturbation::Additive,
    )
    .unwrap();
    let values = stencil.values();
    assert_eq!(values[0], 0.0);
    assert!((values[2] - 0.02).abs() < 1e-15);
    assert_eq!(stencil.label(), "axion_frac@0.01");
}

#[test]
fn rejects_bad_step_sizes() {
    let fid = fiducial(0.7);
    for step in [0.0, -0.1, f64::NAN] {
        let err = StencilDerivative::new(&fid, CosmoParameter::H, &[-1.0, 1.0], step).unwrap_err();
        assert_eq!(err.info().code, "stencil-step");
    }
}

proptest! {
    #[test]
    fn linear_observables_have_constant_derivative(
        slope in -5.0f64..5.0,
        step in 0.001f64..0.2,
        h in 0.5f64..0.9,
    ) {
        let fid = fiducial(h);
        let mut queue = PhaseQueue::new(Phase::Evaluation);
        let mut stencil =
            StencilDerivative::new(&fid, CosmoParameter::H, &[-2.0, -1.0, 0.0, 1.0, 2.0], step).unwrap();
        stencil.prep_parameters(&mut |_: &Cosmology| -> Result<RunId, KszError> { Ok(RunId::from_raw(0)) }).unwrap();
        stencil
            .prep_evaluation(&mut |c: &mut Cosmology, _: RunId| -> Result<EvalTicket, KszError> {
                let x = c.value(CosmoParameter::H);
                Ok(EvalTicket::Scheduled(queue.submit(move || Ok(DMatrix::from_element(1, 1, slope * x + 3.0)))))
            })
            .unwrap();
        queue.run_to_completion(&SerialBackend).unwrap();
        let derivative = stencil.derivs(queue.outputs()).unwrap();
        prop_assert!((derivative[(0, 0)] - slope).abs() < 1e-6);
    }
}
