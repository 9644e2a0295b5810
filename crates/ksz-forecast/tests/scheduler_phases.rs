use std::fs;
use std::path::Path;
use std::sync::Arc;

use ksz_cache::{CacheConfig, RunCache, RunState};
use ksz_core::{CosmoParameter, Cosmology, GenerateParams, HubbleSource, KszError};
use ksz_forecast::{
    artifact_path, EvaluationGrid, EvaluationPhase, ObservableModel, PrecomputePhase,
    TransferSolver,
};
use ksz_queue::{Job, JobBackend, SerialBackend};
use ksz_stencil::EvalTicket;
use nalgebra::DMatrix;
use tempfile::tempdir;

struct AlwaysOk;

impl TransferSolver for AlwaysOk {
    fn run(&self, _cosmology: &Cosmology, _run: &RunState) -> bool {
        true
    }
}

struct ZeroModel;

impl ObservableModel for ZeroModel {
    fn evaluate(
        &self,
        _cosmology: &Cosmology,
        _run: &RunState,
        grid: &EvaluationGrid,
    ) -> Result<DMatrix<f64>, KszError> {
        let (nz, nr) = grid.shape();
        Ok(DMatrix::zeros(nz, nr))
    }
}

/// Runs nothing and reports no outputs.
struct DroppingBackend;

impl JobBackend for DroppingBackend {
    fn execute<T: Send>(&self, _jobs: Vec<Job<T>>) -> Result<Vec<T>, KszError> {
        Ok(Vec::new())
    }

    fn label(&self) -> String {
        "dropping".to_string()
    }
}

fn open_cache(root: &Path) -> RunCache {
    RunCache::open(CacheConfig {
        database: root.join("cosmo_db.csv"),
        outputs_root: root.join("solver_outputs"),
    })
    .unwrap()
}

fn fiducial() -> Cosmology {
    Cosmology::generate(GenerateParams {
        read_hubble_from_file: true,
        ..GenerateParams::default()
    })
    .unwrap()
}

fn grid() -> EvaluationGrid {
    EvaluationGrid {
        redshifts: vec![0.1, 0.2],
        separations: vec![20.0, 40.0, 60.0],
    }
}

fn has_table(cosmology: &Cosmology) -> bool {
    matches!(cosmology.hubble_source(), HubbleSource::FromFile { table: Some(_) })
}

#[test]
fn reused_evaluation_still_attaches_hubble_table() {
    let dir = tempdir().unwrap();
    let mut cache = open_cache(dir.path());
    let base = fiducial();
    assert!(base.reads_hubble_from_file());
    let state = cache.add(&base).state;
    cache.mark_run(state.id, true).unwrap();
    fs::create_dir_all(state.output_path.parent().unwrap()).unwrap();
    fs::write(
        artifact_path(&state.output_path, "_hubble.csv"),
        "z,hubble\n0.0,67.0\n1.0,120.0\n",
    )
    .unwrap();

    let mut phase = EvaluationPhase::new(Arc::new(ZeroModel), grid());
    let mut first = base.clone();
    let mut second = base.with_value(CosmoParameter::H, base.params().h).unwrap();
    let a = phase.request(&cache, &mut first, state.id).unwrap();
    let b = phase.request(&cache, &mut second, state.id).unwrap();

    assert!(matches!(a, EvalTicket::Scheduled(_)));
    assert_eq!(a, b);
    assert!(has_table(&first));
    assert!(has_table(&second));
    assert_eq!(second.hubble_at(1.0).unwrap(), 120.0);

    let stats = phase.run(&SerialBackend).unwrap();
    assert_eq!(stats.submitted, 1);
    assert_eq!(stats.reused, 1);
    assert_eq!(stats.skipped, 0);
}

#[test]
fn lost_solver_outputs_fail_the_phase() {
    let dir = tempdir().unwrap();
    let mut cache = open_cache(dir.path());
    let mut phase = PrecomputePhase::new(Arc::new(AlwaysOk));
    let run = phase.admit(&mut cache, &fiducial()).unwrap();

    let err = phase.run(&DroppingBackend, &mut cache).unwrap_err();
    assert!(matches!(err, KszError::Queue(_)), "{err:?}");
    let state = cache.get_by_id(run).unwrap();
    assert!(!state.ran);
}

#[test]
fn precompute_marks_every_submitted_run() {
    let dir = tempdir().unwrap();
    let mut cache = open_cache(dir.path());
    let mut phase = PrecomputePhase::new(Arc::new(AlwaysOk));
    let base = fiducial();
    let runs = [
        phase.admit(&mut cache, &base).unwrap(),
        phase
            .admit(&mut cache, &base.with_value(CosmoParameter::H, 0.7).unwrap())
            .unwrap(),
        phase.admit(&mut cache, &base).unwrap(),
    ];
    assert_eq!(runs[0], runs[2]);

    let stats = phase.run(&SerialBackend, &mut cache).unwrap();
    assert_eq!(stats.submitted, 2);
    assert_eq!(stats.succeeded, 2);
    assert_eq!(stats.reused, 1);
    for run in runs {
        let state = cache.get_by_id(run).unwrap();
        assert!(state.ran && state.succeeded);
    }
}
