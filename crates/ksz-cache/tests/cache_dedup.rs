use std::collections::BTreeSet;

use ksz_cache::{CacheConfig, RunCache, RunId};
use ksz_core::{CosmoParameter, Cosmology, GenerateParams, KszError};
use proptest::prelude::*;

fn config() -> CacheConfig {
    CacheConfig {
        database: "unused/cosmo_db.csv".into(),
        outputs_root: "outputs".into(),
    }
}

fn fiducial() -> Cosmology {
    Cosmology::generate(GenerateParams {
        axion_frac: 0.01,
        m_axion: 1.0e-26,
        read_hubble_from_file: true,
        ..GenerateParams::default()
    })
    .expect("fiducial")
}

#[test]
fn add_is_idempotent() {
    let mut cache = RunCache::empty(config());
    let first = cache.add(&fiducial());
    let second = cache.add(&fiducial());
    assert!(first.is_new);
    assert!(!second.is_new);
    assert_eq!(first.state, second.state);
    assert_eq!(cache.len(), 1);
}

#[test]
fn paths_encode_row_position() {
    let mut cache = RunCache::empty(config());
    cache.add(&fiducial());
    let other = fiducial().with_value(CosmoParameter::H, 0.7).unwrap();
    let admission = cache.add(&other);
    assert_eq!(admission.state.id, RunId::from_raw(1));
    assert_eq!(
        admission.state.output_path,
        std::path::Path::new("outputs/solver_out_ID=1")
    );
    assert_eq!(
        admission.state.log_path,
        std::path::Path::new("outputs/logs/solver_log_ID=1.log")
    );
}

#[test]
fn lookups_agree() {
    let mut cache = RunCache::empty(config());
    let cosmo = fiducial();
    let admission = cache.add(&cosmo);
    cache.mark_run(admission.state.id, true).unwrap();
    let by_id = cache.get_by_id(admission.state.id).unwrap();
    let by_fp = cache.get_by_fingerprint(&cosmo.fingerprint()).unwrap();
    let by_cosmo = cache.get_by_cosmology(&cosmo).unwrap();
    assert_eq!(by_id, by_fp);
    assert_eq!(by_fp, by_cosmo);
    assert!(by_id.ran && by_id.succeeded);
}

#[test]
fn misses_are_not_found() {
    let mut cache = RunCache::empty(config());
    assert!(matches!(
        cache.get_by_id(RunId::from_raw(4)),
        Err(KszError::NotFound(_))
    ));
    assert!(matches!(
        cache.get_by_cosmology(&fiducial()),
        Err(KszError::NotFound(_))
    ));
    assert!(matches!(
        cache.mark_run(RunId::from_raw(0), true),
        Err(KszError::NotFound(_))
    ));
    assert!(matches!(
        cache.mark_run_by_cosmology(&fiducial(), false),
        Err(KszError::NotFound(_))
    ));
}

#[test]
fn mark_by_cosmology_updates_the_labelled_row() {
    let mut cache = RunCache::empty(config());
    let a = fiducial();
    let b = fiducial().with_value(CosmoParameter::NS, 0.97).unwrap();
    cache.add(&a);
    cache.add(&b);
    cache.mark_run_by_cosmology(&b, false).unwrap();
    assert!(!cache.get_by_cosmology(&a).unwrap().ran);
    let state = cache.get_by_cosmology(&b).unwrap();
    assert!(state.failed());
    let summary = cache.summary();
    assert_eq!((summary.total, summary.failed, summary.pending), (2, 1, 1));
}

#[test]
fn record_reconstructs_cosmology() {
    let mut cache = RunCache::empty(config());
    let cosmo = fiducial();
    let id = cache.add(&cosmo).state.id;
    let rebuilt = cache.record(id).unwrap().cosmology();
    assert_eq!(rebuilt.fingerprint(), cosmo.fingerprint());
    assert!(rebuilt.reads_hubble_from_file());
}

proptest! {
    #[test]
    fn at_most_one_record_per_fingerprint(picks in proptest::collection::vec(0usize..6, 1..40)) {
        let values = [0.60, 0.62, 0.64, 0.66, 0.68, 0.70];
        let base = fiducial();
        let mut cache = RunCache::empty(config());
        let mut new_count = 0;
        for pick in &picks {
            let cosmo = base.with_value(CosmoParameter::H, values[*pick]).unwrap();
            if cache.add(&cosmo).is_new {
                new_count += 1;
            }
        }
        let distinct: BTreeSet<_> = picks.iter().collect();
        prop_assert_eq!(cache.len(), distinct.len());
        prop_assert_eq!(new_count, distinct.len());
    }
}
