use ksz_core::{fingerprint, CosmoParameter, CosmoParams, Cosmology, HubbleTable};
use proptest::prelude::*;

fn params(h: f64, omega_cdm: f64, n_s: f64) -> CosmoParams {
    CosmoParams {
        h,
        omega_cdm,
        omega_b: 0.02233,
        omega_axion: 0.001,
        m_axion: 1.0e-26,
        n_s,
        a_s: 2.1e-9,
    }
}

#[test]
fn fingerprint_is_hex_sha256() {
    let cosmo = Cosmology::new(params(0.7, 0.12, 0.96), false);
    let fp = fingerprint(&cosmo);
    assert_eq!(fp.as_str().len(), 64);
    assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn hubble_discriminant_changes_fingerprint() {
    let analytic = Cosmology::new(params(0.7, 0.12, 0.96), false);
    let from_file = Cosmology::new(params(0.7, 0.12, 0.96), true);
    assert_ne!(analytic.fingerprint(), from_file.fingerprint());
}

#[test]
fn attached_table_does_not_change_fingerprint() {
    let mut cosmo = Cosmology::new(params(0.7, 0.12, 0.96), true);
    let before = cosmo.fingerprint();
    cosmo
        .attach_hubble(HubbleTable::new(vec![0.0, 1.0], vec![70.0, 120.0]).unwrap())
        .unwrap();
    assert_eq!(before, cosmo.fingerprint());
}

#[test]
fn perturbed_copy_with_same_value_matches() {
    let cosmo = Cosmology::new(params(0.7, 0.12, 0.96), true);
    let same = cosmo.with_value(CosmoParameter::H, 0.7 * (1.0 + 0.0 * 0.05)).unwrap();
    assert_eq!(cosmo.fingerprint(), same.fingerprint());
}

#[test]
fn fingerprint_known_vector_is_stable() {
    // Persisted run caches match on these digests; changing them needs a FINGERPRINT_VERSION bump.
    let analytic = Cosmology::new(params(0.7, 0.12, 0.96), false);
    assert_eq!(
        fingerprint(&analytic).as_str(),
        "b0a7a7019df8223460b4d1a0544f81c50aee1b6ca2e52ab687844b6d69345e6c"
    );
    let from_file = Cosmology::new(params(0.7, 0.12, 0.96), true);
    assert_eq!(
        fingerprint(&from_file).as_str(),
        "fd08e8f66a1704efed9d14d4c653277cf5216be09adc28e161e61a986dc8cfdc"
    );
}

proptest! {
    #[test]
    fn equal_tuples_share_fingerprints(h in 0.5f64..0.9, omega in 0.05f64..0.2, n_s in 0.9f64..1.0, flag in any::<bool>()) {
        let a = Cosmology::new(params(h, omega, n_s), flag);
        let b = Cosmology::new(params(h, omega, n_s), flag);
        prop_assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn distinct_tuples_differ(h in 0.5f64..0.9, delta in 1.0e-12f64..1.0e-3) {
        let a = Cosmology::new(params(h, 0.12, 0.96), false);
        let b = Cosmology::new(params(h + delta, 0.12, 0.96), false);
        prop_assume!(a.params().h.to_bits() != b.params().h.to_bits());
        prop_assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
