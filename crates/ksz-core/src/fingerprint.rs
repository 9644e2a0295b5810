//! Deterministic cosmology fingerprints.
//!
//! The digest covers the exact bit patterns of every physical parameter plus
//! the Hubble-source discriminant. Attached Hubble tables are excluded so a
//! cosmology keeps its fingerprint across the solver run that produced them.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::cosmology::Cosmology;

/// Version tag mixed into every digest; bump when the layout below changes.
pub const FINGERPRINT_VERSION: &str = "cosmo-fp-v1";

/// Hex encoded SHA-256 digest identifying a cosmology.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wraps an already computed digest, e.g. one read back from the run cache.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Computes the fingerprint of a cosmology.
pub fn fingerprint(cosmology: &Cosmology) -> Fingerprint {
    let p = cosmology.params();
    let fields = [
        ("h", p.h),
        ("omega_cdm", p.omega_cdm),
        ("omega_b", p.omega_b),
        ("omega_axion", p.omega_axion),
        ("m_axion", p.m_axion),
        ("n_s", p.n_s),
        ("A_s", p.a_s),
    ];
    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_VERSION.as_bytes());
    for (name, value) in fields {
        hasher.update(b"|");
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.to_bits().to_be_bytes());
    }
    hasher.update(b"|read_hubble=");
    hasher.update([u8::from(cosmology.reads_hubble_from_file())]);
    Fingerprint(format!("{:x}", hasher.finalize()))
}
