#![deny(missing_docs)]
#![doc = "Core value types for the kSZ axion forecast workspace: cosmologies, fingerprints and the shared error surface."]

pub mod canonical;
pub mod cosmology;
pub mod errors;
pub mod fingerprint;

pub use cosmology::{
    CosmoParameter, CosmoParams, Cosmology, GenerateParams, HubbleSource, HubbleTable,
};
pub use errors::{ErrorInfo, KszError};
pub use fingerprint::{fingerprint, Fingerprint, FINGERPRINT_VERSION};
pub use canonical::{from_json_slice, stable_hash_string, to_canonical_json_bytes};
