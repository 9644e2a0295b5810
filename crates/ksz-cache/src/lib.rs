//! Content-addressed cache of external solver runs.
//!
//! Every distinct cosmology fingerprint owns exactly one [`RunRecord`]; the
//! table is persisted as a flat CSV snapshot whose first column is the row id.

mod cache;
mod record;

pub use cache::{CacheConfig, RunCache};
pub use record::{Admission, CacheSummary, RunId, RunRecord, RunState, RECORD_COLUMNS};
