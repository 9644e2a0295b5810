//! Mean pairwise velocity from tabulated correlation functions.

/// Streaming velocity `v(r) = r * 100 * dbarxi/dlna / (3 (1 + xi))` in `h km/s`.
///
/// `r` is in `Mpc/h`; the factor 100 converts `H0 / h` to km/s/Mpc.
pub fn mean_pairwise_velocity(r: f64, xi: f64, dbarxi_dloga: f64) -> f64 {
    r * 100.0 * dbarxi_dloga / (3.0 * (1.0 + xi))
}
