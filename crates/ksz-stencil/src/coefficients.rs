use ksz_core::{ErrorInfo, KszError};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// How stencil multipliers turn into parameter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Perturbation {
    /// `value = fiducial * (1 + multiplier * step)`.
    #[default]
    Multiplicative,
    /// `value = fiducial + multiplier * step`.
    Additive,
}

impl Perturbation {
    /// Parameter value at one stencil multiplier.
    pub fn value(&self, fiducial: f64, multiplier: f64, step: f64) -> f64 {
        match self {
            Perturbation::Multiplicative => fiducial * (1.0 + multiplier * step),
            Perturbation::Additive => fiducial + multiplier * step,
        }
    }

    /// Spacing in parameter units between unit multipliers.
    pub fn scale(&self, fiducial: f64, step: f64) -> f64 {
        match self {
            Perturbation::Multiplicative => step * fiducial,
            Perturbation::Additive => step,
        }
    }
}

/// Finite-difference weights for derivative `order` on unit-spaced `multipliers`.
///
/// Solves `sum_i c_i m_i^k = k! [k == order]` for `k < n`, so any set of
/// distinct offsets works, symmetric or not. The weights line up with the
/// multipliers they were computed for.
pub fn finite_difference_coefficients(
    multipliers: &[f64],
    order: usize,
) -> Result<Vec<f64>, KszError> {
    let n = multipliers.len();
    if n <= order {
        return Err(KszError::Stencil(
            ErrorInfo::new("stencil-too-short", "stencil needs more points than the derivative order")
                .with_context("points", n.to_string())
                .with_context("order", order.to_string()),
        ));
    }
    if multipliers.iter().any(|m| !m.is_finite()) {
        return Err(KszError::Stencil(ErrorInfo::new(
            "stencil-non-finite",
            "stencil multipliers must be finite",
        )));
    }
    let mut sorted = multipliers.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    if sorted.windows(2).any(|pair| pair[0] == pair[1]) {
        return Err(KszError::Stencil(
            ErrorInfo::new("stencil-duplicate", "stencil multipliers must be distinct")
                .with_context("multipliers", format!("{multipliers:?}")),
        ));
    }

    let vandermonde = DMatrix::from_fn(n, n, |k, i| multipliers[i].powi(k as i32));
    let factorial: f64 = (1..=order).map(|k| k as f64).product();
    let rhs = DVector::from_fn(n, |k, _| if k == order { factorial } else { 0.0 });
    let solution = vandermonde.lu().solve(&rhs).ok_or_else(|| {
        KszError::Stencil(
            ErrorInfo::new("stencil-singular", "stencil system is singular")
                .with_context("multipliers", format!("{multipliers:?}")),
        )
    })?;

    let largest = solution.iter().fold(0.0f64, |acc, c| acc.max(c.abs()));
    Ok(solution
        .iter()
        .map(|&c| if c.abs() <= largest * 1e-12 { 0.0 } else { c })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-12, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn five_point_centred() {
        let coeffs = finite_difference_coefficients(&[-2.0, -1.0, 0.0, 1.0, 2.0], 1).unwrap();
        assert_close(&coeffs, &[1.0 / 12.0, -8.0 / 12.0, 0.0, 8.0 / 12.0, -1.0 / 12.0]);
    }

    #[test]
    fn three_point_centred() {
        let coeffs = finite_difference_coefficients(&[-1.0, 0.0, 1.0], 1).unwrap();
        assert_close(&coeffs, &[-0.5, 0.0, 0.5]);
    }

    #[test]
    fn forward_one_sided() {
        let coeffs = finite_difference_coefficients(&[0.0, 1.0, 2.0], 1).unwrap();
        assert_close(&coeffs, &[-1.5, 2.0, -0.5]);
    }

    #[test]
    fn order_follows_multiplier_order() {
        let coeffs = finite_difference_coefficients(&[1.0, -1.0, 0.0], 1).unwrap();
        assert_close(&coeffs, &[0.5, -0.5, 0.0]);
    }

    #[test]
    fn second_derivative() {
        let coeffs = finite_difference_coefficients(&[-1.0, 0.0, 1.0], 2).unwrap();
        assert_close(&coeffs, &[1.0, -2.0, 1.0]);
    }

    #[test]
    fn rejects_degenerate_stencils() {
        assert!(finite_difference_coefficients(&[0.0], 1).is_err());
        assert!(finite_difference_coefficients(&[-1.0, -1.0, 1.0], 1).is_err());
        assert!(finite_difference_coefficients(&[f64::NAN, 1.0], 1).is_err());
    }
}
