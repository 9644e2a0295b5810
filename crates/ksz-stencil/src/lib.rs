//! Finite-difference parameter derivatives.
//!
//! A [`StencilDerivative`] owns the perturbed cosmologies around one fiducial
//! value and walks `Built -> PrecomputeScheduled -> EvaluationScheduled ->
//! Resolved` as the driver runs the two job phases. It only holds run ids and
//! job ids; the cache and the queues stay with the driver.

mod coefficients;
mod derivative;
mod hooks;

pub use coefficients::{finite_difference_coefficients, Perturbation};
pub use derivative::{EvalOutput, StencilDerivative, StencilPoint, StencilState};
pub use hooks::{EvalTicket, EvaluationHook, PrecomputeHook};
