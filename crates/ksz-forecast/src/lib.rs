//! Forecast sweep over axion masses.
//!
//! [`ForecastDriver`] builds one [`ksz_stencil::StencilDerivative`] per
//! (fiducial, parameter, step) triple, runs the external solver at most once
//! per distinct cosmology through the [`ksz_cache::RunCache`], evaluates the
//! mean pairwise velocity for every stencil point and writes one
//! [`DerivativeTensor`] per mass.

pub mod driver;
pub mod model;
pub mod mpv;
pub mod output;
pub mod plan;
pub mod report;
pub mod scheduler;
pub mod solver;
pub mod survey;

pub use driver::ForecastDriver;
pub use model::{artifact_path, load_hubble_table, EvaluationGrid, ObservableModel, TabulatedPairwiseModel};
pub use mpv::mean_pairwise_velocity;
pub use output::{format_mass, DerivativeLabel, DerivativeTensor, TensorFiles, TensorMetadata};
pub use plan::{load_plan, ForecastPlan, ParameterSpec, SeparationGrid};
pub use report::{DerivativeFailure, ForecastReport, MassReport, MassStatus};
pub use scheduler::{EvaluationPhase, PhaseStats, PrecomputePhase};
pub use solver::{CommandSolver, SolverSpec, TransferSolver};
pub use survey::{overlap_to_f_sky, SurveyPreset, SurveySpec};
