//! maxent-ensemble - default-model ensembles for Maximum-Entropy continuation
//!
//! Runs an external Maximum-Entropy Solver once per candidate default model,
//! reduces the resulting maximum and average spectra to a per-frequency mean
//! and population standard deviation, and writes the aggregate table.

pub mod ensemble;
pub mod help;
pub mod output;
pub mod params;
pub mod pipeline;
pub mod solver;
pub mod validate;
pub mod variance;

use thiserror::Error;

// Re-export main types
pub use ensemble::{Candidate, EnsembleError, EnsembleReport, EnsembleRunner, Execution};
pub use output::{OutputError, ResultWriter, WrittenArtifacts};
pub use params::{ParamError, ParamValue, ParameterSet, RunConfiguration};
pub use pipeline::{run_pipeline, PipelineOptions, PipelineOutcome};
pub use solver::{CommandSolver, Solver, SolverError, SolverOutput};
pub use validate::{validate, ValidatedConfig, ValidationError};
pub use variance::{estimate_variance, SpectrumStatistics, VarianceError};

/// Failure of one pipeline stage. Every variant aborts the run.
#[derive(Debug, Error)]
pub enum MaxEntError {
    #[error(transparent)]
    Params(#[from] ParamError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Ensemble(#[from] EnsembleError),
    #[error(transparent)]
    Output(#[from] OutputError),
}
