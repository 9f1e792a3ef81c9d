//! Validation, then either one Solver run or an ensemble with statistics.
//!
//! The path is chosen once: `MODEL_RUNS` present selects the ensemble path.
//! Any stage error aborts the whole pipeline; nothing is retried.

use std::path::PathBuf;

use tracing::info;

use crate::ensemble::{EnsembleReport, EnsembleRunner, Execution};
use crate::help::requested_help;
use crate::output::{ResultWriter, WrittenArtifacts};
use crate::params::ParameterSet;
use crate::solver::{Solver, SolverOutput};
use crate::validate::{validate, ValidatedConfig};
use crate::MaxEntError;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub execution: Execution,
    /// Directory receiving `<basename>.varspec.dat`.
    pub output_dir: PathBuf,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            execution: Execution::Sequential,
            output_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug)]
pub enum PipelineOutcome {
    /// A help switch was set; nothing was validated or run.
    Help(String),
    SingleRun {
        config: ValidatedConfig,
        output: SolverOutput,
    },
    Ensemble {
        config: ValidatedConfig,
        report: EnsembleReport,
        artifacts: Option<WrittenArtifacts>,
    },
}

pub fn run_pipeline<S: Solver>(
    params: &ParameterSet,
    solver: S,
    options: &PipelineOptions,
) -> Result<PipelineOutcome, MaxEntError> {
    if let Some(text) = requested_help(params) {
        return Ok(PipelineOutcome::Help(text));
    }

    let config = validate(params)?;
    info!(basename = %config.basename, beta = config.beta, ndat = config.ndat, "configuration ready");

    let Some(candidates) = config.candidates.clone() else {
        info!("single run");
        let output = solver.solve(&config.base)?;
        return Ok(PipelineOutcome::SingleRun { config, output });
    };

    let runner = EnsembleRunner::new(solver).with_execution(options.execution);
    let report = runner.run(&config.base, &candidates)?;

    let writer = ResultWriter::new(config.text_output, &options.output_dir);
    let artifacts = writer.write(&config, &report)?;

    Ok(PipelineOutcome::Ensemble {
        config,
        report,
        artifacts,
    })
}
