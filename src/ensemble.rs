//! One Solver run per candidate default model, collected in candidate order.

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::params::{keys, RunConfiguration};
use crate::solver::{grids_match, Solver, SolverError, SolverOutput};
use crate::variance::{estimate_variance, SpectrumStatistics, VarianceError};

/// A named default model and its position in the ensemble. Index 0 supplies
/// the reference frequency grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub index: usize,
    pub model: String,
}

impl Candidate {
    pub fn new(index: usize, model: impl Into<String>) -> Self {
        Self {
            index,
            model: model.into(),
        }
    }

    /// Builds a candidate list from model names in order.
    pub fn from_models<I, M>(models: I) -> Vec<Self>
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        models
            .into_iter()
            .enumerate()
            .map(|(index, model)| Self::new(index, model))
            .collect()
    }

    pub fn run_basename(&self, base: &str) -> String {
        format!("{base}.{}", self.model)
    }

    /// Derives this candidate's configuration; `base` is not modified.
    pub fn configure(&self, base: &RunConfiguration, basename: &str) -> RunConfiguration {
        base.with(keys::DEFAULT_MODEL, self.model.as_str())
            .with(keys::BASENAME, self.run_basename(basename))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Execution {
    #[default]
    Sequential,
    Parallel { jobs: usize },
}

impl Execution {
    pub fn from_jobs(jobs: usize) -> Self {
        if jobs <= 1 {
            Self::Sequential
        } else {
            Self::Parallel { jobs }
        }
    }
}

#[derive(Debug, Error)]
pub enum EnsembleError {
    #[error("ensemble needs at least one candidate")]
    Empty,
    #[error("base configuration has no BASENAME")]
    MissingBasename,
    #[error("run {index} (default model {model}) failed: {source}")]
    Solver {
        index: usize,
        model: String,
        #[source]
        source: SolverError,
    },
    #[error("{context} of run {index} has {got} points, expected {expected}")]
    LengthMismatch {
        context: &'static str,
        index: usize,
        expected: usize,
        got: usize,
    },
    #[error("frequency grid of run {index} (default model {model}) differs from run 0")]
    GridMismatch { index: usize, model: String },
    #[error("variance estimate failed: {0}")]
    Variance(#[from] VarianceError),
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone)]
pub struct EnsembleReport {
    pub candidates: Vec<Candidate>,
    pub run_basenames: Vec<String>,
    pub omega_grid: Vec<f64>,
    pub max_spectra: Vec<Vec<f64>>,
    pub av_spectra: Vec<Vec<f64>>,
    pub max_stats: SpectrumStatistics,
    pub av_stats: SpectrumStatistics,
}

impl EnsembleReport {
    pub fn size(&self) -> usize {
        self.candidates.len()
    }
}

pub struct EnsembleRunner<S> {
    solver: S,
    execution: Execution,
}

impl<S: Solver> EnsembleRunner<S> {
    pub fn new(solver: S) -> Self {
        Self {
            solver,
            execution: Execution::Sequential,
        }
    }

    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    pub fn run(
        &self,
        base: &RunConfiguration,
        candidates: &[Candidate],
    ) -> Result<EnsembleReport, EnsembleError> {
        if candidates.is_empty() {
            return Err(EnsembleError::Empty);
        }
        let basename = base.basename().ok_or(EnsembleError::MissingBasename)?;

        let configs: Vec<RunConfiguration> = candidates
            .iter()
            .map(|c| c.configure(base, basename))
            .collect();

        info!(runs = candidates.len(), "performing ensemble runs");
        let outputs = match self.execution {
            Execution::Sequential => candidates
                .iter()
                .zip(&configs)
                .map(|(candidate, config)| self.run_one(candidate, config))
                .collect::<Result<Vec<_>, _>>()?,
            Execution::Parallel { jobs } => {
                let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;
                // Every run finishes; the lowest failing index is reported.
                let results: Vec<Result<SolverOutput, EnsembleError>> = pool.install(|| {
                    candidates
                        .par_iter()
                        .zip(configs.par_iter())
                        .map(|(candidate, config)| self.run_one(candidate, config))
                        .collect()
                });
                results.into_iter().collect::<Result<Vec<_>, _>>()?
            }
        };

        let omega_grid = outputs[0].omega_grid.clone();
        check_members(candidates, &outputs, &omega_grid)?;

        let mut max_spectra = Vec::with_capacity(outputs.len());
        let mut av_spectra = Vec::with_capacity(outputs.len());
        for output in outputs {
            max_spectra.push(output.max_spectrum);
            av_spectra.push(output.av_spectrum);
        }

        let max_stats = estimate_variance(&max_spectra)?;
        let av_stats = estimate_variance(&av_spectra)?;

        Ok(EnsembleReport {
            candidates: candidates.to_vec(),
            run_basenames: configs
                .iter()
                .filter_map(|c| c.basename().map(str::to_string))
                .collect(),
            omega_grid,
            max_spectra,
            av_spectra,
            max_stats,
            av_stats,
        })
    }

    fn run_one(
        &self,
        candidate: &Candidate,
        config: &RunConfiguration,
    ) -> Result<SolverOutput, EnsembleError> {
        info!(index = candidate.index, model = %candidate.model, "starting run");
        debug!(basename = ?config.basename(), "run configuration");
        self.solver.solve(config).map_err(|source| {
            error!(index = candidate.index, model = %candidate.model, %source, "run failed");
            EnsembleError::Solver {
                index: candidate.index,
                model: candidate.model.clone(),
                source,
            }
        })
    }
}

fn check_members(
    candidates: &[Candidate],
    outputs: &[SolverOutput],
    omega_grid: &[f64],
) -> Result<(), EnsembleError> {
    let expected = omega_grid.len();
    for (candidate, output) in candidates.iter().zip(outputs) {
        if !grids_match(&output.omega_grid, omega_grid) {
            return Err(EnsembleError::GridMismatch {
                index: candidate.index,
                model: candidate.model.clone(),
            });
        }
        for (context, got) in [
            ("maxspec", output.max_spectrum.len()),
            ("avspec", output.av_spectrum.len()),
        ] {
            if got != expected {
                return Err(EnsembleError::LengthMismatch {
                    context,
                    index: candidate.index,
                    expected,
                    got,
                });
            }
        }
    }
    Ok(())
}
