//! Readiness checks run before any Solver invocation.
//!
//! Every problem is collected into one [`ValidationError`] so the user can fix
//! them all at once. On success the result is a [`ValidatedConfig`] whose base
//! configuration has every orchestrator-owned key bound, `BASENAME` included.

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::ensemble::Candidate;
use crate::params::{keys, ParamValue, ParameterSet, RunConfiguration};

/// Appended to the stripped data path when no `BASENAME` is supplied.
pub const BASENAME_SUFFIX: &str = ".out";

/// Stem used when neither `DATA` nor a parameter file path is available.
pub const FALLBACK_STEM: &str = "maxent";

/// `RUN_i` problems reported before the remaining entries are skipped.
const MAX_RUN_MESSAGES: usize = 16;

#[derive(Debug, Clone, Error)]
#[error("critical parameters not defined: {}", .messages.join("; "))]
pub struct ValidationError {
    pub messages: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub base: RunConfiguration,
    pub basename: String,
    pub beta: f64,
    pub ndat: usize,
    pub text_output: bool,
    /// `Some` selects the ensemble path, even for a single candidate.
    pub candidates: Option<Vec<Candidate>>,
}

impl ValidatedConfig {
    pub fn is_ensemble(&self) -> bool {
        self.candidates.is_some()
    }
}

pub fn validate(params: &ParameterSet) -> Result<ValidatedConfig, ValidationError> {
    let mut messages = Vec::new();

    let beta = match params.get(keys::BETA) {
        None => {
            messages.push("Please supply BETA".to_string());
            None
        }
        Some(value) => match value.as_f64() {
            Some(b) if b.is_finite() && b > 0.0 => Some(b),
            _ => {
                messages.push(format!("BETA must be a positive number, got {value}"));
                None
            }
        },
    };

    let ndat = match params.get(keys::NDAT) {
        None => {
            messages.push("Please supply NDAT".to_string());
            None
        }
        Some(value) => match value.as_i64() {
            Some(n) if n > 0 => Some(n as usize),
            _ => {
                messages.push(format!("NDAT must be a positive integer, got {value}"));
                None
            }
        },
    };

    let data = params
        .string(keys::DATA)
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    if data.is_none() && !params.contains(keys::X_0) && !params.flag(keys::DATA_IN_HDF5) {
        messages.push("Please supply input data".to_string());
    }

    let candidates = collect_candidates(params, &mut messages);

    let (Some(beta), Some(ndat), true) = (beta, ndat, messages.is_empty()) else {
        return Err(ValidationError { messages });
    };

    let basename = match params.string(keys::BASENAME).filter(|b| !b.trim().is_empty()) {
        Some(explicit) => explicit,
        None => {
            let origin = match (&data, params.origin()) {
                (Some(d), _) => d.clone(),
                (None, Some(path)) => path.display().to_string(),
                (None, None) => FALLBACK_STEM.to_string(),
            };
            let derived = derive_basename(&origin);
            debug!(%origin, basename = %derived, "derived output basename");
            derived
        }
    };

    let base = RunConfiguration::from_values(params.values().clone())
        .with(keys::BASENAME, basename.as_str());

    Ok(ValidatedConfig {
        base,
        basename,
        beta,
        ndat,
        text_output: params.flag(keys::TEXT_OUTPUT),
        candidates,
    })
}

fn collect_candidates(
    params: &ParameterSet,
    messages: &mut Vec<String>,
) -> Option<Vec<Candidate>> {
    let value = params.get(keys::MODEL_RUNS)?;
    let runs = match value.as_i64() {
        Some(n) if n > 0 => n as usize,
        _ => {
            messages.push(format!("MODEL_RUNS must be a positive integer, got {value}"));
            return Some(Vec::new());
        }
    };

    let mut candidates = Vec::new();
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    let mut problems = 0;
    for index in 0..runs {
        if problems == MAX_RUN_MESSAGES {
            messages.push(format!(
                "RUN_{index} through RUN_{} not checked (MODEL_RUNS = {runs})",
                runs - 1
            ));
            break;
        }
        let key = keys::run(index);
        let problem = match params.get(&key) {
            Some(ParamValue::Str(model)) if !model.trim().is_empty() => {
                let model = model.trim();
                match seen.get(model) {
                    Some(first) => Some(format!(
                        "{key} repeats default model {model} (already RUN_{first})"
                    )),
                    None => {
                        seen.insert(model.to_string(), index);
                        candidates.push(Candidate::new(index, model));
                        None
                    }
                }
            }
            Some(other) => Some(format!("{key} must name a default model, got {other}")),
            None => Some(format!("Please supply {key} (MODEL_RUNS = {runs})")),
        };
        if let Some(message) = problem {
            messages.push(message);
            problems += 1;
        }
    }
    Some(candidates)
}

/// Strips every extension from the file name of `source`, keeps its
/// directory, and appends [`BASENAME_SUFFIX`].
pub fn derive_basename(source: &str) -> String {
    let path = Path::new(source);
    let mut stem = match path.file_name() {
        Some(name) => Path::new(name).to_path_buf(),
        None => return format!("{FALLBACK_STEM}{BASENAME_SUFFIX}"),
    };
    while stem.extension().is_some() {
        match stem.file_stem() {
            Some(s) => stem = Path::new(s).to_path_buf(),
            None => break,
        }
    }

    let stripped = match path.parent() {
        Some(parent) => parent.join(stem),
        None => stem,
    };
    format!("{}{BASENAME_SUFFIX}", stripped.display())
}
