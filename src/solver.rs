//! The Solver seam: one Maximum-Entropy run per [`RunConfiguration`].
//!
//! The orchestrator never looks inside a Solver. It only needs the two
//! spectra and the frequency grid they live on, returned explicitly from
//! every call.

use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::{debug, warn};

use crate::params::{keys, ParamValue, RunConfiguration};

/// Absolute tolerance, scaled by magnitude, for comparing grid points.
pub const GRID_TOLERANCE: f64 = 1e-12;

/// Lines of solver stderr kept in an error message.
const STDERR_TAIL_LINES: usize = 8;

/// Spectrum tables written by the solver and read back after each run.
const SPECTRUM_KINDS: [&str; 2] = ["maxspec", "avspec"];

/// Input paths resolved against the invoking directory before launch.
const INPUT_PATH_KEYS: [&str; 2] = [keys::DATA, keys::X_0];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SolverOutput {
    pub omega_grid: Vec<f64>,
    pub max_spectrum: Vec<f64>,
    pub av_spectrum: Vec<f64>,
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("run configuration has no BASENAME")]
    MissingBasename,
    #[error("failed to write parameter file {path}: {source}")]
    ParameterFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to resolve the invoking directory: {0}")]
    InvokingDir(#[source] std::io::Error),
    #[error("failed to clear stale spectrum {path}: {source}")]
    StaleSpectrum {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to launch solver {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("solver {program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("failed to read spectrum {path}: {source}")]
    ReadSpectrum {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: {reason}")]
    MalformedSpectrum {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("maxspec and avspec grids differ for {basename}")]
    InconsistentGrids { basename: String },
    #[error("solver failed: {0}")]
    Failed(String),
}

pub trait Solver: Sync {
    fn solve(&self, config: &RunConfiguration) -> Result<SolverOutput, SolverError>;
}

impl<S: Solver + ?Sized> Solver for &S {
    fn solve(&self, config: &RunConfiguration) -> Result<SolverOutput, SolverError> {
        (**self).solve(config)
    }
}

/// Point-wise grid equality within [`GRID_TOLERANCE`].
pub fn grids_match(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            let scale = x.abs().max(y.abs()).max(1.0);
            (x - y).abs() <= GRID_TOLERANCE * scale
        })
}

/// Drives an external maxent executable.
///
/// Each run writes `<BASENAME>.param` into the work directory, invokes
/// `<program> [args..] <BASENAME>.param` from there and reads back
/// `<BASENAME>.maxspec.dat` and `<BASENAME>.avspec.dat`. The parameter file
/// always carries `TEXT_OUTPUT = true`, and relative `DATA`/`X_0` paths are
/// made absolute against the directory the orchestrator was started from.
#[derive(Debug, Clone)]
pub struct CommandSolver {
    program: PathBuf,
    args: Vec<String>,
    work_dir: PathBuf,
}

impl CommandSolver {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            work_dir: PathBuf::from("."),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn spectrum_path(&self, basename: &str, kind: &str) -> PathBuf {
        self.work_dir.join(format!("{basename}.{kind}.dat"))
    }

    fn write_parameter_file(
        &self,
        basename: &str,
        config: &RunConfiguration,
    ) -> Result<PathBuf, SolverError> {
        let relative = PathBuf::from(format!("{basename}.param"));
        let path = self.work_dir.join(&relative);
        let io_err = |source| SolverError::ParameterFile {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&path, config.to_parameter_file()).map_err(io_err)?;
        debug!(path = %path.display(), "wrote solver parameter file");
        Ok(relative)
    }

    fn run_configuration(
        &self,
        config: &RunConfiguration,
    ) -> Result<RunConfiguration, SolverError> {
        let mut resolved = config.with(keys::TEXT_OUTPUT, true);
        let invoking_dir = env::current_dir().map_err(SolverError::InvokingDir)?;
        for key in INPUT_PATH_KEYS {
            let Some(raw) = config.get(key).and_then(ParamValue::as_str) else {
                continue;
            };
            let raw = raw.trim();
            if raw.is_empty() || Path::new(raw).is_absolute() {
                continue;
            }
            let absolute = invoking_dir.join(raw);
            resolved = resolved.with(key, absolute.display().to_string());
        }
        Ok(resolved)
    }

    fn clear_spectra(&self, basename: &str) -> Result<(), SolverError> {
        for kind in SPECTRUM_KINDS {
            let path = self.spectrum_path(basename, kind);
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed stale spectrum"),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(source) => return Err(SolverError::StaleSpectrum { path, source }),
            }
        }
        Ok(())
    }
}

impl Solver for CommandSolver {
    fn solve(&self, config: &RunConfiguration) -> Result<SolverOutput, SolverError> {
        let basename = config.basename().ok_or(SolverError::MissingBasename)?;
        let run_config = self.run_configuration(config)?;
        let param_file = self.write_parameter_file(basename, &run_config)?;
        self.clear_spectra(basename)?;
        let program = self.program.display().to_string();

        debug!(%program, model = ?config.default_model(), %basename, "launching solver");
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&param_file)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| SolverError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            warn!(%program, status = %output.status, "solver run failed");
            return Err(SolverError::Exit {
                program,
                status: output.status.to_string(),
                stderr: tail,
            });
        }

        let (omega_grid, max_spectrum) =
            read_spectrum_table(&self.spectrum_path(basename, "maxspec"))?;
        let (av_grid, av_spectrum) =
            read_spectrum_table(&self.spectrum_path(basename, "avspec"))?;
        if !grids_match(&omega_grid, &av_grid) {
            return Err(SolverError::InconsistentGrids {
                basename: basename.to_string(),
            });
        }

        Ok(SolverOutput {
            omega_grid,
            max_spectrum,
            av_spectrum,
        })
    }
}

/// Reads a whitespace table whose first two columns are omega and the
/// spectral value. Blank lines and `#` comments are skipped; extra columns
/// are ignored.
pub fn read_spectrum_table(path: &Path) -> Result<(Vec<f64>, Vec<f64>), SolverError> {
    let raw = fs::read_to_string(path).map_err(|source| SolverError::ReadSpectrum {
        path: path.to_path_buf(),
        source,
    })?;

    let mut omega = Vec::new();
    let mut values = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let malformed = |reason: String| SolverError::MalformedSpectrum {
            path: path.to_path_buf(),
            line: idx + 1,
            reason,
        };

        let mut cols = line.split_whitespace();
        let (Some(w), Some(a)) = (cols.next(), cols.next()) else {
            return Err(malformed("expected at least two columns".to_string()));
        };
        let w: f64 = w
            .parse()
            .map_err(|_| malformed(format!("invalid frequency '{w}'")))?;
        let a: f64 = a
            .parse()
            .map_err(|_| malformed(format!("invalid spectral value '{a}'")))?;
        omega.push(w);
        values.push(a);
    }

    Ok((omega, values))
}
