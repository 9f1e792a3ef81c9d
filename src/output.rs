use std::fs;
use std::path::{Path, PathBuf};

use csv::{QuoteStyle, WriterBuilder};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::ensemble::EnsembleReport;
use crate::validate::ValidatedConfig;
use crate::variance::SpectrumStatistics;

pub const OUTPUT_SCHEMA_VERSION: &str = "1.0.0";

pub const VARSPEC_HEADER: [&str; 5] = [
    "#omega",
    "mean_maxspec",
    "stdev_maxspec",
    "mean_avspec",
    "stdev_avspec",
];

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{context} length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct EnsembleManifest {
    pub schema_version: String,
    pub basename: String,
    pub beta: f64,
    pub ndat: usize,
    pub models: Vec<String>,
    pub run_basenames: Vec<String>,
    pub grid_points: usize,
    pub varspec: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WrittenArtifacts {
    pub varspec: PathBuf,
    pub manifest: PathBuf,
}

/// Persists ensemble statistics. Disabled writers perform no I/O.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    enabled: bool,
    output_dir: PathBuf,
}

impl ResultWriter {
    pub fn new(enabled: bool, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            enabled,
            output_dir: output_dir.into(),
        }
    }

    pub fn varspec_path(&self, basename: &str) -> PathBuf {
        self.output_dir.join(format!("{basename}.varspec.dat"))
    }

    pub fn manifest_path(&self, basename: &str) -> PathBuf {
        self.output_dir.join(format!("{basename}.ensemble.json"))
    }

    pub fn write(
        &self,
        config: &ValidatedConfig,
        report: &EnsembleReport,
    ) -> Result<Option<WrittenArtifacts>, OutputError> {
        if !self.enabled {
            return Ok(None);
        }

        let varspec = self.varspec_path(&config.basename);
        if let Some(parent) = varspec.parent() {
            fs::create_dir_all(parent)?;
        }
        write_varspec(&varspec, &report.omega_grid, &report.max_stats, &report.av_stats)?;

        let manifest = EnsembleManifest {
            schema_version: OUTPUT_SCHEMA_VERSION.to_string(),
            basename: config.basename.clone(),
            beta: config.beta,
            ndat: config.ndat,
            models: report.candidates.iter().map(|c| c.model.clone()).collect(),
            run_basenames: report.run_basenames.clone(),
            grid_points: report.omega_grid.len(),
            varspec: varspec.display().to_string(),
        };
        let manifest_path =
            write_manifest_json(&self.manifest_path(&config.basename), &manifest)?;

        info!(path = %varspec.display(), rows = report.omega_grid.len(), "wrote ensemble spectrum");
        Ok(Some(WrittenArtifacts {
            varspec,
            manifest: manifest_path,
        }))
    }
}

fn ensure_len(context: &'static str, expected: usize, actual: usize) -> Result<(), OutputError> {
    if expected == actual {
        return Ok(());
    }

    Err(OutputError::LengthMismatch {
        context,
        expected,
        got: actual,
    })
}

fn fmt_f64(value: f64) -> String {
    format!("{value:.10e}")
}

/// Writes the space-delimited varspec table, one row per grid point in grid order.
pub fn write_varspec(
    path: &Path,
    omega_grid: &[f64],
    max_stats: &SpectrumStatistics,
    av_stats: &SpectrumStatistics,
) -> Result<(), OutputError> {
    let n = omega_grid.len();
    ensure_len("mean_maxspec", n, max_stats.mean.len())?;
    ensure_len("stdev_maxspec", n, max_stats.stdev.len())?;
    ensure_len("mean_avspec", n, av_stats.mean.len())?;
    ensure_len("stdev_avspec", n, av_stats.stdev.len())?;

    let mut writer = WriterBuilder::new()
        .delimiter(b' ')
        .quote_style(QuoteStyle::Never)
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(VARSPEC_HEADER)?;

    for idx in 0..n {
        writer.write_record([
            fmt_f64(omega_grid[idx]),
            fmt_f64(max_stats.mean[idx]),
            fmt_f64(max_stats.stdev[idx]),
            fmt_f64(av_stats.mean[idx]),
            fmt_f64(av_stats.stdev[idx]),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_manifest_json(
    path: &Path,
    manifest: &EnsembleManifest,
) -> Result<PathBuf, OutputError> {
    let payload = serde_json::to_string_pretty(manifest)?;
    fs::write(path, payload)?;
    Ok(path.to_path_buf())
}
