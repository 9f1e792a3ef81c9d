//! Per-frequency mean and spread across an ensemble of spectra.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VarianceError {
    #[error("ensemble is empty")]
    Empty,
    #[error("ensemble member {member} has {got} points, expected {expected}")]
    LengthMismatch {
        member: usize,
        expected: usize,
        got: usize,
    },
}

/// Mean and population standard deviation, indexed like the frequency grid.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpectrumStatistics {
    pub mean: Vec<f64>,
    pub stdev: Vec<f64>,
}

impl SpectrumStatistics {
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }
}

/// Reduces an ensemble of equal-length sequences point by point.
///
/// The standard deviation divides by the ensemble size, not size - 1.
/// Each column is summed in sorted order so the result is bit-for-bit
/// independent of member order.
pub fn estimate_variance<S: AsRef<[f64]>>(
    ensemble: &[S],
) -> Result<SpectrumStatistics, VarianceError> {
    let first = ensemble.first().ok_or(VarianceError::Empty)?;
    let n_points = first.as_ref().len();

    for (member, seq) in ensemble.iter().enumerate() {
        let got = seq.as_ref().len();
        if got != n_points {
            return Err(VarianceError::LengthMismatch {
                member,
                expected: n_points,
                got,
            });
        }
    }

    let size = ensemble.len() as f64;
    let mut mean = Vec::with_capacity(n_points);
    let mut stdev = Vec::with_capacity(n_points);
    let mut column = Vec::with_capacity(ensemble.len());

    for i in 0..n_points {
        column.clear();
        column.extend(ensemble.iter().map(|seq| seq.as_ref()[i]));
        column.sort_by(|a, b| a.total_cmp(b));

        let m = column.iter().sum::<f64>() / size;
        let sum_sq: f64 = column.iter().map(|x| (x - m) * (x - m)).sum();
        mean.push(m);
        stdev.push((sum_sq / size).sqrt());
    }

    Ok(SpectrumStatistics { mean, stdev })
}
