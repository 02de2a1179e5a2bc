//! Accuracy metrics on the held-out samples

use ndarray::ArrayView1;
use sdb_core::{Error, Result};
use serde::Serialize;

/// Root mean squared error
pub fn rmse(truth: ArrayView1<'_, f64>, predicted: ArrayView1<'_, f64>) -> f64 {
    let n = truth.len() as f64;
    let sse: f64 = truth
        .iter()
        .zip(predicted.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    (sse / n).sqrt()
}

/// Mean absolute error
pub fn mae(truth: ArrayView1<'_, f64>, predicted: ArrayView1<'_, f64>) -> f64 {
    let n = truth.len() as f64;
    truth
        .iter()
        .zip(predicted.iter())
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / n
}

/// Coefficient of determination, `1 - SS_res / SS_tot`.
///
/// A constant target (SS_tot = 0) scores 1 when predicted exactly and 0
/// otherwise.
pub fn r2(truth: ArrayView1<'_, f64>, predicted: ArrayView1<'_, f64>) -> f64 {
    let mean = truth.mean().unwrap_or(0.0);
    let ss_tot: f64 = truth.iter().map(|t| (t - mean).powi(2)).sum();
    let ss_res: f64 = truth
        .iter()
        .zip(predicted.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Test-set scores of a fitted model
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scores {
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

impl Scores {
    pub fn compute(truth: ArrayView1<'_, f64>, predicted: ArrayView1<'_, f64>) -> Result<Self> {
        if truth.len() != predicted.len() {
            return Err(Error::SchemaMismatch(format!(
                "{} test targets but {} predictions",
                truth.len(),
                predicted.len()
            )));
        }
        if truth.is_empty() {
            return Err(Error::Fit {
                stage: "scoring",
                reason: "empty test set".into(),
            });
        }
        Ok(Self {
            rmse: rmse(truth, predicted),
            mae: mae(truth, predicted),
            r2: r2(truth, predicted),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_known_values() {
        let truth = array![-1.0, -2.0, -3.0, -4.0];
        let pred = array![-1.5, -2.0, -2.5, -4.0];
        let scores = Scores::compute(truth.view(), pred.view()).unwrap();
        assert_relative_eq!(scores.rmse, (0.5_f64 / 4.0).sqrt());
        assert_relative_eq!(scores.mae, 0.25);
        assert_relative_eq!(scores.r2, 1.0 - 0.5 / 5.0);
    }

    #[test]
    fn test_constant_target() {
        let truth = array![-2.0, -2.0];
        assert_relative_eq!(r2(truth.view(), array![-2.0, -2.0].view()), 1.0);
        assert_relative_eq!(r2(truth.view(), array![-1.0, -2.0].view()), 0.0);
    }

    #[test]
    fn test_single_sample() {
        let scores = Scores::compute(array![-3.0].view(), array![-2.0].view()).unwrap();
        assert_relative_eq!(scores.rmse, 1.0);
        assert_relative_eq!(scores.mae, 1.0);
        assert_relative_eq!(scores.r2, 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(Scores::compute(array![1.0].view(), array![1.0, 2.0].view()).is_err());
    }
}
