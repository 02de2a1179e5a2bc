//! Regression backends
//!
//! Every backend implements [`Regressor`]: it is configured from a parameter
//! struct, fitted once on `(n_samples, n_features)` training data and then
//! used for any number of batch predictions. [`Method`] selects a backend
//! and its hyperparameters.

mod forest;
mod linear;
mod smo;
mod svr;
mod tree;

pub use forest::{ForestParams, RandomForest, SplitCriterion};
pub use linear::{LinearParams, LinearRegression};
pub use svr::{Kernel, SupportVectorRegression, SvrParams};

use ndarray::{Array1, ArrayView1, ArrayView2};
use sdb_core::{Error, Result};
use sdb_parallel::ProcessingMode;
use serde::Serialize;
use std::fmt;

/// A supervised regression model.
pub trait Regressor: Send + Sync {
    /// Display name of the technique
    fn name(&self) -> &'static str;

    /// Fit on `x` (one row per sample) and targets `y`.
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()>;

    /// Predict one value per row of `x`. Fails before [`fit`](Self::fit).
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>>;

    /// Hyperparameters as `(name, value)` pairs, in display order
    fn parameters(&self) -> Vec<(&'static str, String)>;

    fn is_fitted(&self) -> bool;
}

/// Worker count for backends that parallelize; `None` uses every core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Parallelism(pub Option<usize>);

impl Parallelism {
    pub fn all() -> Self {
        Self(None)
    }

    pub fn jobs(n: usize) -> Self {
        Self(Some(n))
    }

    pub fn mode(&self) -> Result<ProcessingMode> {
        ProcessingMode::from_jobs(self.0)
    }
}

impl fmt::Display for Parallelism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            None => f.write_str("all"),
            Some(n) => write!(f, "{}", n),
        }
    }
}

/// Regression technique with its hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Method {
    Linear(LinearParams),
    Forest(ForestParams),
    Svr(SvrParams),
}

impl Method {
    pub fn display_name(&self) -> &'static str {
        match self {
            Method::Linear(_) => linear::NAME,
            Method::Forest(_) => forest::NAME,
            Method::Svr(_) => svr::NAME,
        }
    }

    /// Validate the hyperparameters and build an unfitted backend
    pub fn build(&self) -> Result<Box<dyn Regressor>> {
        Ok(match self {
            Method::Linear(p) => Box::new(LinearRegression::new(p.clone())),
            Method::Forest(p) => Box::new(RandomForest::new(p.clone())?),
            Method::Svr(p) => Box::new(SupportVectorRegression::new(p.clone())?),
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

pub(crate) fn not_fitted(name: &str) -> Error {
    Error::Fit {
        stage: "predict",
        reason: format!("{} model has not been fitted", name),
    }
}

/// Reject empty, misshapen or non-finite training data
pub(crate) fn check_training(x: &ArrayView2<'_, f64>, y: &ArrayView1<'_, f64>) -> Result<()> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(Error::Fit {
            stage: "fit",
            reason: format!("empty training set ({} x {})", x.nrows(), x.ncols()),
        });
    }
    if x.nrows() != y.len() {
        return Err(Error::SchemaMismatch(format!(
            "{} training rows but {} targets",
            x.nrows(),
            y.len()
        )));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(Error::Fit {
            stage: "fit",
            reason: "training data contains non-finite values".into(),
        });
    }
    Ok(())
}

/// Reject prediction input whose width differs from the training data
pub(crate) fn check_width(x: &ArrayView2<'_, f64>, expected: usize) -> Result<()> {
    if x.ncols() != expected {
        return Err(Error::SchemaMismatch(format!(
            "model was fitted on {} features, got {}",
            expected,
            x.ncols()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_method_names_and_defaults() {
        let linear = Method::Linear(LinearParams::default());
        let forest = Method::Forest(ForestParams::default());
        let svr = Method::Svr(SvrParams::default());
        assert_eq!(linear.to_string(), "Multiple Linear Regression");
        assert_eq!(forest.to_string(), "Random Forest");
        assert_eq!(svr.to_string(), "Support Vector Machines");

        for method in [linear, forest, svr] {
            let model = method.build().unwrap();
            assert_eq!(model.name(), method.display_name());
            assert!(!model.is_fitted());
        }
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let x = array![[0.1, 0.2]];
        for method in [
            Method::Linear(LinearParams::default()),
            Method::Forest(ForestParams::default()),
            Method::Svr(SvrParams::default()),
        ] {
            let model = method.build().unwrap();
            assert!(matches!(model.predict(x.view()), Err(Error::Fit { .. })));
        }
    }

    #[test]
    fn test_non_finite_training_rejected() {
        let mut model = Method::Linear(LinearParams::default()).build().unwrap();
        let x = array![[1.0], [f64::NAN]];
        let y = array![-1.0, -2.0];
        assert!(matches!(model.fit(x.view(), y.view()), Err(Error::Fit { .. })));
    }

    #[test]
    fn test_parallelism_modes() {
        assert_eq!(Parallelism::all().mode().unwrap(), ProcessingMode::Parallel);
        assert_eq!(Parallelism::jobs(1).mode().unwrap(), ProcessingMode::Sequential);
        assert_eq!(Parallelism::all().to_string(), "all");
    }
}
