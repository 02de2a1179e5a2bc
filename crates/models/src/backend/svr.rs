//! Epsilon-support vector regression

use super::smo::{self, KernelCache};
use super::{check_training, check_width, not_fitted, Regressor};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use sdb_core::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

pub(crate) const NAME: &str = "Support Vector Machines";

/// Kernel function of the support vector machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Kernel {
    /// `<a, b>`
    Linear,
    /// `(gamma <a, b> + coef0)^degree`
    Poly,
    /// `exp(-gamma |a - b|²)`
    #[default]
    Rbf,
    /// `tanh(gamma <a, b> + coef0)`
    Sigmoid,
    /// Inputs already are kernel values: `(n, n)` for training and `(m, n)`
    /// against the training samples for prediction
    Precomputed,
}

impl Kernel {
    pub const ALL: [Kernel; 5] = [
        Kernel::Linear,
        Kernel::Poly,
        Kernel::Rbf,
        Kernel::Sigmoid,
        Kernel::Precomputed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Kernel::Linear => "linear",
            Kernel::Poly => "poly",
            Kernel::Rbf => "rbf",
            Kernel::Sigmoid => "sigmoid",
            Kernel::Precomputed => "precomputed",
        }
    }
}

impl FromStr for Kernel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Kernel::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                Error::invalid_parameter(
                    "kernel",
                    s,
                    "expected linear, poly, rbf, sigmoid or precomputed",
                )
            })
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hyperparameters of [`SupportVectorRegression`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SvrParams {
    pub kernel: Kernel,
    pub gamma: f64,
    /// Regularization strength; larger values penalize tube violations more
    pub c: f64,
    /// Half-width of the insensitive tube
    pub epsilon: f64,
    pub degree: u32,
    pub coef0: f64,
    /// Stopping tolerance on the KKT gap
    pub tolerance: f64,
    /// Memory budget for cached kernel rows, in megabytes
    pub cache_size_mb: usize,
}

impl Default for SvrParams {
    fn default() -> Self {
        Self {
            kernel: Kernel::Rbf,
            gamma: 0.1,
            c: 1000.0,
            epsilon: 0.1,
            degree: 3,
            coef0: 0.0,
            tolerance: 1e-3,
            cache_size_mb: 8000,
        }
    }
}

impl SvrParams {
    fn validate(&self) -> Result<()> {
        if !(self.gamma.is_finite() && self.gamma >= 0.0) {
            return Err(Error::invalid_parameter("Gamma", self.gamma, "must be >= 0"));
        }
        if !(self.c.is_finite() && self.c > 0.0) {
            return Err(Error::invalid_parameter("C", self.c, "must be > 0"));
        }
        if !(self.epsilon.is_finite() && self.epsilon >= 0.0) {
            return Err(Error::invalid_parameter("Epsilon", self.epsilon, "must be >= 0"));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(Error::invalid_parameter("tolerance", self.tolerance, "must be > 0"));
        }
        if !self.coef0.is_finite() {
            return Err(Error::invalid_parameter("Coef0", self.coef0, "must be finite"));
        }
        Ok(())
    }

    fn evaluate(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        match self.kernel {
            Kernel::Linear => a.dot(&b),
            Kernel::Poly => (self.gamma * a.dot(&b) + self.coef0).powi(self.degree as i32),
            Kernel::Rbf => {
                let sq: f64 = a.iter().zip(b.iter()).map(|(p, q)| (p - q).powi(2)).sum();
                (-self.gamma * sq).exp()
            }
            Kernel::Sigmoid => (self.gamma * a.dot(&b) + self.coef0).tanh(),
            // Values are looked up, never evaluated
            Kernel::Precomputed => f64::NAN,
        }
    }
}

#[derive(Debug, Clone)]
struct Fitted {
    /// Support vectors, or their training indices for a precomputed kernel
    support: Array2<f64>,
    support_index: Vec<usize>,
    coef: Vec<f64>,
    rho: f64,
    n_features: usize,
}

/// Epsilon-SVR trained by SMO.
#[derive(Debug, Clone)]
pub struct SupportVectorRegression {
    params: SvrParams,
    fitted: Option<Fitted>,
}

impl SupportVectorRegression {
    pub fn new(params: SvrParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            fitted: None,
        })
    }

    /// Number of support vectors of the fitted model
    pub fn n_support(&self) -> usize {
        self.fitted.as_ref().map_or(0, |f| f.coef.len())
    }
}

impl Regressor for SupportVectorRegression {
    fn name(&self) -> &'static str {
        NAME
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        check_training(&x, &y)?;
        let l = x.nrows();
        let precomputed = self.params.kernel == Kernel::Precomputed;
        if precomputed && x.ncols() != l {
            return Err(Error::SchemaMismatch(format!(
                "precomputed kernel must be square, got {} x {}",
                l,
                x.ncols()
            )));
        }

        let params = &self.params;
        let z = y.to_vec();
        let solution = if precomputed {
            let mut kernel = KernelCache::new(l, params.cache_size_mb, |i, j| x[[i, j]]);
            smo::solve(&mut kernel, &z, params.c, params.epsilon, params.tolerance)?
        } else {
            let mut kernel = KernelCache::new(l, params.cache_size_mb, |i, j| {
                params.evaluate(x.row(i), x.row(j))
            });
            tracing::debug!(samples = l, cached_rows = kernel.capacity(), "kernel cache sized");
            smo::solve(&mut kernel, &z, params.c, params.epsilon, params.tolerance)?
        };

        let support_index: Vec<usize> = (0..l).filter(|&s| solution.coef[s] != 0.0).collect();
        let coef: Vec<f64> = support_index.iter().map(|&s| solution.coef[s]).collect();
        let support = if precomputed {
            Array2::zeros((0, 0))
        } else {
            x.select(Axis(0), &support_index)
        };

        tracing::debug!(
            iterations = solution.iterations,
            support_vectors = coef.len(),
            rho = solution.rho,
            "support vector regression fitted"
        );

        self.fitted = Some(Fitted {
            support,
            support_index,
            coef,
            rho: solution.rho,
            n_features: x.ncols(),
        });
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let fitted = self.fitted.as_ref().ok_or_else(|| not_fitted(NAME))?;
        check_width(&x, fitted.n_features)?;

        let values = x
            .rows()
            .into_iter()
            .map(|row| {
                let sum: f64 = if self.params.kernel == Kernel::Precomputed {
                    fitted
                        .support_index
                        .iter()
                        .zip(&fitted.coef)
                        .map(|(&s, a)| a * row[s])
                        .sum()
                } else {
                    fitted
                        .support
                        .rows()
                        .into_iter()
                        .zip(&fitted.coef)
                        .map(|(sv, a)| a * self.params.evaluate(sv, row))
                        .sum()
                };
                sum - fitted.rho
            })
            .collect();
        Ok(values)
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Kernel", self.params.kernel.to_string()),
            ("Gamma", self.params.gamma.to_string()),
            ("C", self.params.c.to_string()),
            ("Epsilon", self.params.epsilon.to_string()),
            ("Degree", self.params.degree.to_string()),
            ("Coef0", self.params.coef0.to_string()),
            ("Tolerance", self.params.tolerance.to_string()),
            ("Cache Size (MB)", self.params.cache_size_mb.to_string()),
        ]
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn ramp() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((12, 1), |(i, _)| i as f64 / 11.0);
        let y = x.column(0).mapv(|v| -20.0 * v - 2.0);
        (x, y)
    }

    #[test]
    fn test_rbf_fits_ramp() {
        let (x, y) = ramp();
        let mut model = SupportVectorRegression::new(SvrParams {
            gamma: 100.0,
            ..SvrParams::default()
        })
        .unwrap();
        model.fit(x.view(), y.view()).unwrap();
        assert!(model.n_support() > 0);

        let pred = model.predict(x.view()).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert_relative_eq!(p, t, epsilon = 0.3);
        }
    }

    #[test]
    fn test_linear_kernel_extrapolates() {
        let (x, y) = ramp();
        let mut model = SupportVectorRegression::new(SvrParams {
            kernel: Kernel::Linear,
            epsilon: 0.01,
            tolerance: 1e-6,
            ..SvrParams::default()
        })
        .unwrap();
        model.fit(x.view(), y.view()).unwrap();
        let pred = model.predict(array![[2.0]].view()).unwrap();
        assert_relative_eq!(pred[0], -42.0, epsilon = 0.1);
    }

    #[test]
    fn test_precomputed_matches_linear() {
        let (x, y) = ramp();
        let gram = x.dot(&x.t());
        let params = SvrParams {
            epsilon: 0.01,
            tolerance: 1e-6,
            ..SvrParams::default()
        };

        let mut linear = SupportVectorRegression::new(SvrParams {
            kernel: Kernel::Linear,
            ..params.clone()
        })
        .unwrap();
        let mut pre = SupportVectorRegression::new(SvrParams {
            kernel: Kernel::Precomputed,
            ..params
        })
        .unwrap();
        linear.fit(x.view(), y.view()).unwrap();
        pre.fit(gram.view(), y.view()).unwrap();

        let query = array![[0.25], [0.8]];
        let query_gram = query.dot(&x.t());
        let a = linear.predict(query.view()).unwrap();
        let b = pre.predict(query_gram.view()).unwrap();
        for (p, q) in a.iter().zip(b.iter()) {
            assert_relative_eq!(p, q, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_precomputed_requires_square() {
        let mut model = SupportVectorRegression::new(SvrParams {
            kernel: Kernel::Precomputed,
            ..SvrParams::default()
        })
        .unwrap();
        let x = Array2::zeros((3, 2));
        let y = array![-1.0, -2.0, -3.0];
        assert!(matches!(model.fit(x.view(), y.view()), Err(Error::SchemaMismatch(_))));
    }

    #[test]
    fn test_invalid_params() {
        let bad_c = SvrParams {
            c: 0.0,
            ..SvrParams::default()
        };
        assert!(SupportVectorRegression::new(bad_c).is_err());
        let bad_gamma = SvrParams {
            gamma: -1.0,
            ..SvrParams::default()
        };
        assert!(SupportVectorRegression::new(bad_gamma).is_err());
        assert_eq!("RBF".parse::<Kernel>().unwrap(), Kernel::Rbf);
        assert!("cubic".parse::<Kernel>().is_err());
    }
}
