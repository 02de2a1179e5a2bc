//! Ordinary least squares

use super::{check_training, check_width, not_fitted, Regressor};
use crate::linalg::least_squares;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use sdb_core::{Error, Result};
use serde::Serialize;

pub(crate) const NAME: &str = "Multiple Linear Regression";

/// Hyperparameters of [`LinearRegression`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinearParams {
    pub fit_intercept: bool,
    /// Scale centred columns to unit L2 norm before solving. Only applies
    /// when an intercept is fitted.
    pub normalize: bool,
    /// Kept for report parity; training input is never modified.
    pub copy_x: bool,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self {
            fit_intercept: true,
            normalize: false,
            copy_x: true,
        }
    }
}

#[derive(Debug, Clone)]
struct Fitted {
    coefficients: Array1<f64>,
    intercept: f64,
}

/// Multiple linear regression fitted by least squares.
///
/// Linearly dependent feature columns receive a zero coefficient.
#[derive(Debug, Clone)]
pub struct LinearRegression {
    params: LinearParams,
    fitted: Option<Fitted>,
}

impl LinearRegression {
    pub fn new(params: LinearParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|f| &f.coefficients)
    }

    pub fn intercept(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.intercept)
    }
}

impl Regressor for LinearRegression {
    fn name(&self) -> &'static str {
        NAME
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        check_training(&x, &y)?;

        let fitted = if self.params.fit_intercept {
            let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
            let y_mean = y.mean().unwrap_or(0.0);
            let mut centred = &x - &x_mean;
            let yc = &y - y_mean;

            let scale = if self.params.normalize {
                centred
                    .axis_iter(Axis(1))
                    .map(|col| {
                        let norm = col.dot(&col).sqrt();
                        if norm > 0.0 {
                            norm
                        } else {
                            1.0
                        }
                    })
                    .collect::<Array1<f64>>()
            } else {
                Array1::ones(x.ncols())
            };
            centred /= &scale;

            let coefficients = least_squares(&centred, &yc)? / &scale;
            let intercept = y_mean - x_mean.dot(&coefficients);
            Fitted {
                coefficients,
                intercept,
            }
        } else {
            Fitted {
                coefficients: least_squares(&x.to_owned(), &y.to_owned())?,
                intercept: 0.0,
            }
        };

        if !fitted.intercept.is_finite() || fitted.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(Error::Fit {
                stage: "fit",
                reason: "least squares produced non-finite coefficients".into(),
            });
        }

        tracing::debug!(
            intercept = fitted.intercept,
            coefficients = ?fitted.coefficients.to_vec(),
            "linear model fitted"
        );
        self.fitted = Some(fitted);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let fitted = self.fitted.as_ref().ok_or_else(|| not_fitted(NAME))?;
        check_width(&x, fitted.coefficients.len())?;
        Ok(x.dot(&fitted.coefficients) + fitted.intercept)
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Fit Intercept", self.params.fit_intercept.to_string()),
            ("Normalize", self.params.normalize.to_string()),
            ("Copy X", self.params.copy_x.to_string()),
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

    #[test]
    fn test_recovers_plane() {
        // depth = -1 - 4 * blue + 2 * green
        let x = array![[0.1, 0.2], [0.3, 0.1], [0.5, 0.4], [0.2, 0.6], [0.7, 0.3]];
        let y = x.map_axis(Axis(1), |r| -1.0 - 4.0 * r[0] + 2.0 * r[1]);

        let mut model = LinearRegression::new(LinearParams::default());
        model.fit(x.view(), y.view()).unwrap();

        assert_relative_eq!(model.intercept().unwrap(), -1.0, epsilon = 1e-9);
        let coef = model.coefficients().unwrap();
        assert_relative_eq!(coef[0], -4.0, epsilon = 1e-9);
        assert_relative_eq!(coef[1], 2.0, epsilon = 1e-9);

        let pred = model.predict(array![[0.0, 0.0]].view()).unwrap();
        assert_relative_eq!(pred[0], -1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_normalize_gives_same_fit() {
        let x = array![[1.0, 10.0], [2.0, 30.0], [3.0, 20.0], [4.0, 50.0]];
        let y = array![-2.0, -5.0, -4.5, -9.0];

        let mut plain = LinearRegression::new(LinearParams::default());
        let mut scaled = LinearRegression::new(LinearParams {
            normalize: true,
            ..LinearParams::default()
        });
        plain.fit(x.view(), y.view()).unwrap();
        scaled.fit(x.view(), y.view()).unwrap();

        let a = plain.predict(x.view()).unwrap();
        let b = scaled.predict(x.view()).unwrap();
        for (p, q) in a.iter().zip(b.iter()) {
            assert_relative_eq!(p, q, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_collinear_bands() {
        let x = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let y = array![-1.0, -3.0, -5.0];
        let mut model = LinearRegression::new(LinearParams::default());
        model.fit(x.view(), y.view()).unwrap();
        let pred = model.predict(array![[7.0, 8.0]].view()).unwrap();
        assert_relative_eq!(pred[0], -7.0, epsilon = 1e-9);
    }

    #[test]
    fn test_without_intercept() {
        let x = array![[1.0], [2.0], [4.0]];
        let y = array![-2.0, -4.0, -8.0];
        let mut model = LinearRegression::new(LinearParams {
            fit_intercept: false,
            ..LinearParams::default()
        });
        model.fit(x.view(), y.view()).unwrap();
        assert_relative_eq!(model.coefficients().unwrap()[0], -2.0, epsilon = 1e-12);
        assert_eq!(model.intercept(), Some(0.0));
    }

    #[test]
    fn test_wrong_width() {
        let mut model = LinearRegression::new(LinearParams::default());
        model
            .fit(array![[1.0, 2.0], [2.0, 1.0], [3.0, 3.0]].view(), array![-1.0, -2.0, -3.0].view())
            .unwrap();
        assert!(matches!(
            model.predict(array![[1.0]].view()),
            Err(Error::SchemaMismatch(_))
        ));
    }
}
