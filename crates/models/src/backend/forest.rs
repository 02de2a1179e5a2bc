//! Random forest regression
//!
//! Bootstrap-aggregated, fully grown CART trees. Each tree draws its own
//! bootstrap sample from a seed derived from the forest seed and its index,
//! so the fitted forest does not depend on how many threads built it.

use super::tree::{RegressionTree, Targets};
use super::{check_training, check_width, not_fitted, Parallelism, Regressor};
use crate::rng::{derive_seed, LcgRng};
use ndarray::{Array1, ArrayView1, ArrayView2};
use sdb_core::{Error, Result};
use sdb_parallel::ParallelStrategy;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

pub(crate) const NAME: &str = "Random Forest";

/// Impurity measure used to choose splits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SplitCriterion {
    /// Mean squared error; leaves predict the mean
    #[default]
    SquaredError,
    /// Mean absolute error; leaves predict the median
    AbsoluteError,
}

impl SplitCriterion {
    pub fn short_name(&self) -> &'static str {
        match self {
            SplitCriterion::SquaredError => "mse",
            SplitCriterion::AbsoluteError => "mae",
        }
    }
}

impl FromStr for SplitCriterion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mse" | "squared_error" => Ok(SplitCriterion::SquaredError),
            "mae" | "absolute_error" => Ok(SplitCriterion::AbsoluteError),
            _ => Err(Error::invalid_parameter("criterion", s, "expected mse or mae")),
        }
    }
}

impl fmt::Display for SplitCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Hyperparameters of [`RandomForest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub criterion: SplitCriterion,
    pub seed: u64,
    pub parallelism: Parallelism,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 300,
            criterion: SplitCriterion::SquaredError,
            seed: 0,
            parallelism: Parallelism::all(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RandomForest {
    params: ForestParams,
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl RandomForest {
    pub fn new(params: ForestParams) -> Result<Self> {
        if params.n_trees == 0 {
            return Err(Error::invalid_parameter("n_trees", 0, "need at least one tree"));
        }
        params.parallelism.mode()?;
        Ok(Self {
            params,
            trees: Vec::new(),
            n_features: 0,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for RandomForest {
    fn name(&self) -> &'static str {
        NAME
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        check_training(&x, &y)?;
        let mode = self.params.parallelism.mode()?;
        let n = x.nrows();
        let targets = Targets::new(y);
        let criterion = self.params.criterion;
        let seed = self.params.seed;

        tracing::debug!(
            trees = self.params.n_trees,
            criterion = %criterion,
            threads = mode.threads(),
            "growing forest"
        );

        self.trees = mode.par_map(0..self.params.n_trees, |t| {
            let mut rng = LcgRng::new(derive_seed(seed, t as u64));
            let sample: Vec<usize> = (0..n).map(|_| rng.next_bounded(n as u64) as usize).collect();
            RegressionTree::fit(&x, &targets, sample, criterion)
        })?;
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(not_fitted(NAME));
        }
        check_width(&x, self.n_features)?;
        let mode = self.params.parallelism.mode()?;
        let n_trees = self.trees.len() as f64;

        let values = mode.par_map(0..x.nrows(), |i| {
            let row = x.row(i);
            if row.iter().any(|v| v.is_nan()) {
                return f64::NAN;
            }
            self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees
        })?;
        Ok(Array1::from(values))
    }

    fn parameters(&self) -> Vec<(&'static str, String)> {
        vec![
            ("N Trees", self.params.n_trees.to_string()),
            ("Criterion", self.params.criterion.to_string()),
            ("Random State", self.params.seed.to_string()),
            ("Jobs", self.params.parallelism.to_string()),
        ]
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    fn shallow_and_deep() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| ((i * 7 + j * 3) % 40) as f64 / 40.0);
        let y = x.map_axis(ndarray::Axis(1), |r| if r[0] < 0.5 { -3.0 } else { -12.0 });
        (x, y)
    }

    #[test]
    fn test_learns_step() {
        let (x, y) = shallow_and_deep();
        let mut forest = RandomForest::new(ForestParams {
            n_trees: 25,
            ..ForestParams::default()
        })
        .unwrap();
        forest.fit(x.view(), y.view()).unwrap();
        assert_eq!(forest.n_trees(), 25);

        let pred = forest.predict(array![[0.1, 0.5], [0.9, 0.5]].view()).unwrap();
        assert_relative_eq!(pred[0], -3.0, epsilon = 1.0);
        assert_relative_eq!(pred[1], -12.0, epsilon = 1.0);
    }

    #[test]
    fn test_thread_count_does_not_change_result() {
        let (x, y) = shallow_and_deep();
        let fit_with = |jobs| {
            let mut forest = RandomForest::new(ForestParams {
                n_trees: 10,
                seed: 42,
                parallelism: Parallelism::jobs(jobs),
                ..ForestParams::default()
            })
            .unwrap();
            forest.fit(x.view(), y.view()).unwrap();
            forest.predict(x.view()).unwrap()
        };
        assert_eq!(fit_with(1), fit_with(3));
    }

    #[test]
    fn test_nan_pixel_predicts_nan() {
        let (x, y) = shallow_and_deep();
        let mut forest = RandomForest::new(ForestParams {
            n_trees: 5,
            criterion: SplitCriterion::AbsoluteError,
            ..ForestParams::default()
        })
        .unwrap();
        forest.fit(x.view(), y.view()).unwrap();
        let pred = forest.predict(array![[f64::NAN, 0.2], [0.2, 0.2]].view()).unwrap();
        assert!(pred[0].is_nan());
        assert!(pred[1].is_finite());
    }

    #[test]
    fn test_invalid_params() {
        assert!(RandomForest::new(ForestParams {
            n_trees: 0,
            ..ForestParams::default()
        })
        .is_err());
        assert_eq!("MAE".parse::<SplitCriterion>().unwrap(), SplitCriterion::AbsoluteError);
        assert!("gini".parse::<SplitCriterion>().is_err());
    }
}
