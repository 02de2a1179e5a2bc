//! Training data conditioning
//!
//! Turns a merged [`SampleTable`] into train/test matrices:
//!
//! 1. the depth column and a contiguous block of band columns are copied out
//! 2. depths are negated once if most of them are positive
//! 3. rows with a missing depth or band value are discarded
//! 4. rows outside `[limit, 0]` are discarded when the depth limit is on
//! 5. the remaining rows are shuffled with a fixed seed and split

use crate::rng::LcgRng;
use ndarray::{s, Array1, Array2, Axis};
use sdb_core::{Error, Result, SampleTable};

/// Seed of the train/test shuffle
pub const SPLIT_SEED: u64 = 0;

/// Valid-depth window applied to samples and predictions.
///
/// With `filter_enabled` (the default) only depths in `[limit, 0]` are kept
/// for training, and predicted depths outside that window become no-data.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct DepthLimit {
    pub filter_enabled: bool,
    pub limit: f64,
}

impl Default for DepthLimit {
    fn default() -> Self {
        Self {
            filter_enabled: true,
            limit: -30.0,
        }
    }
}

impl DepthLimit {
    /// A limit that keeps every depth
    pub fn disabled() -> Self {
        Self {
            filter_enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.filter_enabled && !(self.limit.is_finite() && self.limit <= 0.0) {
            return Err(Error::invalid_parameter(
                "depth_limit",
                self.limit,
                "must be a finite depth at or below zero",
            ));
        }
        Ok(())
    }

    /// Whether a depth lies inside the window (always true when disabled)
    pub fn contains(&self, depth: f64) -> bool {
        !self.filter_enabled || (depth >= self.limit && depth <= 0.0)
    }

    /// Map a predicted depth to NaN when it falls outside the window
    pub fn mask(&self, depth: f64) -> f64 {
        if self.contains(depth) {
            depth
        } else {
            f64::NAN
        }
    }
}

/// Column selection and split settings
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetParams {
    pub depth_column: String,
    /// First band column (inclusive)
    pub band_start_column: String,
    /// Last band column (inclusive)
    pub band_end_column: String,
    /// Share of rows used for training, in (0, 1)
    pub train_fraction: f64,
    pub depth_limit: DepthLimit,
}

impl DatasetParams {
    /// Defaults for a table: depth in the first column, bands from the
    /// second column to the last, 75% training rows, limit on at -30.
    pub fn for_table(table: &SampleTable) -> Result<Self> {
        let columns = table.columns();
        if columns.len() < 2 {
            return Err(Error::SchemaMismatch(format!(
                "need a depth column and at least one band column, table has {}",
                columns.len()
            )));
        }
        Ok(Self {
            depth_column: columns[0].clone(),
            band_start_column: columns[1].clone(),
            band_end_column: columns[columns.len() - 1].clone(),
            train_fraction: 0.75,
            depth_limit: DepthLimit::default(),
        })
    }
}

/// Train/test matrices ready for fitting
#[derive(Debug, Clone)]
pub struct Dataset {
    pub train_x: Array2<f64>,
    pub train_y: Array1<f64>,
    pub test_x: Array2<f64>,
    pub test_y: Array1<f64>,
    /// Names of the feature columns, in band order
    pub feature_columns: Vec<String>,
    /// Whether the depth column was negated
    pub sign_flipped: bool,
    /// Rows removed by the depth limit
    pub out_of_range: usize,
    /// Rows removed for a missing depth or band value
    pub incomplete: usize,
}

impl Dataset {
    /// Number of feature columns
    pub fn n_features(&self) -> usize {
        self.train_x.ncols()
    }

    /// Rows in train and test combined
    pub fn n_samples(&self) -> usize {
        self.train_y.len() + self.test_y.len()
    }
}

/// Negate the whole column when more than half of its non-null values are
/// positive. Returns whether the column was negated.
pub fn normalize_depth_sign(depth: &mut Array1<f64>) -> bool {
    let valid = depth.iter().filter(|d| !d.is_nan()).count();
    let positive = depth.iter().filter(|&&d| d > 0.0).count();
    let flip = positive * 2 > valid;
    if flip {
        depth.mapv_inplace(|d| -d);
    }
    flip
}

/// Shuffle `0..n` with `seed` and split it into `(train, test)` indices with
/// `ceil(n * (1 - train_fraction))` test rows.
pub fn split_indices(n: usize, train_fraction: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    validate_fraction(train_fraction)?;
    // Absorb representation error so 10 rows at 0.7 give 3 test rows, not 4
    let n_test = ((n as f64) * (1.0 - train_fraction) - 1e-9).ceil().max(0.0) as usize;
    let n_train = n.saturating_sub(n_test);
    if n_test == 0 || n_train == 0 {
        return Err(Error::invalid_parameter(
            "train_fraction",
            train_fraction,
            format!(
                "{} usable samples give {} training and {} test rows; both need at least one",
                n, n_train, n_test
            ),
        ));
    }

    let mut order: Vec<usize> = (0..n).collect();
    LcgRng::new(seed).shuffle(&mut order);
    let test = order[..n_test].to_vec();
    let train = order[n_test..].to_vec();
    Ok((train, test))
}

fn validate_fraction(train_fraction: f64) -> Result<()> {
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        return Err(Error::invalid_parameter(
            "train_fraction",
            train_fraction,
            "must lie strictly between 0 and 1",
        ));
    }
    Ok(())
}

fn column_position(table: &SampleTable, name: &str, role: &str) -> Result<usize> {
    table.column_index(name).ok_or_else(|| {
        Error::SchemaMismatch(format!(
            "{} column '{}' not found (columns: {})",
            role,
            name,
            table.columns().join(", ")
        ))
    })
}

/// Build the train/test dataset from a sample table.
///
/// The table itself is left untouched.
pub fn build(table: &SampleTable, params: &DatasetParams) -> Result<Dataset> {
    validate_fraction(params.train_fraction)?;
    params.depth_limit.validate()?;

    let depth_idx = column_position(table, &params.depth_column, "depth")?;
    let start = column_position(table, &params.band_start_column, "first band")?;
    let end = column_position(table, &params.band_end_column, "last band")?;
    if start > end {
        return Err(Error::SchemaMismatch(format!(
            "first band column '{}' comes after last band column '{}'",
            params.band_start_column, params.band_end_column
        )));
    }

    let mut depth = table.data().column(depth_idx).to_owned();
    let features = table.data().slice(s![.., start..=end]).to_owned();
    let feature_columns = table.columns()[start..=end].to_vec();

    let sign_flipped = normalize_depth_sign(&mut depth);
    if sign_flipped {
        tracing::info!("majority of depths were positive, depth column negated");
    }

    let mut keep = Vec::with_capacity(depth.len());
    let mut out_of_range = 0;
    let mut incomplete = 0;
    for (row, &d) in depth.iter().enumerate() {
        let has_null = d.is_nan() || features.row(row).iter().any(|v| v.is_nan());
        if has_null {
            incomplete += 1;
        } else if !params.depth_limit.contains(d) {
            out_of_range += 1;
        } else {
            keep.push(row);
        }
    }

    if incomplete > 0 {
        tracing::warn!(rows = incomplete, "dropped samples with missing depth or band values");
    }
    if params.depth_limit.filter_enabled {
        tracing::debug!(
            rows = out_of_range,
            limit = params.depth_limit.limit,
            "dropped samples outside the depth limit"
        );
    }

    let (train, test) = split_indices(keep.len(), params.train_fraction, SPLIT_SEED)?;
    let train_rows: Vec<usize> = train.iter().map(|&i| keep[i]).collect();
    let test_rows: Vec<usize> = test.iter().map(|&i| keep[i]).collect();

    tracing::info!(
        train = train_rows.len(),
        test = test_rows.len(),
        features = feature_columns.len(),
        "dataset ready"
    );

    Ok(Dataset {
        train_x: features.select(Axis(0), &train_rows),
        train_y: depth.select(Axis(0), &train_rows),
        test_x: features.select(Axis(0), &test_rows),
        test_y: depth.select(Axis(0), &test_rows),
        feature_columns,
        sign_flipped,
        out_of_range,
        incomplete,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn table(rows: Array2<f64>) -> SampleTable {
        let columns = (0..rows.ncols())
            .map(|i| if i == 0 { "depth".to_string() } else { format!("b{}", i) })
            .collect();
        SampleTable::new(columns, rows).unwrap()
    }

    #[test]
    fn test_sign_flip_majority_positive() {
        let mut depth = array![1.0, 2.0, 3.0, 4.0, -5.0];
        assert!(normalize_depth_sign(&mut depth));
        assert_eq!(depth, array![-1.0, -2.0, -3.0, -4.0, 5.0]);
    }

    #[test]
    fn test_sign_normalization_idempotent() {
        let mut depth = array![-1.0, -2.0, 3.0, f64::NAN];
        assert!(!normalize_depth_sign(&mut depth));
        let before = depth.clone();
        assert!(!normalize_depth_sign(&mut depth));
        assert_eq!(depth.slice(s![..3]), before.slice(s![..3]));
    }

    #[test]
    fn test_limit_window() {
        let limit = DepthLimit::default();
        assert!(limit.mask(-45.0).is_nan());
        assert!(limit.mask(5.0).is_nan());
        assert_relative_eq!(limit.mask(-10.0), -10.0);
        assert!(limit.contains(-30.0));
        assert!(limit.contains(0.0));
        assert_relative_eq!(DepthLimit::disabled().mask(-45.0), -45.0);
    }

    #[test]
    fn test_split_sizes() {
        let (train, test) = split_indices(10, 0.7, 0).unwrap();
        assert_eq!((train.len(), test.len()), (7, 3));

        let (train, test) = split_indices(4, 0.75, 0).unwrap();
        assert_eq!((train.len(), test.len()), (3, 1));

        let (train, test) = split_indices(7, 0.5, 0).unwrap();
        assert_eq!((train.len(), test.len()), (3, 4));

        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_is_reproducible() {
        assert_eq!(split_indices(25, 0.75, 0).unwrap(), split_indices(25, 0.75, 0).unwrap());
    }

    #[test]
    fn test_split_rejects_degenerate() {
        assert!(split_indices(1, 0.75, 0).is_err());
        assert!(split_indices(10, 1.0, 0).is_err());
        assert!(split_indices(10, 0.0, 0).is_err());
    }

    #[test]
    fn test_build_filters_and_flips() {
        // Five of six depths positive: the column is negated, then 45 m and
        // the row with the missing band fall out.
        let t = table(array![
            [5.0, 0.1, 0.2],
            [10.0, 0.2, 0.3],
            [45.0, 0.3, 0.4],
            [2.0, f64::NAN, 0.5],
            [12.0, 0.5, 0.6],
            [-3.0, 0.6, 0.7],
        ]);
        let mut params = DatasetParams::for_table(&t).unwrap();
        params.train_fraction = 0.5;

        let dataset = build(&t, &params).unwrap();
        assert!(dataset.sign_flipped);
        assert_eq!(dataset.out_of_range, 2);
        assert_eq!(dataset.incomplete, 1);
        assert_eq!(dataset.n_samples(), 3);
        assert_eq!(dataset.n_features(), 2);
        assert!(dataset
            .train_y
            .iter()
            .chain(dataset.test_y.iter())
            .all(|&d| (-30.0..=0.0).contains(&d)));
        // The caller's table is not modified
        assert_relative_eq!(t.data()[[0, 0]], 5.0);
    }

    #[test]
    fn test_missing_values_counted_before_limit() {
        // The second row is out of the window and has a missing band; it is
        // counted as incomplete only.
        let t = table(array![
            [-1.0, 0.1],
            [-45.0, f64::NAN],
            [-50.0, 0.3],
            [-2.0, 0.4],
            [-3.0, 0.5],
        ]);
        let dataset = build(&t, &DatasetParams::for_table(&t).unwrap()).unwrap();
        assert_eq!(dataset.incomplete, 1);
        assert_eq!(dataset.out_of_range, 1);
        assert_eq!(dataset.n_samples(), 3);
    }

    #[test]
    fn test_build_without_limit_keeps_rows() {
        let t = table(array![[-45.0, 1.0], [5.0, 2.0], [-10.0, 3.0], [-1.0, 4.0]]);
        let params = DatasetParams {
            depth_limit: DepthLimit::disabled(),
            ..DatasetParams::for_table(&t).unwrap()
        };
        let dataset = build(&t, &params).unwrap();
        assert_eq!(dataset.n_samples(), 4);
        assert_eq!(dataset.out_of_range, 0);
    }

    #[test]
    fn test_build_schema_errors() {
        let t = table(array![[-1.0, 0.1, 0.2], [-2.0, 0.3, 0.4]]);
        let mut params = DatasetParams::for_table(&t).unwrap();
        params.band_start_column = "b2".into();
        params.band_end_column = "b1".into();
        assert!(matches!(build(&t, &params), Err(Error::SchemaMismatch(_))));

        params.band_start_column = "b7".into();
        assert!(matches!(build(&t, &params), Err(Error::SchemaMismatch(_))));
    }

    #[test]
    fn test_feature_span_matches_selection() {
        let t = table(array![
            [-1.0, 0.1, 0.2, 0.3, 0.4],
            [-2.0, 0.2, 0.3, 0.4, 0.5],
            [-3.0, 0.3, 0.4, 0.5, 0.6],
            [-4.0, 0.4, 0.5, 0.6, 0.7],
        ]);
        let params = DatasetParams {
            band_start_column: "b2".into(),
            band_end_column: "b3".into(),
            ..DatasetParams::for_table(&t).unwrap()
        };
        let dataset = build(&t, &params).unwrap();
        assert_eq!(dataset.feature_columns, vec!["b2", "b3"]);
        assert_eq!(dataset.train_x.ncols(), 2);
    }
}
