//! Staged fit, predict and score
//!
//! A [`PredictionEngine`] runs exactly once and moves through
//! `Configured -> Fitting -> Predicting -> Scoring -> Done`. Any error moves
//! it to `Failed` and remembers the stage that failed; no report is produced
//! for a failed run.

use super::report::{InputFile, RasterInfo, RunReport, StageTimings};
use crate::backend::Method;
use crate::dataset::{Dataset, DepthLimit};
use crate::metrics::Scores;
use ndarray::{Array1, Axis};
use sdb_core::{Error, MultiBandRaster, Raster, Result};
use std::fmt;
use std::time::{Duration, Instant};

/// Lifecycle of a [`PredictionEngine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Configured,
    Fitting,
    Predicting,
    Scoring,
    Done,
    Failed,
}

impl RunStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStage::Done | RunStage::Failed)
    }

    pub fn name(&self) -> &'static str {
        match self {
            RunStage::Configured => "configured",
            RunStage::Fitting => "fitting",
            RunStage::Predicting => "predicting",
            RunStage::Scoring => "scoring",
            RunStage::Done => "done",
            RunStage::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Number of completed steps reported through [`ProgressSink::completed`]
pub const TOTAL_STEPS: u8 = 4;

/// Receives progress notifications from a running engine.
///
/// Steps count from 0 (started) to [`TOTAL_STEPS`]: fitted, predicted,
/// scored, report assembled.
pub trait ProgressSink {
    fn stage(&mut self, _stage: RunStage) {}

    fn completed(&mut self, _step: u8) {}
}

/// Discards all progress notifications
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Predicted depth on the image grid; no-data is NaN
    pub prediction: Raster,
    pub report: RunReport,
}

/// Fits a backend on a [`Dataset`] and applies it to every pixel of an image.
pub struct PredictionEngine {
    method: Method,
    depth_limit: DepthLimit,
    train_fraction: f64,
    image_file: Option<InputFile>,
    sample_files: Vec<InputFile>,
    progress: Box<dyn ProgressSink>,
    stage: RunStage,
    failed_at: Option<RunStage>,
}

impl PredictionEngine {
    /// `depth_limit` masks predictions; use the limit the dataset was built
    /// with.
    pub fn new(method: Method, depth_limit: DepthLimit) -> Self {
        Self {
            method,
            depth_limit,
            train_fraction: 0.75,
            image_file: None,
            sample_files: Vec::new(),
            progress: Box::new(NullProgress),
            stage: RunStage::Configured,
            failed_at: None,
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Input files and split recorded in the report
    pub fn with_provenance(
        mut self,
        image: Option<InputFile>,
        samples: Vec<InputFile>,
        train_fraction: f64,
    ) -> Self {
        self.image_file = image;
        self.sample_files = samples;
        self.train_fraction = train_fraction;
        self
    }

    pub fn stage(&self) -> RunStage {
        self.stage
    }

    /// Stage that was active when the run failed
    pub fn failed_at(&self) -> Option<RunStage> {
        self.failed_at
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn run(&mut self, image: &MultiBandRaster, dataset: &Dataset) -> Result<RunOutput> {
        if self.stage != RunStage::Configured {
            return Err(Error::Other(format!(
                "prediction engine already {}, build a new one for another run",
                self.stage
            )));
        }

        match self.execute(image, dataset) {
            Ok(output) => {
                self.enter(RunStage::Done);
                Ok(output)
            }
            Err(e) => {
                tracing::error!(stage = %self.stage, error = %e, "run failed");
                self.failed_at = Some(self.stage);
                self.enter(RunStage::Failed);
                Err(e)
            }
        }
    }

    fn enter(&mut self, stage: RunStage) {
        tracing::debug!(from = %self.stage, to = %stage, "engine stage");
        self.stage = stage;
        self.progress.stage(stage);
    }

    fn execute(&mut self, image: &MultiBandRaster, dataset: &Dataset) -> Result<RunOutput> {
        if dataset.n_features() != image.band_count() {
            return Err(Error::SchemaMismatch(format!(
                "{} band columns selected ({}) but the image has {} bands",
                dataset.n_features(),
                dataset.feature_columns.join(", "),
                image.band_count()
            )));
        }
        self.depth_limit.validate()?;
        let mut model = self.method.build()?;
        self.progress.completed(0);

        self.enter(RunStage::Fitting);
        let start = Instant::now();
        model.fit(dataset.train_x.view(), dataset.train_y.view())?;
        let fitting = start.elapsed();
        tracing::info!(method = %self.method, samples = dataset.train_y.len(), ?fitting, "model fitted");
        self.progress.completed(1);

        self.enter(RunStage::Predicting);
        let start = Instant::now();
        let features = image.to_feature_matrix();
        let mut values = model.predict(features.view())?;
        mask_nodata(&mut values, &features, image.nodata());
        values.mapv_inplace(|v| self.depth_limit.mask(v));
        let mut prediction = image.reshape_prediction(values.to_vec())?;
        prediction.set_nodata(Some(f64::NAN));
        let predicting = start.elapsed();
        tracing::info!(pixels = values.len(), ?predicting, "image predicted");
        self.progress.completed(2);

        self.enter(RunStage::Scoring);
        let start = Instant::now();
        let validate = model.predict(dataset.test_x.view())?;
        let scores = Scores::compute(dataset.test_y.view(), validate.view())?;
        let validating = start.elapsed();
        tracing::info!(rmse = scores.rmse, mae = scores.mae, r2 = scores.r2, "test set scored");
        self.progress.completed(3);

        let report = RunReport {
            image: self.image_file.clone(),
            samples: self.sample_files.clone(),
            method: self.method.display_name().to_string(),
            parameters: model
                .parameters()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            depth_limit: self.depth_limit,
            train_percent: self.train_fraction * 100.0,
            n_train: dataset.train_y.len(),
            n_test: dataset.test_y.len(),
            scores,
            timings: StageTimings {
                preparation: Duration::ZERO,
                fitting,
                prediction: predicting,
                validating,
            },
            raster: RasterInfo::of(image),
        };
        self.progress.completed(4);

        Ok(RunOutput { prediction, report })
    }
}

/// Pixels whose bands hold the image no-data value, or NaN, predict NaN
fn mask_nodata(values: &mut Array1<f64>, features: &ndarray::Array2<f64>, nodata: Option<f64>) {
    for (v, pixel) in values.iter_mut().zip(features.axis_iter(Axis(0))) {
        let missing = pixel
            .iter()
            .any(|&b| b.is_nan() || nodata.is_some_and(|nd| b == nd));
        if missing {
            *v = f64::NAN;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LinearParams;
    use approx::assert_relative_eq;
    use ndarray::array;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// depth = -10 * blue - 2, green is noise
    fn dataset() -> Dataset {
        let train_x = array![[0.1, 0.3], [0.5, 0.2], [1.0, 0.9], [2.0, 0.4], [0.7, 0.1]];
        let train_y = train_x.map_axis(Axis(1), |r| -10.0 * r[0] - 2.0);
        let test_x = array![[1.5, 0.5], [0.2, 0.8]];
        let test_y = test_x.map_axis(Axis(1), |r| -10.0 * r[0] - 2.0);
        Dataset {
            train_x,
            train_y,
            test_x,
            test_y,
            feature_columns: vec!["blue".into(), "green".into()],
            sign_flipped: false,
            out_of_range: 0,
            incomplete: 0,
        }
    }

    /// 2 x 2 image; pixel (1, 1) would predict -42
    fn image() -> MultiBandRaster {
        MultiBandRaster::from_interleaved(vec![0.1, 0.0, 1.0, 0.0, 2.0, 0.0, 4.0, 0.0], 2, 2, 2)
            .unwrap()
    }

    fn linear() -> Method {
        Method::Linear(LinearParams::default())
    }

    #[derive(Default)]
    struct Recorder {
        stages: Vec<RunStage>,
        steps: Vec<u8>,
    }

    struct Shared(Rc<RefCell<Recorder>>);

    impl ProgressSink for Shared {
        fn stage(&mut self, stage: RunStage) {
            self.0.borrow_mut().stages.push(stage);
        }

        fn completed(&mut self, step: u8) {
            self.0.borrow_mut().steps.push(step);
        }
    }

    #[test]
    fn test_run_predicts_and_masks() {
        let mut engine = PredictionEngine::new(linear(), DepthLimit::default());
        let out = engine.run(&image(), &dataset()).unwrap();
        assert_eq!(engine.stage(), RunStage::Done);

        let p = out.prediction;
        assert_eq!(p.shape(), (2, 2));
        assert_relative_eq!(p.get(0, 0).unwrap(), -3.0, epsilon = 1e-9);
        assert_relative_eq!(p.get(0, 1).unwrap(), -12.0, epsilon = 1e-9);
        assert_relative_eq!(p.get(1, 0).unwrap(), -22.0, epsilon = 1e-9);
        // -42 lies beyond the -30 limit
        assert!(p.get(1, 1).unwrap().is_nan());
        assert!(p.nodata().is_some_and(f64::is_nan));

        assert_relative_eq!(out.report.scores.rmse, 0.0, epsilon = 1e-9);
        assert_relative_eq!(out.report.scores.r2, 1.0, epsilon = 1e-9);
        assert_eq!((out.report.n_train, out.report.n_test), (5, 2));
        assert_eq!(out.report.method, "Multiple Linear Regression");
    }

    #[test]
    fn test_disabled_limit_keeps_everything() {
        let mut engine = PredictionEngine::new(linear(), DepthLimit::disabled());
        let out = engine.run(&image(), &dataset()).unwrap();
        assert_relative_eq!(out.prediction.get(1, 1).unwrap(), -42.0, epsilon = 1e-9);
    }

    #[test]
    fn test_nodata_pixels_predict_nan() {
        let mut img = image();
        img.set_nodata(Some(2.0));
        let mut engine = PredictionEngine::new(linear(), DepthLimit::disabled());
        let out = engine.run(&img, &dataset()).unwrap();
        assert!(out.prediction.get(1, 0).unwrap().is_nan());
        assert!(out.prediction.get(0, 0).unwrap().is_finite());
    }

    #[test]
    fn test_band_count_mismatch() {
        let img = MultiBandRaster::from_interleaved(vec![0.1; 12], 2, 2, 3).unwrap();
        let mut engine = PredictionEngine::new(linear(), DepthLimit::default());
        assert!(matches!(engine.run(&img, &dataset()), Err(Error::SchemaMismatch(_))));
        assert_eq!(engine.stage(), RunStage::Failed);
        assert_eq!(engine.failed_at(), Some(RunStage::Configured));
    }

    #[test]
    fn test_fit_failure_is_recorded() {
        let mut data = dataset();
        data.train_x[[0, 0]] = f64::NAN;
        let mut engine = PredictionEngine::new(linear(), DepthLimit::default());
        assert!(matches!(engine.run(&image(), &data), Err(Error::Fit { .. })));
        assert_eq!(engine.failed_at(), Some(RunStage::Fitting));
    }

    #[test]
    fn test_runs_only_once() {
        let mut engine = PredictionEngine::new(linear(), DepthLimit::default());
        engine.run(&image(), &dataset()).unwrap();
        assert!(engine.run(&image(), &dataset()).is_err());
        assert_eq!(engine.stage(), RunStage::Done);
    }

    #[test]
    fn test_progress_notifications() {
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        let mut engine = PredictionEngine::new(linear(), DepthLimit::default())
            .with_progress(Box::new(Shared(Rc::clone(&recorder))));
        engine.run(&image(), &dataset()).unwrap();

        let r = recorder.borrow();
        assert_eq!(r.steps, vec![0, 1, 2, 3, 4]);
        assert_eq!(
            r.stages,
            vec![
                RunStage::Fitting,
                RunStage::Predicting,
                RunStage::Scoring,
                RunStage::Done
            ]
        );
    }
}
