//! End-to-end prediction pipeline
//!
//! [`PipelineRun`] owns the settings of one run and chains the stages:
//! open the image, load and merge the sample files, build the dataset, run
//! the [`PredictionEngine`], write the prediction and optionally the report.

pub mod engine;
pub mod report;
pub mod sink;

pub use engine::{NullProgress, PredictionEngine, ProgressSink, RunOutput, RunStage, TOTAL_STEPS};
pub use report::{InputFile, RasterInfo, RunReport, StageTimings};
pub use sink::{report_path, write_prediction, write_report};

use crate::backend::Method;
use crate::dataset::{self, DatasetParams, DepthLimit};
use sdb_core::io::{open_raster, write_raster, OutputFormat};
use sdb_core::samples::{load_many, SampleFormat};
use sdb_core::{Error, Result};
use std::path::PathBuf;
use std::time::Instant;

/// Sample columns to use; unset names fall back to depth in the first
/// column and bands from the second column to the last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSelection {
    pub depth: Option<String>,
    pub band_start: Option<String>,
    pub band_end: Option<String>,
}

/// Settings and inputs of a single run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub image: PathBuf,
    pub samples: Vec<PathBuf>,
    pub sample_format: SampleFormat,
    pub columns: ColumnSelection,
    pub train_fraction: f64,
    pub depth_limit: DepthLimit,
    pub method: Method,
    pub output: PathBuf,
    pub format: OutputFormat,
    pub save_report: bool,
}

/// What a completed [`PipelineRun`] produced
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    pub output: RunOutput,
    pub raster_path: PathBuf,
    pub report_path: Option<PathBuf>,
}

impl PipelineRun {
    /// A run with default sample layout, columns, split and depth limit.
    /// The output format follows the output extension, GeoTIFF otherwise.
    pub fn new(
        image: impl Into<PathBuf>,
        samples: Vec<PathBuf>,
        method: Method,
        output: impl Into<PathBuf>,
    ) -> Self {
        let output = output.into();
        let format = OutputFormat::from_path(&output).unwrap_or_default();
        Self {
            image: image.into(),
            samples,
            sample_format: SampleFormat::default(),
            columns: ColumnSelection::default(),
            train_fraction: 0.75,
            depth_limit: DepthLimit::default(),
            method,
            output,
            format,
            save_report: true,
        }
    }

    fn dataset_params(&self, table: &sdb_core::SampleTable) -> Result<DatasetParams> {
        let mut params = DatasetParams::for_table(table)?;
        if let Some(depth) = &self.columns.depth {
            params.depth_column = depth.clone();
        }
        if let Some(start) = &self.columns.band_start {
            params.band_start_column = start.clone();
        }
        if let Some(end) = &self.columns.band_end {
            params.band_end_column = end.clone();
        }
        params.train_fraction = self.train_fraction;
        params.depth_limit = self.depth_limit;
        Ok(params)
    }

    /// Run every stage and write the results.
    pub fn execute(&self, progress: Box<dyn ProgressSink>) -> Result<RunArtifacts> {
        if self.samples.is_empty() {
            return Err(Error::invalid_parameter(
                "samples",
                "[]",
                "at least one sample file is required",
            ));
        }

        let image = open_raster(&self.image)?;
        tracing::info!(
            path = %self.image.display(),
            width = image.width(),
            height = image.height(),
            bands = image.band_count(),
            "image loaded"
        );

        let table = load_many(self.samples.as_slice(), &self.sample_format)?;
        let params = self.dataset_params(&table)?;
        let start = Instant::now();
        let data = dataset::build(&table, &params)?;
        let preparation = start.elapsed();
        tracing::info!(
            train = data.train_y.len(),
            test = data.test_y.len(),
            sign_flipped = data.sign_flipped,
            "dataset built"
        );

        let samples = table
            .sources()
            .iter()
            .map(|s| InputFile::new(s.path.clone(), s.bytes))
            .collect();
        let mut engine = PredictionEngine::new(self.method.clone(), self.depth_limit)
            .with_progress(progress)
            .with_provenance(
                Some(InputFile::stat(&self.image)),
                samples,
                self.train_fraction,
            );
        let mut output = engine.run(&image, &data)?;
        output.report.timings.preparation = preparation;

        write_raster(&output.prediction, &self.output, self.format)?;
        tracing::info!(path = %self.output.display(), format = %self.format, "prediction written");

        let report_path = if self.save_report {
            Some(write_report(&output.report, &self.output)?)
        } else {
            None
        };

        Ok(RunArtifacts {
            output,
            raster_path: self.output.clone(),
            report_path,
        })
    }
}
