//! Run report
//!
//! [`RunReport`] is a plain record of one finished run. Its `Display`
//! implementation renders the tab-aligned text shown after a run and saved
//! next to the output raster.

use crate::dataset::DepthLimit;
use crate::metrics::Scores;
use sdb_core::MultiBandRaster;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A file that took part in a run, with its size on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputFile {
    pub path: PathBuf,
    pub bytes: u64,
}

impl InputFile {
    pub fn new(path: impl Into<PathBuf>, bytes: u64) -> Self {
        Self {
            path: path.into(),
            bytes,
        }
    }

    /// Stat `path` for its size; a file that cannot be inspected counts as
    /// zero bytes.
    pub fn stat(path: &Path) -> Self {
        let bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        Self::new(path, bytes)
    }
}

/// Wall-clock duration of each engine stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageTimings {
    /// Dataset assembly ahead of the fit; reported as part of fitting
    pub preparation: Duration,
    pub fitting: Duration,
    pub prediction: Duration,
    pub validating: Duration,
}

impl StageTimings {
    /// Dataset assembly and model fit together
    pub fn fitting_total(&self) -> Duration {
        self.preparation + self.fitting
    }

    /// Every stage from dataset assembly to validation; file loading is not
    /// counted
    pub fn overall(&self) -> Duration {
        self.fitting_total() + self.prediction + self.validating
    }
}

/// Georeferencing summary of the reference image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RasterInfo {
    pub crs: String,
    pub width: usize,
    pub height: usize,
    pub pixel_size: (f64, f64),
}

impl RasterInfo {
    pub fn of(image: &MultiBandRaster) -> Self {
        Self {
            crs: image
                .crs()
                .map(|c| c.identifier())
                .unwrap_or_else(|| "None".to_string()),
            width: image.width(),
            height: image.height(),
            pixel_size: image.pixel_size(),
        }
    }
}

/// Everything needed to reproduce or audit a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub image: Option<InputFile>,
    pub samples: Vec<InputFile>,
    pub method: String,
    /// Hyperparameters as `(label, value)` in display order
    pub parameters: Vec<(String, String)>,
    pub depth_limit: DepthLimit,
    pub train_percent: f64,
    pub n_train: usize,
    pub n_test: usize,
    pub scores: Scores,
    pub timings: StageTimings,
    pub raster: RasterInfo,
}

impl RunReport {
    pub fn test_percent(&self) -> f64 {
        round2(100.0 - self.train_percent)
    }

    pub fn sample_bytes(&self) -> u64 {
        self.samples.iter().map(|s| s.bytes).sum()
    }
}

/// Bytes to mebibytes, rounded to two decimals
pub fn megabytes(bytes: u64) -> f64 {
    round2(bytes as f64 / f64::from(1u32 << 20))
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// `H:MM:SS[.ffffff]`
pub fn format_runtime(d: Duration) -> String {
    let secs = d.as_secs();
    let micros = d.subsec_micros();
    let hms = format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60);
    if micros == 0 {
        hms
    } else {
        format!("{}.{:06}", hms, micros)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.image {
            Some(image) => writeln!(
                f,
                "Image Input:\t\t{} ({} MB)",
                image.path.display(),
                megabytes(image.bytes)
            )?,
            None => writeln!(f, "Image Input:\t\t-")?,
        }
        write!(f, "Sample Data:\t\t")?;
        for sample in &self.samples {
            writeln!(f, "{}", sample.path.display())?;
        }
        writeln!(f, " ({} MB)", megabytes(self.sample_bytes()))?;
        writeln!(f)?;

        if self.depth_limit.filter_enabled {
            writeln!(f, "Depth Limit:\t\t{}", self.depth_limit.limit)?;
        } else {
            writeln!(f, "Depth Limit:\t\tDisabled")?;
        }
        writeln!(f, "Train Data:\t\t{} %", round2(self.train_percent))?;
        writeln!(f, "Test Data:\t\t{} %", self.test_percent())?;
        writeln!(f)?;

        writeln!(f, "Method:\t\t{}", self.method)?;
        for (label, value) in &self.parameters {
            writeln!(f, "{}:\t\t{}", label, value)?;
        }
        writeln!(f)?;

        writeln!(f, "RMSE:\t\t{}", self.scores.rmse)?;
        writeln!(f, "MAE:\t\t{}", self.scores.mae)?;
        writeln!(f, "R\u{00B2}:\t\t{}", self.scores.r2)?;
        writeln!(f)?;

        let t = &self.timings;
        writeln!(f, "Fitting Runtime:\t\t{}", format_runtime(t.fitting_total()))?;
        writeln!(f, "Prediction Runtime:\t{}", format_runtime(t.prediction))?;
        writeln!(f, "Validating Runtime:\t{}", format_runtime(t.validating))?;
        writeln!(f, "Overall Runtime:\t{}", format_runtime(t.overall()))?;
        writeln!(f)?;

        let r = &self.raster;
        writeln!(f, "CRS:\t\t{}", r.crs)?;
        writeln!(f, "Dimensions:\t\t{} x {} pixels", r.width, r.height)?;
        writeln!(f, "Pixel Size:\t\t{} , {}", r.pixel_size.0, r.pixel_size.1)?;
        writeln!(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> RunReport {
        RunReport {
            image: Some(InputFile::new("scene.tif", 3 * (1 << 20) / 2)),
            samples: vec![
                InputFile::new("a.csv", 1 << 19),
                InputFile::new("b.csv", 1 << 19),
            ],
            method: "Random Forest".into(),
            parameters: vec![
                ("N Trees".into(), "300".into()),
                ("Criterion".into(), "mse".into()),
            ],
            depth_limit: DepthLimit::default(),
            train_percent: 75.0,
            n_train: 30,
            n_test: 10,
            scores: Scores {
                rmse: 1.5,
                mae: 1.25,
                r2: 0.75,
            },
            timings: StageTimings {
                preparation: Duration::from_millis(500),
                fitting: Duration::from_millis(1000),
                prediction: Duration::from_secs(61),
                validating: Duration::from_micros(20),
            },
            raster: RasterInfo {
                crs: "EPSG:32750".into(),
                width: 4,
                height: 3,
                pixel_size: (10.0, -10.0),
            },
        }
    }

    #[test]
    fn test_runtime_format() {
        assert_eq!(format_runtime(Duration::from_secs(3725)), "1:02:05");
        assert_eq!(format_runtime(Duration::from_millis(1500)), "0:00:01.500000");
    }

    #[test]
    fn test_overall_counts_dataset_assembly() {
        let t = StageTimings {
            preparation: Duration::from_millis(250),
            fitting: Duration::from_millis(750),
            prediction: Duration::from_secs(2),
            validating: Duration::from_millis(500),
        };
        assert_eq!(t.fitting_total(), Duration::from_secs(1));
        assert_eq!(t.overall(), Duration::from_millis(3500));
        assert_eq!(
            t.overall(),
            t.fitting_total() + t.prediction + t.validating
        );
    }

    #[test]
    fn test_megabytes() {
        assert_eq!(megabytes(1 << 20), 1.0);
        assert_eq!(megabytes(1234567), 1.18);
        assert_eq!(megabytes(0), 0.0);
    }

    #[test]
    fn test_text_layout() {
        let text = report().to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Image Input:\t\tscene.tif (1.5 MB)");
        assert_eq!(lines[1], "Sample Data:\t\ta.csv");
        assert_eq!(lines[2], "b.csv");
        assert_eq!(lines[3], " (1 MB)");
        assert!(text.contains("Depth Limit:\t\t-30\n"));
        assert!(text.contains("Train Data:\t\t75 %\nTest Data:\t\t25 %\n"));
        assert!(text.contains("Method:\t\tRandom Forest\nN Trees:\t\t300\nCriterion:\t\tmse\n"));
        assert!(text.contains("R²:\t\t0.75\n"));
        assert!(text.contains("Fitting Runtime:\t\t0:00:01.500000\n"));
        assert!(text.contains("Overall Runtime:\t0:01:02.500020\n"));
        assert!(text.contains("Dimensions:\t\t4 x 3 pixels\n"));
        assert!(text.contains("Pixel Size:\t\t10 , -10\n"));
        assert!(text.ends_with("\n\n"));
    }

    #[test]
    fn test_disabled_limit() {
        let mut r = report();
        r.depth_limit = DepthLimit::disabled();
        r.train_percent = 70.0;
        let text = r.to_string();
        assert!(text.contains("Depth Limit:\t\tDisabled\n"));
        assert!(text.contains("Test Data:\t\t30 %\n"));
    }
}
