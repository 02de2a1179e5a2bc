//! # SDB Models
//!
//! Everything between the sample table and the written depth raster:
//!
//! - [`dataset`]: depth sign normalization, depth-range filtering and the
//!   deterministic train/test split
//! - [`backend`]: the [`Regressor`] trait and its linear, random forest and
//!   support vector implementations
//! - [`metrics`]: RMSE, MAE and R²
//! - [`pipeline`]: the staged fit/predict/score engine, its run report and
//!   the raster/report sink

pub mod backend;
pub mod dataset;
mod linalg;
pub mod metrics;
pub mod pipeline;
mod rng;

pub use backend::{Method, Regressor};
pub use dataset::{build, Dataset, DatasetParams, DepthLimit};
pub use metrics::Scores;
pub use pipeline::{PredictionEngine, RunOutput, RunReport};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::backend::{
        ForestParams, Kernel, LinearParams, Method, Parallelism, Regressor, SplitCriterion,
        SvrParams,
    };
    pub use crate::dataset::{build, Dataset, DatasetParams, DepthLimit};
    pub use crate::metrics::Scores;
    pub use crate::pipeline::{
        write_prediction, write_report, ColumnSelection, NullProgress, PipelineRun, PredictionEngine,
        ProgressSink, RunArtifacts, RunOutput, RunReport, RunStage,
    };
}
