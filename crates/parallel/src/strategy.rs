//! Parallel processing strategies

use crate::maybe_rayon::*;
use sdb_core::{Error, Result};
use std::ops::Range;

/// Processing mode for backend fitting and batch prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Single-threaded processing
    Sequential,
    /// Parallel processing using all available cores
    #[default]
    Parallel,
    /// Parallel with specified number of threads
    ParallelWith(usize),
}

impl ProcessingMode {
    /// Mode for a requested worker count; `None` uses every core and a
    /// single worker runs sequentially.
    pub fn from_jobs(jobs: Option<usize>) -> Result<Self> {
        match jobs {
            None => Ok(ProcessingMode::Parallel),
            Some(0) => Err(Error::invalid_parameter(
                "jobs",
                0,
                "worker count must be at least 1",
            )),
            Some(1) => Ok(ProcessingMode::Sequential),
            Some(n) => Ok(ProcessingMode::ParallelWith(n)),
        }
    }

    /// Number of threads this mode will occupy
    pub fn threads(&self) -> usize {
        match self {
            ProcessingMode::Sequential => 1,
            ProcessingMode::Parallel => num_cpus(),
            ProcessingMode::ParallelWith(n) => *n,
        }
    }
}

/// Strategy for index-parallel execution
pub trait ParallelStrategy {
    /// Map a function over indices and collect results in index order
    fn par_map<T, F>(&self, range: Range<usize>, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send;

    /// Like [`par_map`](Self::par_map) for fallible work; the first error
    /// (in index order) is returned.
    fn try_par_map<T, F>(&self, range: Range<usize>, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync + Send,
    {
        self.par_map(range, f)?.into_iter().collect()
    }
}

impl ParallelStrategy for ProcessingMode {
    fn par_map<T, F>(&self, range: Range<usize>, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        match self {
            ProcessingMode::Sequential => Ok(range.map(f).collect()),
            ProcessingMode::Parallel => Ok(range.into_par_iter().map(f).collect()),
            ProcessingMode::ParallelWith(threads) => bounded_map(*threads, range, f),
        }
    }
}

#[cfg(feature = "parallel")]
fn bounded_map<T, F>(threads: usize, range: Range<usize>, f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| Error::invalid_parameter("jobs", threads, e.to_string()))?;
    tracing::debug!(threads, "running on bounded pool");
    Ok(pool.install(|| range.into_par_iter().map(f).collect()))
}

#[cfg(not(feature = "parallel"))]
fn bounded_map<T, F>(_threads: usize, range: Range<usize>, f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    Ok(range.map(f).collect())
}

/// Get the number of available CPU cores
#[cfg(feature = "parallel")]
pub fn num_cpus() -> usize {
    rayon::current_num_threads()
}

/// Get the number of available CPU cores
#[cfg(not(feature = "parallel"))]
pub fn num_cpus() -> usize {
    1
}
