//! # SDB Parallel
//!
//! Execution strategies for the regression backends.
//!
//! A [`ProcessingMode`] is chosen from the user's worker count and decides
//! whether index-parallel work runs sequentially, on the global rayon pool,
//! or on a pool bounded to a fixed number of threads. Without the `parallel`
//! feature every mode runs sequentially.

mod maybe_rayon;
pub mod strategy;

pub use strategy::{num_cpus, ParallelStrategy, ProcessingMode};
