//! Batch driver for consensus clique selection
//!
//! Discovers units in an input directory, runs each through the
//! [`consensus_ilp`] pipeline on a bounded worker pool and persists the
//! results next to the inputs.

pub mod batch;
pub mod config;
pub mod output;
pub mod units;

pub use batch::{run_batch, BatchOptions};
pub use config::{ConfigOverrides, EnvConfig, FileConfig, RunConfig};
