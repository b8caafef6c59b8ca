//! Stencil Accelerator Design Space Optimizer
//!
//! Finds, for a given clock frequency, memory bandwidth, compute budget and
//! on-chip memory (BRAM) budget, the pipeline depth, vector width and tile
//! size of a streaming stencil accelerator that maximize effective
//! throughput without running out of memory blocks.
//!
//! # Model
//!
//! The accelerator is a chain of `depth` pipelined stencil stages, each
//! `width` lanes wide. Every stage buffers a tile plus a halo that grows by
//! two elements per stage, double-buffered per lane. Longer pipelines pay a
//! fill and drain overhead of `2 * depth` cycles per tile, so the useful
//! fraction of cycles is `tile / (tile + 2 * depth)`.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use stencil_dse::prelude::*;
//!
//! // 450 DSPs, 1470 BRAM blocks of 512 elements, 10.66 GB/s at 200 MHz
//! let point = DesignPoint::new(450, 1470, 512, 10.66, 200.0);
//!
//! let optimizer = Optimizer::new(OptimizerConfig::default()).unwrap();
//! let optimized = optimizer.optimize(&point).unwrap();
//! println!("{}", optimized.report(4));
//! ```
//!
//! # Batches
//!
//! ```rust,no_run
//! use stencil_dse::prelude::*;
//!
//! let space = DesignSpace {
//!     frequencies: vec![200.0],
//!     bandwidths: vec![10.66, 17.06],
//!     computes: vec![100, 200, 400, 800],
//!     brams: vec![1470, 2160],
//!     bram_depth: 512,
//! };
//!
//! let optimizer = Optimizer::new(OptimizerConfig::default()).unwrap();
//! let results = optimizer.optimize_batch(&space.enumerate()).unwrap();
//! ```

pub mod config;
pub mod design;
pub mod error;
pub mod optimizer;
pub mod record;
pub mod resource;

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::config::{Board, DesignSpace, OptimizerConfig, ParameterRange, TileSizes};
    pub use crate::design::{DesignPoint, OptimizedPoint, OptimizedResult};
    pub use crate::error::{Error, Result};
    pub use crate::optimizer::{BramTable, BramTables, Optimizer};
    pub use crate::record::Record;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Optimize a batch with the default configuration.
pub fn optimize_all(points: &[design::DesignPoint]) -> error::Result<Vec<design::OptimizedPoint>> {
    optimizer::Optimizer::new(config::OptimizerConfig::default())?.optimize_batch(points)
}
