//! Design points and optimization results
//!
//! A [`DesignPoint`] is one hardware target: the budgets the accelerator
//! must fit in. Optimizing it yields an [`OptimizedResult`], and the pair
//! travels together as an [`OptimizedPoint`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::resource;

/// One hardware target to optimize for
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DesignPoint {
    /// Parallel compute lanes available (DSP-equivalent units)
    pub compute_budget: usize,
    /// On-chip memory blocks available
    pub bram_budget: usize,
    /// Elements stored per memory block
    pub bram_block_depth: usize,
    /// Memory bandwidth in GB/s
    pub bandwidth: f64,
    /// Clock frequency in MHz
    pub frequency: f64,
}

impl DesignPoint {
    pub fn new(
        compute_budget: usize,
        bram_budget: usize,
        bram_block_depth: usize,
        bandwidth: f64,
        frequency: f64,
    ) -> Self {
        DesignPoint {
            compute_budget,
            bram_budget,
            bram_block_depth,
            bandwidth,
            frequency,
        }
    }

    /// Reject points with any non-positive field before searching.
    pub fn validate(&self) -> Result<()> {
        let counts = [
            ("compute_budget", self.compute_budget),
            ("bram_budget", self.bram_budget),
            ("bram_block_depth", self.bram_block_depth),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(Error::invalid_input(field, "must be positive, got 0"));
            }
        }

        let rates = [("bandwidth", self.bandwidth), ("frequency", self.frequency)];
        for (field, value) in rates {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::invalid_input(
                    field,
                    format!("must be a positive finite number, got {}", value),
                ));
            }
        }

        Ok(())
    }

    /// Widest vector the bandwidth can feed at this point's frequency.
    pub fn width_max(&self, bytes_per_element: usize) -> usize {
        resource::max_width(self.bandwidth, self.frequency, bytes_per_element)
    }
}

/// The configuration chosen for one design point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizedResult {
    /// Frequency the configuration was chosen at (MHz)
    pub frequency: f64,
    /// Vector width
    pub width: usize,
    /// Pipeline depth
    pub depth: usize,
    /// Tile size
    pub tile_size: usize,
    /// Effective throughput
    pub throughput: f64,
}

impl OptimizedResult {
    /// Result for a point where no configuration fits.
    pub const INFEASIBLE: OptimizedResult = OptimizedResult {
        frequency: 0.0,
        width: 0,
        depth: 0,
        tile_size: 0,
        throughput: 0.0,
    };

    /// Build a result, computing its throughput from the resource model.
    pub fn new(frequency: f64, width: usize, depth: usize, tile_size: usize) -> Self {
        OptimizedResult {
            frequency,
            width,
            depth,
            tile_size,
            throughput: resource::effective_throughput(frequency, width, depth, tile_size),
        }
    }

    pub fn is_feasible(&self) -> bool {
        self.width > 0 && self.depth > 0 && self.tile_size > 0
    }

    /// Compute lanes occupied (`width * depth`)
    pub fn compute_used(&self) -> usize {
        self.width * self.depth
    }

    /// Pipeline efficiency of the chosen configuration, zero when infeasible.
    pub fn efficiency(&self) -> f64 {
        if self.is_feasible() {
            resource::pipeline_efficiency(self.tile_size, self.depth)
        } else {
            0.0
        }
    }
}

/// A design point together with its optimized configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizedPoint {
    pub point: DesignPoint,
    pub result: OptimizedResult,
}

impl OptimizedPoint {
    pub fn new(point: DesignPoint, result: OptimizedResult) -> Self {
        OptimizedPoint { point, result }
    }

    /// Memory blocks consumed by the chosen configuration
    pub fn bram_used(&self) -> usize {
        if !self.result.is_feasible() {
            return 0;
        }
        resource::bram_requirement(
            self.result.width,
            self.result.depth,
            self.result.tile_size,
            self.point.bram_block_depth,
        )
    }

    pub fn efficiency(&self) -> f64 {
        self.result.efficiency()
    }

    /// Compute lanes doing useful work after pipeline overhead
    pub fn effective_compute(&self) -> f64 {
        self.efficiency() * self.result.compute_used() as f64
    }

    /// Throughput in GStencil/s
    pub fn performance_gstencils(&self) -> f64 {
        self.effective_compute() * 1e-3 * self.result.frequency
    }

    /// Arithmetic throughput in GOp/s, four operations per stencil update
    pub fn performance_gops(&self) -> f64 {
        self.performance_gstencils() * 4.0
    }

    /// Human-readable breakdown of the chosen configuration
    pub fn report(&self, bytes_per_element: usize) -> String {
        let p = &self.point;
        let r = &self.result;
        format!(
            r#"
OPTIMIZED CONFIGURATION
═══════════════════════

  • Frequency:      {} / {} MHz
  • Vector width:   {} / {}
  • Compute used:   {} / {}
  • Pipeline depth: {}
  • Tile size:      {}
  • BRAM used:      {} / {} (blocks of {})
  • Efficiency:     {:.4}
  • Throughput:     {:.4} GStencil/s
  • Performance:    {:.4} GOp/s
"#,
            r.frequency,
            p.frequency,
            r.width,
            p.width_max(bytes_per_element),
            r.compute_used(),
            p.compute_budget,
            r.depth,
            r.tile_size,
            self.bram_used(),
            p.bram_budget,
            p.bram_block_depth,
            self.efficiency(),
            self.performance_gstencils(),
            self.performance_gops(),
        )
    }
}
