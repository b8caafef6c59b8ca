//! Configuration Optimizer
//!
//! Exhaustive search over vector width, pipeline depth and tile size for
//! each design point. Per-stage memory block counts only depend on depth,
//! tile size and block depth, so they are tabulated once per batch and
//! shared read-only by all workers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info};
use rayon::prelude::*;

use crate::config::OptimizerConfig;
use crate::design::{DesignPoint, OptimizedPoint, OptimizedResult};
use crate::error::{Error, Result};
use crate::resource;

/// Memory blocks per lane, indexed by pipeline depth and tile size
#[derive(Debug, Clone)]
pub struct BramTable {
    block_depth: usize,
    max_depth: usize,
    tile_sizes: Vec<usize>,
    // Row-major, row `d - 1` holds depth `d`.
    blocks: Vec<usize>,
}

impl BramTable {
    /// Tabulate depths `1..=max_depth` for every candidate tile size.
    ///
    /// Fails with an invalid `compute_budget` when the table for
    /// `max_depth` cannot be sized or allocated.
    pub fn build(tile_sizes: &[usize], max_depth: usize, block_depth: usize) -> Result<Self> {
        let columns = tile_sizes.len();
        let too_deep = || {
            Error::invalid_input(
                "compute_budget",
                format!("{} is too large to tabulate {} tile sizes", max_depth, columns),
            )
        };
        let len = max_depth.checked_mul(columns).ok_or_else(too_deep)?;
        let mut blocks = Vec::new();
        blocks.try_reserve_exact(len).map_err(|_| too_deep())?;
        blocks.resize(len, 0);

        // Each extra stage adds its own rounded-up buffer to the previous depth.
        for depth in 1..=max_depth {
            let row = (depth - 1) * columns;
            for (j, &tile_size) in tile_sizes.iter().enumerate() {
                let previous = if depth > 1 { blocks[row - columns + j] } else { 0 };
                blocks[row + j] = previous + (tile_size + 2 * depth - 1).div_ceil(block_depth);
            }
        }

        debug!(
            "built BRAM table: {} depths x {} tile sizes, block depth {}",
            max_depth, columns, block_depth
        );

        Ok(BramTable {
            block_depth,
            max_depth,
            tile_sizes: tile_sizes.to_vec(),
            blocks,
        })
    }

    pub fn block_depth(&self) -> usize {
        self.block_depth
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn tile_sizes(&self) -> &[usize] {
        &self.tile_sizes
    }

    /// Blocks per lane for each tile size at `depth` (1-based).
    pub fn row(&self, depth: usize) -> &[usize] {
        let columns = self.tile_sizes.len();
        let start = (depth - 1) * columns;
        &self.blocks[start..start + columns]
    }

    /// Check that the table can answer every lookup for `point`.
    pub fn check(&self, point: &DesignPoint) -> Result<()> {
        if point.bram_block_depth != self.block_depth {
            return Err(Error::TableMismatch(format!(
                "table built for block depth {}, point uses {}",
                self.block_depth, point.bram_block_depth
            )));
        }
        if point.compute_budget > self.max_depth {
            return Err(Error::TableMismatch(format!(
                "table covers depth up to {}, point allows {}",
                self.max_depth, point.compute_budget
            )));
        }
        Ok(())
    }
}

/// One [`BramTable`] per distinct block depth in a batch
#[derive(Debug, Clone, Default)]
pub struct BramTables {
    tables: BTreeMap<usize, BramTable>,
}

impl BramTables {
    /// Size every table for the largest compute budget in the batch.
    pub fn build(points: &[DesignPoint], tile_sizes: &[usize]) -> Result<Self> {
        let max_depth = points.iter().map(|p| p.compute_budget).max().unwrap_or(0);
        let mut tables = BTreeMap::new();
        for point in points {
            if !tables.contains_key(&point.bram_block_depth) {
                let table = BramTable::build(tile_sizes, max_depth, point.bram_block_depth)?;
                tables.insert(point.bram_block_depth, table);
            }
        }
        Ok(BramTables { tables })
    }

    pub fn get(&self, block_depth: usize) -> Option<&BramTable> {
        self.tables.get(&block_depth)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Double-buffered requirement of `width` lanes against the budget.
/// A requirement too large to represent never fits.
fn fits_budget(width: usize, blocks: usize, budget: usize) -> bool {
    width
        .checked_mul(blocks)
        .and_then(|per_copy| per_copy.checked_mul(2))
        .is_some_and(|required| required <= budget)
}

/// Throughput-maximizing configuration search
#[derive(Debug, Clone)]
pub struct Optimizer {
    config: OptimizerConfig,
    tile_sizes: Vec<usize>,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Result<Self> {
        config.validate()?;
        let tile_sizes = config.tile_sizes.candidates();
        Ok(Optimizer { config, tile_sizes })
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn tile_sizes(&self) -> &[usize] {
        &self.tile_sizes
    }

    /// Optimize a single point with its own lookup table.
    pub fn optimize(&self, point: &DesignPoint) -> Result<OptimizedPoint> {
        point.validate()?;
        let table = BramTable::build(&self.tile_sizes, point.compute_budget, point.bram_block_depth)?;
        let result = self.optimize_point(point, &table)?;
        Ok(OptimizedPoint::new(*point, result))
    }

    /// Search every (width, depth, tile size) that fits the budgets of `point`.
    ///
    /// Widths run from 1 to the bandwidth limit and, for each width, the
    /// compute used runs from `width` to the budget with
    /// `depth = compute_used / width`. Tile sizes over the BRAM budget are
    /// dropped before taking the maximum. Only a strictly higher throughput
    /// replaces the current best, so ties go to the lower width, then the
    /// lower compute usage, then the smaller tile size.
    ///
    /// Returns [`OptimizedResult::INFEASIBLE`] when nothing fits.
    pub fn optimize_point(&self, point: &DesignPoint, table: &BramTable) -> Result<OptimizedResult> {
        point.validate()?;
        table.check(point)?;
        if table.tile_sizes() != self.tile_sizes.as_slice() {
            return Err(Error::TableMismatch("table built for different tile sizes".to_string()));
        }

        let frequency = point.frequency;
        let width_max = point.width_max(self.config.bytes_per_element);
        let mut best = OptimizedResult::INFEASIBLE;

        for width in 1..=width_max.min(point.compute_budget) {
            let mut last_depth = 0;
            for compute_used in width..=point.compute_budget {
                let depth = compute_used / width;
                // Same depth as the previous step: identical candidates.
                if depth == last_depth {
                    continue;
                }
                last_depth = depth;

                let candidate = table
                    .row(depth)
                    .iter()
                    .zip(&self.tile_sizes)
                    .filter(|&(&blocks, _)| fits_budget(width, blocks, point.bram_budget))
                    .map(|(_, &tile_size)| {
                        (tile_size, resource::effective_throughput(frequency, width, depth, tile_size))
                    })
                    .fold(None, |acc: Option<(usize, f64)>, (tile_size, throughput)| match acc {
                        Some((_, top)) if top >= throughput => acc,
                        _ => Some((tile_size, throughput)),
                    });

                // Requirements never shrink with depth, so deeper pipelines
                // for this width cannot fit either.
                let Some((tile_size, throughput)) = candidate else {
                    break;
                };
                debug_assert!(throughput > 0.0, "feasible configuration with zero throughput");

                if throughput > best.throughput {
                    best = OptimizedResult {
                        frequency,
                        width,
                        depth,
                        tile_size,
                        throughput,
                    };
                }
            }
        }

        debug!(
            "point {:?}: width {}/{}, depth {}, tile {}, throughput {:.3}",
            point, best.width, width_max, best.depth, best.tile_size, best.throughput
        );
        Ok(best)
    }

    /// Optimize a batch in parallel, results in input order.
    pub fn optimize_batch(&self, points: &[DesignPoint]) -> Result<Vec<OptimizedPoint>> {
        self.optimize_batch_with_progress(points, |_, _| {})
    }

    /// Optimize a batch, reporting `(completed, total)` after each point.
    ///
    /// Every point is validated before any work starts. An error in any
    /// point fails the whole batch.
    pub fn optimize_batch_with_progress<F>(&self, points: &[DesignPoint], callback: F) -> Result<Vec<OptimizedPoint>>
    where
        F: Fn(usize, usize) + Sync,
    {
        for point in points {
            point.validate()?;
        }
        if points.is_empty() {
            return Ok(Vec::new());
        }

        let tables = BramTables::build(points, &self.tile_sizes)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()
            .map_err(|e| Error::Pool(e.to_string()))?;

        info!(
            "optimizing {} design points on {} workers ({} lookup tables)",
            points.len(),
            self.config.workers,
            tables.len()
        );

        let total = points.len();
        let counter = AtomicUsize::new(0);
        let tables = &tables;

        pool.install(|| {
            points
                .par_iter()
                .map(|point| -> Result<OptimizedPoint> {
                    let table = tables.get(point.bram_block_depth).ok_or_else(|| {
                        Error::TableMismatch(format!("no table for block depth {}", point.bram_block_depth))
                    })?;
                    let result = self.optimize_point(point, table)?;
                    let count = counter.fetch_add(1, Ordering::SeqCst);
                    callback(count + 1, total);
                    Ok(OptimizedPoint::new(*point, result))
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Board;
    use crate::resource::{bram_requirement, effective_throughput, required_memory_blocks};

    fn optimizer() -> Optimizer {
        Optimizer::new(OptimizerConfig::default()).unwrap()
    }

    /// Direct scan without the table, depth skipping or early exit.
    fn brute_force(point: &DesignPoint, tile_sizes: &[usize], bytes_per_element: usize) -> OptimizedResult {
        let mut best = OptimizedResult::INFEASIBLE;
        for width in 1..=point.width_max(bytes_per_element) {
            for compute_used in width..=point.compute_budget {
                let depth = compute_used / width;
                for &tile_size in tile_sizes {
                    if bram_requirement(width, depth, tile_size, point.bram_block_depth) > point.bram_budget {
                        continue;
                    }
                    let throughput = effective_throughput(point.frequency, width, depth, tile_size);
                    if throughput > best.throughput {
                        best = OptimizedResult {
                            frequency: point.frequency,
                            width,
                            depth,
                            tile_size,
                            throughput,
                        };
                    }
                }
            }
        }
        best
    }

    fn assert_feasible(opt: &OptimizedPoint, bytes_per_element: usize) {
        let p = &opt.point;
        let r = &opt.result;
        if !r.is_feasible() {
            assert_eq!(*r, OptimizedResult::INFEASIBLE);
            return;
        }
        assert!(bram_requirement(r.width, r.depth, r.tile_size, p.bram_block_depth) <= p.bram_budget);
        assert!(r.width * r.depth <= p.compute_budget);
        assert!(r.width <= p.width_max(bytes_per_element));
        assert!(r.throughput > 0.0);
    }

    #[test]
    fn test_table_matches_resource_model() {
        let tiles: Vec<usize> = (32..=2048).step_by(32).collect();
        let table = BramTable::build(&tiles, 40, 512).unwrap();
        for depth in 1..=40 {
            for (j, &tile_size) in tiles.iter().enumerate() {
                assert_eq!(table.row(depth)[j], required_memory_blocks(tile_size, depth, 512));
            }
        }

        let table = BramTable::build(&tiles, 5, 64).unwrap();
        assert_eq!(table.row(5)[3], required_memory_blocks(128, 5, 64));
    }

    #[test]
    fn test_table_check() {
        let opt = optimizer();
        let table = BramTable::build(opt.tile_sizes(), 16, 512).unwrap();
        let point = DesignPoint::new(16, 100, 512, 10.66, 200.0);
        assert!(table.check(&point).is_ok());

        let deeper = DesignPoint::new(17, 100, 512, 10.66, 200.0);
        assert!(matches!(opt.optimize_point(&deeper, &table), Err(Error::TableMismatch(_))));

        let other_blocks = DesignPoint::new(16, 100, 1024, 10.66, 200.0);
        assert!(matches!(opt.optimize_point(&other_blocks, &table), Err(Error::TableMismatch(_))));
    }

    #[test]
    fn test_huge_compute_budget_is_rejected() {
        let opt = optimizer();
        let point = DesignPoint::new(usize::MAX / 8, 1470, 512, 10.66, 200.0);
        assert!(matches!(
            opt.optimize(&point),
            Err(Error::InvalidInput { field: "compute_budget", .. })
        ));
        assert!(matches!(
            opt.optimize_batch(&[point]),
            Err(Error::InvalidInput { field: "compute_budget", .. })
        ));
    }

    #[test]
    fn test_budget_check_does_not_overflow() {
        assert!(fits_budget(2, 3, 12));
        assert!(!fits_budget(2, 3, 11));
        assert!(!fits_budget(usize::MAX / 2, 3, usize::MAX));
        assert!(!fits_budget(usize::MAX / 2 + 1, 1, usize::MAX));
    }

    #[test]
    fn test_scenario_bandwidth_and_compute_limits() {
        let opt = optimizer();
        let point = DesignPoint::new(8, 1_000_000, 512, 10.66, 200.0);
        assert_eq!(point.width_max(4), 13);

        let result = opt.optimize(&point).unwrap().result;
        assert!(result.width * result.depth <= 8);
        // Shallow and wide wins: fewer stages lose less to fill and drain.
        assert_eq!((result.width, result.depth, result.tile_size), (8, 1, 2048));
        assert_eq!(result, brute_force(&point, opt.tile_sizes(), 4));
    }

    #[test]
    fn test_scenario_bram_too_small() {
        let opt = optimizer();
        let point = DesignPoint::new(450, 1, 512, 10.66, 200.0);
        let optimized = opt.optimize(&point).unwrap();
        assert_eq!(optimized.result, OptimizedResult::INFEASIBLE);
        assert_eq!(optimized.bram_used(), 0);
    }

    #[test]
    fn test_bandwidth_too_small_is_infeasible() {
        let opt = optimizer();
        // 0.5 GB/s cannot feed a single 4-byte lane at 200 MHz.
        let point = DesignPoint::new(450, 1470, 512, 0.5, 200.0);
        assert_eq!(point.width_max(4), 0);
        assert_eq!(opt.optimize(&point).unwrap().result, OptimizedResult::INFEASIBLE);
    }

    #[test]
    fn test_scenario_frequency_scaling() {
        let opt = optimizer();
        let fast_point = DesignPoint::new(450, 1470, 512, 10.66, 200.0);
        let slow = opt.optimize(&DesignPoint::new(450, 1470, 512, 10.66, 100.0)).unwrap().result;
        let fast = opt.optimize(&fast_point).unwrap().result;
        assert!(slow.is_feasible() && fast.is_feasible());

        let same = (slow.width, slow.depth, slow.tile_size) == (fast.width, fast.depth, fast.tile_size);
        if same {
            assert_eq!(fast.throughput, 2.0 * slow.throughput);
        } else if slow.width <= fast_point.width_max(4) {
            // The old choice is still in the search space at 200 MHz.
            let old_at_new = effective_throughput(200.0, slow.width, slow.depth, slow.tile_size);
            assert!(fast.throughput >= old_at_new);
        }
    }

    #[test]
    fn test_matches_brute_force() {
        let opt = optimizer();
        let tiles = opt.tile_sizes().to_vec();
        for compute in [1, 3, 8, 24, 61] {
            for bram in [2, 6, 10, 40, 200, 1470] {
                for (bandwidth, frequency) in [(10.66, 200.0), (3.2, 100.0), (1.0, 250.0)] {
                    for block_depth in [256, 512] {
                        let point = DesignPoint::new(compute, bram, block_depth, bandwidth, frequency);
                        let optimized = opt.optimize(&point).unwrap();
                        assert_eq!(optimized.result, brute_force(&point, &tiles, 4), "{:?}", point);
                        assert_feasible(&optimized, 4);
                    }
                }
            }
        }
    }

    #[test]
    fn test_no_feasible_triple_beats_result() {
        let opt = optimizer();
        let point = DesignPoint::new(40, 64, 512, 10.66, 200.0);
        let best = opt.optimize(&point).unwrap().result;
        assert!(best.is_feasible());

        for width in 1..=point.width_max(4) {
            for depth in 1..=point.compute_budget / width {
                for &tile_size in opt.tile_sizes() {
                    if bram_requirement(width, depth, tile_size, 512) <= point.bram_budget {
                        let throughput = effective_throughput(point.frequency, width, depth, tile_size);
                        assert!(throughput > 0.0);
                        assert!(throughput <= best.throughput);
                    }
                }
            }
        }
    }

    #[test]
    fn test_optimization_is_deterministic() {
        let opt = optimizer();
        let point = Board::find("ku115").unwrap().design_point(512);
        let first = opt.optimize(&point).unwrap();
        let second = opt.optimize(&point).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.result.throughput.to_bits(), second.result.throughput.to_bits());
    }

    #[test]
    fn test_invalid_point_rejected() {
        let opt = optimizer();
        let point = DesignPoint::new(450, 1470, 512, 0.0, 200.0);
        assert!(matches!(opt.optimize(&point), Err(Error::InvalidInput { .. })));
    }

    #[test]
    fn test_batch_preserves_order_and_matches_single() {
        let opt = optimizer();
        let points: Vec<DesignPoint> = Board::presets().iter().map(|b| b.design_point(512)).collect();
        let batch = opt.optimize_batch(&points).unwrap();

        assert_eq!(batch.len(), points.len());
        for (optimized, point) in batch.iter().zip(&points) {
            assert_eq!(optimized.point, *point);
            assert_eq!(*optimized, opt.optimize(point).unwrap());
            assert_feasible(optimized, 4);
        }
    }

    #[test]
    fn test_batch_worker_count_does_not_change_results() {
        let points: Vec<DesignPoint> = (1..=40)
            .map(|i| DesignPoint::new(i * 5, 20 + i * 7, 512, 10.66, 200.0))
            .collect();

        let serial = Optimizer::new(OptimizerConfig {
            workers: 1,
            ..Default::default()
        })
        .unwrap();
        let parallel = Optimizer::new(OptimizerConfig {
            workers: 4,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(serial.optimize_batch(&points).unwrap(), parallel.optimize_batch(&points).unwrap());
    }

    #[test]
    fn test_batch_with_mixed_block_depths() {
        let opt = optimizer();
        let points = vec![
            DesignPoint::new(64, 300, 512, 10.66, 200.0),
            DesignPoint::new(32, 300, 1024, 10.66, 200.0),
            DesignPoint::new(16, 1, 512, 10.66, 200.0),
        ];
        assert_eq!(BramTables::build(&points, opt.tile_sizes()).unwrap().len(), 2);

        let batch = opt.optimize_batch(&points).unwrap();
        for (optimized, point) in batch.iter().zip(&points) {
            assert_eq!(optimized.result, brute_force(point, opt.tile_sizes(), 4));
        }
        assert_eq!(batch[2].result, OptimizedResult::INFEASIBLE);
    }

    #[test]
    fn test_batch_rejects_invalid_point() {
        let opt = optimizer();
        let points = vec![
            DesignPoint::new(64, 300, 512, 10.66, 200.0),
            DesignPoint::new(0, 300, 512, 10.66, 200.0),
        ];
        assert!(matches!(
            opt.optimize_batch(&points),
            Err(Error::InvalidInput { field: "compute_budget", .. })
        ));
    }

    #[test]
    fn test_batch_progress() {
        let opt = optimizer();
        let points = vec![DesignPoint::new(32, 500, 512, 10.66, 200.0); 10];
        let calls = AtomicUsize::new(0);
        let results = opt
            .optimize_batch_with_progress(&points, |done, total| {
                assert!(done <= total);
                assert_eq!(total, 10);
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(results.len(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert!(opt.optimize_batch(&[]).unwrap().is_empty());
    }
}
