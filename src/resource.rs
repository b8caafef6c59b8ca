//! Resource Model
//!
//! Closed-form cost and performance model of the stencil pipeline. A
//! pipeline of `depth` stages buffers a tile per stage; stage `s` needs
//! room for `tile_size + 2*s - 1` elements because the halo grows by one
//! element on each side per stage. Buffers are double-buffered and
//! replicated per vector lane.
//!
//! Everything here is pure and safe to call from any worker.

/// Conversion from GB/s over MHz to bytes per cycle.
const GBPS_PER_MHZ: f64 = 1e-3;

/// Memory blocks needed to buffer one lane of a `depth`-stage pipeline.
///
/// Block counts are rounded up per stage, never down. Panics if
/// `block_depth` is zero.
pub fn required_memory_blocks(tile_size: usize, depth: usize, block_depth: usize) -> usize {
    (1..=depth)
        .map(|stage| (tile_size + 2 * stage - 1).div_ceil(block_depth))
        .sum()
}

/// Total memory blocks for `width` double-buffered lanes.
pub fn bram_requirement(width: usize, depth: usize, tile_size: usize, block_depth: usize) -> usize {
    2 * width * required_memory_blocks(tile_size, depth, block_depth)
}

/// Fraction of cycles spent on useful work rather than pipeline fill and drain.
pub fn pipeline_efficiency(tile_size: usize, depth: usize) -> f64 {
    tile_size as f64 / (tile_size as f64 + 2.0 * depth as f64)
}

/// Effective throughput in stencil updates per microsecond (frequency in MHz).
pub fn effective_throughput(frequency: f64, width: usize, depth: usize, tile_size: usize) -> f64 {
    frequency * depth as f64 * width as f64 * pipeline_efficiency(tile_size, depth)
}

/// Widest vector the memory interface can feed every cycle.
///
/// `bandwidth` in GB/s, `frequency` in MHz. Rounded down.
pub fn max_width(bandwidth: f64, frequency: f64, bytes_per_element: usize) -> usize {
    let bytes_per_cycle = bytes_per_element as f64 * GBPS_PER_MHZ * frequency;
    let width = (bandwidth / bytes_per_cycle).floor();
    if width.is_finite() && width > 0.0 {
        width as usize
    } else {
        0
    }
}
