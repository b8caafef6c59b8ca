//! Optimizer Configuration
//!
//! Batch-wide search parameters, parameter ranges for generating design
//! points, and the target boards the accelerator has been built for.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::design::DesignPoint;
use crate::error::{Error, Result};

/// Search parameters shared by every point in a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Candidate tile sizes
    pub tile_sizes: TileSizes,
    /// Bytes per element of the data type (4 = single precision)
    pub bytes_per_element: usize,
    /// Worker threads used for a batch
    pub workers: usize,
}

/// Inclusive arithmetic sequence of tile sizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileSizes {
    pub start: usize,
    pub stop: usize,
    pub step: usize,
}

impl Default for TileSizes {
    fn default() -> Self {
        TileSizes {
            start: 32,
            stop: 2048,
            step: 32,
        }
    }
}

impl TileSizes {
    /// Ascending candidate list
    pub fn candidates(&self) -> Vec<usize> {
        if self.step == 0 {
            return Vec::new();
        }
        (self.start..=self.stop).step_by(self.step).collect()
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            tile_sizes: TileSizes::default(),
            bytes_per_element: 4, // float
            workers: 4,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tile_sizes.start == 0 {
            return Err(Error::invalid_input("tile_sizes.start", "must be positive"));
        }
        if self.tile_sizes.step == 0 {
            return Err(Error::invalid_input("tile_sizes.step", "must be positive"));
        }
        if self.tile_sizes.stop < self.tile_sizes.start {
            return Err(Error::invalid_input(
                "tile_sizes.stop",
                format!("{} is below start {}", self.tile_sizes.stop, self.tile_sizes.start),
            ));
        }
        if self.bytes_per_element == 0 {
            return Err(Error::invalid_input("bytes_per_element", "must be positive"));
        }
        if self.workers == 0 {
            return Err(Error::invalid_input("workers", "must be positive"));
        }
        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &str) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Load configuration from TOML file
    pub fn load(path: &str) -> Result<Self> {
        let toml_str = std::fs::read_to_string(path)?;
        let config: OptimizerConfig = toml::from_str(&toml_str).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Numeric types a [`ParameterRange`] can sweep
pub trait RangeValue: Copy + PartialOrd + FromStr + Display {
    fn is_positive(&self) -> bool;
    /// Half-open sequence `start, start + step, ... < stop`
    fn arange(start: Self, stop: Self, step: Self) -> Vec<Self>;
}

impl RangeValue for usize {
    fn is_positive(&self) -> bool {
        *self > 0
    }

    fn arange(start: Self, stop: Self, step: Self) -> Vec<Self> {
        (start..stop).step_by(step).collect()
    }
}

impl RangeValue for f64 {
    fn is_positive(&self) -> bool {
        *self > 0.0
    }

    fn arange(start: Self, stop: Self, step: Self) -> Vec<Self> {
        let count = ((stop - start) / step).ceil();
        if !count.is_finite() || count <= 0.0 {
            return Vec::new();
        }
        (0..count as usize).map(|i| start + i as f64 * step).collect()
    }
}

/// A single value or a `start,stop,step` sweep (stop excluded)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterRange<T> {
    Single(T),
    Stepped { start: T, stop: T, step: T },
}

impl<T: RangeValue> ParameterRange<T> {
    pub fn values(&self) -> Vec<T> {
        match *self {
            ParameterRange::Single(v) => vec![v],
            ParameterRange::Stepped { start, stop, step } => T::arange(start, stop, step),
        }
    }

    pub fn max(&self) -> Option<T> {
        self.values()
            .into_iter()
            .fold(None, |acc, v| match acc {
                Some(m) if m >= v => Some(m),
                _ => Some(v),
            })
    }
}

fn parse_value<T: FromStr>(text: &str) -> Result<T> {
    text.trim()
        .parse()
        .map_err(|_| Error::invalid_input("range", format!("cannot parse '{}'", text.trim())))
}

impl<T: RangeValue> FromStr for ParameterRange<T> {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if !s.contains(',') {
            return Ok(ParameterRange::Single(parse_value(s)?));
        }

        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 3 {
            return Err(Error::invalid_input(
                "range",
                format!("expected start,stop,step but got '{}'", s),
            ));
        }
        let start = parse_value(parts[0])?;
        let stop = parse_value(parts[1])?;
        let step: T = parse_value(parts[2])?;
        if !step.is_positive() {
            return Err(Error::invalid_input("range", format!("step must be positive, got {}", step)));
        }

        let range = ParameterRange::Stepped { start, stop, step };
        if range.values().is_empty() {
            return Err(Error::invalid_input("range", format!("'{}' contains no values", s)));
        }
        Ok(range)
    }
}

/// Parameter ranges spanning a batch of design points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignSpace {
    pub frequencies: Vec<f64>,
    pub bandwidths: Vec<f64>,
    pub computes: Vec<usize>,
    pub brams: Vec<usize>,
    pub bram_depth: usize,
}

impl Default for DesignSpace {
    fn default() -> Self {
        DesignSpace {
            frequencies: vec![200.0],
            bandwidths: vec![10.66, 17.06, 120.0],
            computes: (100..=1200).step_by(100).collect(),
            brams: vec![1470, 2160, 4033],
            bram_depth: 512,
        }
    }
}

impl DesignSpace {
    pub fn from_ranges(
        frequencies: &ParameterRange<f64>,
        bandwidths: &ParameterRange<f64>,
        computes: &ParameterRange<usize>,
        brams: &ParameterRange<usize>,
        bram_depth: usize,
    ) -> Self {
        DesignSpace {
            frequencies: frequencies.values(),
            bandwidths: bandwidths.values(),
            computes: computes.values(),
            brams: brams.values(),
            bram_depth,
        }
    }

    /// Generate all design points, frequency outermost and BRAM innermost
    pub fn enumerate(&self) -> Vec<DesignPoint> {
        let mut points = Vec::new();

        for &frequency in &self.frequencies {
            for &bandwidth in &self.bandwidths {
                for &compute in &self.computes {
                    for &bram in &self.brams {
                        points.push(DesignPoint::new(compute, bram, self.bram_depth, bandwidth, frequency));
                    }
                }
            }
        }

        points
    }
}

/// A target FPGA board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub name: String,
    /// Achievable kernel clock (MHz)
    pub frequency: f64,
    /// Off-chip bandwidth (GB/s)
    pub bandwidth: f64,
    /// DSP-equivalent compute units
    pub compute: usize,
    /// BRAM blocks
    pub bram: usize,
}

impl Board {
    fn preset(name: &str, frequency: f64, bandwidth: f64, compute: usize, bram: usize) -> Self {
        Board {
            name: name.to_string(),
            frequency,
            bandwidth,
            compute,
            bram,
        }
    }

    /// Known boards
    pub fn presets() -> Vec<Board> {
        vec![
            Board::preset("7v3", 200.0, 10.66, 450, 1470),
            Board::preset("ku115", 200.0, 17.06, 690, 2160),
            Board::preset("vu37p", 200.0, 120.0, 1215, 4033),
            Board::preset("vu115p", 250.0, 19.2, 1488, 2688),
            Board::preset("stratix10", 800.0, 256.0, 1440, 11271),
        ]
    }

    pub fn find(name: &str) -> Option<Board> {
        Self::presets()
            .into_iter()
            .find(|b| b.name.eq_ignore_ascii_case(name))
    }

    pub fn design_point(&self, bram_depth: usize) -> DesignPoint {
        DesignPoint::new(self.compute, self.bram, bram_depth, self.bandwidth, self.frequency)
    }
}
