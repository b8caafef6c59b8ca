//! Line-oriented text records
//!
//! A design point is five comma-separated fields:
//!
//! ```text
//! compute,bram,bramDepth,bandwidth,frequency
//! ```
//!
//! An optimized point appends the chosen configuration and its derived
//! values, fourteen fields in total:
//!
//! ```text
//! ...,frequencyOpt,depthOpt,widthOpt,tileSizeOpt,computeOpt,bramOpt,efficiency,effectiveCompute,perf
//! ```
//!
//! The derived columns are recomputed on load. They still have to parse.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::warn;

use crate::design::{DesignPoint, OptimizedPoint, OptimizedResult};
use crate::error::{Error, Result};

pub const POINT_FIELDS: [&str; 5] = ["compute", "bram", "bramDepth", "bandwidth", "frequency"];

pub const OPTIMIZED_FIELDS: [&str; 14] = [
    "compute",
    "bram",
    "bramDepth",
    "bandwidth",
    "frequency",
    "frequencyOpt",
    "depthOpt",
    "widthOpt",
    "tileSizeOpt",
    "computeOpt",
    "bramOpt",
    "efficiency",
    "effectiveCompute",
    "perf",
];

/// One parsed line
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Point(DesignPoint),
    Optimized(OptimizedPoint),
}

impl Record {
    /// Parse a record; `line` is the 1-based line number used in errors.
    pub fn parse(text: &str, line: usize) -> Result<Record> {
        let fields: Vec<&str> = text.trim().split(',').map(str::trim).collect();
        match fields.len() {
            5 => Ok(Record::Point(parse_point_fields(&fields, line)?)),
            14 => Ok(Record::Optimized(parse_optimized_fields(&fields, line)?)),
            n => Err(Error::Record {
                line,
                reason: format!("expected 5 or 14 fields, found {}", n),
            }),
        }
    }

    pub fn point(&self) -> &DesignPoint {
        match self {
            Record::Point(p) => p,
            Record::Optimized(o) => &o.point,
        }
    }
}

fn field<T: std::str::FromStr>(fields: &[&str], index: usize, names: &[&'static str], line: usize) -> Result<T> {
    fields[index].parse().map_err(|_| Error::Parse {
        line,
        field: names[index],
        value: fields[index].to_string(),
    })
}

fn parse_point_fields(fields: &[&str], line: usize) -> Result<DesignPoint> {
    let names = &POINT_FIELDS;
    Ok(DesignPoint {
        compute_budget: field(fields, 0, names, line)?,
        bram_budget: field(fields, 1, names, line)?,
        bram_block_depth: field(fields, 2, names, line)?,
        bandwidth: field(fields, 3, names, line)?,
        frequency: field(fields, 4, names, line)?,
    })
}

fn parse_optimized_fields(fields: &[&str], line: usize) -> Result<OptimizedPoint> {
    let names = &OPTIMIZED_FIELDS;
    let point = parse_point_fields(fields, line)?;

    let frequency: f64 = field(fields, 5, names, line)?;
    let depth: usize = field(fields, 6, names, line)?;
    let width: usize = field(fields, 7, names, line)?;
    let tile_size: usize = field(fields, 8, names, line)?;
    let compute_used: usize = field(fields, 9, names, line)?;
    let bram_used: usize = field(fields, 10, names, line)?;
    let _efficiency: f64 = field(fields, 11, names, line)?;
    let _effective_compute: f64 = field(fields, 12, names, line)?;
    let _perf: f64 = field(fields, 13, names, line)?;

    let result = if width == 0 || depth == 0 || tile_size == 0 {
        OptimizedResult::INFEASIBLE
    } else {
        OptimizedResult::new(frequency, width, depth, tile_size)
    };
    let optimized = OptimizedPoint::new(point, result);

    if optimized.result.compute_used() != compute_used || optimized.bram_used() != bram_used {
        warn!(
            "line {}: stored usage ({} compute, {} BRAM) disagrees with recomputed ({} compute, {} BRAM)",
            line,
            compute_used,
            bram_used,
            optimized.result.compute_used(),
            optimized.bram_used()
        );
    }

    Ok(optimized)
}

/// Serialize a design point in the five-field order.
pub fn point_record(point: &DesignPoint) -> String {
    format!(
        "{},{},{},{},{}",
        point.compute_budget, point.bram_budget, point.bram_block_depth, point.bandwidth, point.frequency
    )
}

/// Serialize an optimized point in the fourteen-field order.
pub fn optimized_record(opt: &OptimizedPoint) -> String {
    let r = &opt.result;
    format!(
        "{},{},{},{},{},{},{},{},{},{}",
        point_record(&opt.point),
        r.frequency,
        r.depth,
        r.width,
        r.tile_size,
        r.compute_used(),
        opt.bram_used(),
        opt.efficiency(),
        opt.effective_compute(),
        opt.performance_gstencils(),
    )
}

fn is_header(text: &str) -> bool {
    let fields: Vec<&str> = text.trim().split(',').map(str::trim).collect();
    fields == POINT_FIELDS || fields == OPTIMIZED_FIELDS
}

/// Read records from any reader.
///
/// Only a first line naming the columns exactly is skipped as a header;
/// every other line must parse.
pub fn read_records<R: BufRead>(reader: R) -> Result<Vec<Record>> {
    Ok(read_numbered(reader)?.into_iter().map(|(_, record)| record).collect())
}

fn read_numbered<R: BufRead>(reader: R) -> Result<Vec<(usize, Record)>> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if index == 0 && is_header(&line) {
            continue;
        }
        records.push((index + 1, Record::parse(&line, index + 1)?));
    }
    Ok(records)
}

/// Read optimized points only; a five-field design point row is an error.
pub fn read_optimized<R: BufRead>(reader: R) -> Result<Vec<OptimizedPoint>> {
    read_numbered(reader)?
        .into_iter()
        .map(|(line, record)| match record {
            Record::Optimized(opt) => Ok(opt),
            Record::Point(_) => Err(Error::Record {
                line,
                reason: "design point has not been optimized (5 fields, expected 14)".to_string(),
            }),
        })
        .collect()
}

pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let file = File::open(path)?;
    read_records(BufReader::new(file))
}

pub fn load_optimized(path: impl AsRef<Path>) -> Result<Vec<OptimizedPoint>> {
    let file = File::open(path)?;
    read_optimized(BufReader::new(file))
}

/// Write optimized points with a header line.
pub fn write_optimized<W: Write>(mut writer: W, points: &[OptimizedPoint]) -> Result<()> {
    writeln!(writer, "{}", OPTIMIZED_FIELDS.join(","))?;
    for opt in points {
        writeln!(writer, "{}", optimized_record(opt))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn save_optimized(path: impl AsRef<Path>, points: &[OptimizedPoint]) -> Result<()> {
    let file = File::create(path)?;
    write_optimized(BufWriter::new(file), points)
}
