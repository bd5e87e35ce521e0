//! Frame loaders for replaying recorded scans.
//!
//! A replay directory holds one file per sensor rotation. Each file name
//! carries the end-of-rotation timestamp in microseconds (the last run of
//! digits in the stem, e.g. `scan_001693.csv` or `1700000000123456.ply`).
//! Supported formats:
//! - CSV with `x`, `y`, `z` and an optional `intensity` column
//! - ASCII PLY with `x`, `y`, `z` and an optional `intensity` vertex property

use std::collections::{HashMap, VecDeque};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use csv::ReaderBuilder;
use regex::Regex;
use thiserror::Error;

use super::frame::{Frame, Point, RotationClock};

/// Errors that can occur during frame loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Replay directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Unsupported scan file: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Invalid PLY file: {0}")]
    InvalidPly(String),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Column and property names accepted for the reflectivity channel.
const INTENSITY_NAMES: &[&str] = &["intensity", "reflectivity", "i"];

/// On-disk scan format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanFormat {
    Csv,
    Ply,
}

impl ScanFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("csv") {
            Some(ScanFormat::Csv)
        } else if ext.eq_ignore_ascii_case("ply") {
            Some(ScanFormat::Ply)
        } else {
            None
        }
    }
}

/// Anything that can deliver completed frames to the pipeline.
pub trait FrameSource: Send {
    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Load the points of a cartesian CSV scan.
///
/// Column lookup is case-insensitive. A missing intensity column yields
/// zero intensity for every point.
pub fn load_scan_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Point>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let col_map: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.to_lowercase(), i))
        .collect();

    let column = |name: &str| {
        col_map
            .get(name)
            .copied()
            .ok_or_else(|| LoaderError::MissingColumns(format!("{} in {}", name, path.display())))
    };
    let x_idx = column("x")?;
    let y_idx = column("y")?;
    let z_idx = column("z")?;
    let i_idx = INTENSITY_NAMES.iter().find_map(|name| col_map.get(*name).copied());

    let mut points = Vec::with_capacity(10_000);

    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let field = |idx: usize, name: &str| -> Result<f32> {
            let raw = record.get(idx).unwrap_or("");
            raw.parse().map_err(|_| {
                LoaderError::ParseError(format!("row {}: invalid {} value '{}'", row + 1, name, raw))
            })
        };

        let x = field(x_idx, "x")?;
        let y = field(y_idx, "y")?;
        let z = field(z_idx, "z")?;
        let intensity = match i_idx {
            Some(idx) => field(idx, "intensity")?,
            None => 0.0,
        };

        points.push(Point::new(x, y, z, intensity));
    }

    Ok(points)
}

/// Load the points of an ASCII PLY scan.
pub fn load_scan_ply<P: AsRef<Path>>(path: P) -> Result<Vec<Point>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let first_line = lines
        .next()
        .ok_or_else(|| LoaderError::InvalidPly("Empty file".to_string()))??;

    if !first_line.trim().starts_with("ply") {
        return Err(LoaderError::InvalidPly(format!(
            "{} is not a PLY file",
            path.display()
        )));
    }

    let mut num_vertices: Option<usize> = None;
    let mut prop_names: Vec<String> = Vec::new();
    let mut header_done = false;

    for line in &mut lines {
        let line = line?;
        let stripped = line.trim();

        if stripped.starts_with("format") && !stripped.contains("ascii") {
            return Err(LoaderError::InvalidPly(format!(
                "only ASCII PLY is supported, got '{}'",
                stripped
            )));
        } else if stripped.starts_with("element vertex") {
            num_vertices = stripped
                .split_whitespace()
                .last()
                .and_then(|count| count.parse().ok());
        } else if stripped.starts_with("property") {
            if let Some(name) = stripped.split_whitespace().last() {
                prop_names.push(name.to_lowercase());
            }
        } else if stripped == "end_header" {
            header_done = true;
            break;
        }
    }

    let num_vertices = num_vertices
        .ok_or_else(|| LoaderError::InvalidPly("No vertex count in header".to_string()))?;

    if !header_done {
        return Err(LoaderError::InvalidPly("Missing end_header".to_string()));
    }

    let prop_idx: HashMap<&str, usize> = prop_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let property = |name: &str| {
        prop_idx
            .get(name)
            .copied()
            .ok_or_else(|| LoaderError::MissingColumns(name.to_string()))
    };
    let x_idx = property("x")?;
    let y_idx = property("y")?;
    let z_idx = property("z")?;
    let i_idx = INTENSITY_NAMES.iter().find_map(|name| prop_idx.get(name).copied());

    let mut points = Vec::with_capacity(num_vertices);

    for line in lines {
        if points.len() >= num_vertices {
            break;
        }

        let line = line?;
        let values: Vec<&str> = line.split_whitespace().collect();

        if values.len() < prop_names.len() {
            continue;
        }

        let parse = |idx: usize, name: &str| -> Result<f32> {
            values[idx]
                .parse()
                .map_err(|_| LoaderError::ParseError(format!("Invalid {} value: {}", name, values[idx])))
        };

        let intensity = match i_idx {
            Some(idx) => parse(idx, "intensity")?,
            None => 0.0,
        };
        points.push(Point::new(
            parse(x_idx, "x")?,
            parse(y_idx, "y")?,
            parse(z_idx, "z")?,
            intensity,
        ));
    }

    if points.len() < num_vertices {
        return Err(LoaderError::InvalidPly(format!(
            "Expected {} vertices, found {}",
            num_vertices,
            points.len()
        )));
    }

    Ok(points)
}

/// Load a scan in whichever format its extension names.
pub fn load_scan<P: AsRef<Path>>(path: P) -> Result<Vec<Point>> {
    let path = path.as_ref();
    match ScanFormat::from_path(path) {
        Some(ScanFormat::Csv) => load_scan_csv(path),
        Some(ScanFormat::Ply) => load_scan_ply(path),
        None => Err(LoaderError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Extract the end-of-rotation timestamp from a scan file name.
pub fn timestamp_from_name(path: &Path, pattern: &Regex) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    pattern
        .find_iter(stem)
        .last()
        .and_then(|m| m.as_str().parse().ok())
}

/// Replays a directory of recorded scans in timestamp order.
pub struct ReplaySource {
    scans: Vec<(u64, PathBuf)>,
    cursor: usize,
    clock: RotationClock,
}

impl ReplaySource {
    /// Index every CSV/PLY scan in `dir` whose name carries a timestamp.
    pub fn open<P: AsRef<Path>>(dir: P, nominal_period: Duration) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(LoaderError::DirectoryNotFound(dir.to_path_buf()));
        }

        let pattern = Regex::new(r"\d+").map_err(|e| LoaderError::ParseError(e.to_string()))?;

        let mut scans: Vec<(u64, PathBuf)> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if ScanFormat::from_path(&path).is_none() {
                continue;
            }
            match timestamp_from_name(&path, &pattern) {
                Some(ts) => scans.push((ts, path)),
                None => log::warn!("{}: no timestamp in file name, skipping", path.display()),
            }
        }
        scans.sort();

        log::info!("{}: {} scans indexed", dir.display(), scans.len());

        Ok(Self {
            scans,
            cursor: 0,
            clock: RotationClock::new(nominal_period),
        })
    }

    /// Total number of indexed scans.
    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some((end_timestamp, path)) = self.scans.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;

        let points = load_scan(path)?;
        log::debug!("{}: {} points", path.display(), points.len());
        Ok(Some(self.clock.frame(points, *end_timestamp)))
    }
}

/// In-memory source, mostly useful for tests and synthetic runs.
#[derive(Debug, Default)]
pub struct MemorySource {
    frames: VecDeque<Frame>,
}

impl MemorySource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.pop_front())
    }
}
