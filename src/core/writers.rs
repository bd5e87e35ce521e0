//! Data writers for measurement export and object clouds.
//!
//! This module provides:
//! - the measurement export: one `x;y;corrected_time;` row per occupied slot,
//!   no header, frames appended one after another
//! - ASCII PLY dumps of object points with an intensity property, readable
//!   back by the replay loader

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use super::frame::Point;
use crate::pipeline::table::{History, MeasurementTable};

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// Streaming writer for the measurement export format.
pub struct MeasurementWriter<W: Write> {
    csv: csv::Writer<W>,
    path: String,
    rows: u64,
}

impl MeasurementWriter<BufWriter<File>> {
    /// Open `path` for export, truncating it unless `append` is set.
    pub fn create(path: &Path, append: bool) -> Result<Self> {
        ensure_parent_dirs(path)?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .map_err(|e| WriteError::CreateFile {
                path: path.display().to_string(),
                source: e,
            })?;
        Ok(Self::from_writer(BufWriter::new(file), path.display().to_string()))
    }
}

impl<W: Write> MeasurementWriter<W> {
    /// Wrap an arbitrary writer; `label` names it in error messages.
    pub fn from_writer(writer: W, label: String) -> Self {
        let csv = csv::WriterBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .flexible(true)
            .from_writer(writer);
        Self {
            csv,
            path: label,
            rows: 0,
        }
    }

    /// Write one row per occupied slot of `table`. Returns the number of rows.
    pub fn write_table(&mut self, table: &MeasurementTable) -> Result<usize> {
        let mut written = 0;
        for m in table.occupied() {
            self.csv
                .write_record(&[
                    format!("{:.6}", m.centroid_x),
                    format!("{:.6}", m.centroid_y),
                    m.corrected_time.to_string(),
                    String::new(),
                ])
                .map_err(|e| WriteError::CsvError {
                    path: self.path.clone(),
                    source: e,
                })?;
            written += 1;
        }
        self.rows += written as u64;
        Ok(written)
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn flush(&mut self) -> Result<()> {
        self.csv.flush().map_err(|e| WriteError::WriteFile {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        let path = self.path;
        self.csv.into_inner().map_err(|e| WriteError::WriteFile {
            path,
            source: e.into_error(),
        })
    }
}

/// Export every table of `history` to `path`.
///
/// # Example
///
/// ```no_run
/// use lidar_pipeline::core::writers::write_history_csv;
/// use lidar_pipeline::pipeline::History;
/// use std::path::Path;
///
/// write_history_csv(Path::new("measurements.csv"), &History::new()).unwrap();
/// ```
pub fn write_history_csv(path: &Path, history: &History) -> Result<u64> {
    let mut writer = MeasurementWriter::create(path, false)?;
    for table in history.tables() {
        writer.write_table(table)?;
    }
    writer.flush()?;
    Ok(writer.rows())
}

/// Write points to an ASCII PLY file with x, y, z and intensity properties.
///
/// Parent directories are created if needed.
pub fn write_ply(path: &Path, points: &[Point]) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();
    let io_err = |e| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    };

    write!(
        writer,
        "ply\nformat ascii 1.0\nelement vertex {}\nproperty float x\nproperty float y\nproperty float z\nproperty float intensity\nend_header\n",
        points.len()
    )
    .map_err(io_err)?;

    for p in points {
        writeln!(writer, "{:.6} {:.6} {:.6} {:.6}", p.x, p.y, p.z, p.intensity).map_err(io_err)?;
    }

    writer.flush().map_err(io_err)?;

    Ok(())
}
