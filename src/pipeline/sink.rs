//! Consumers of per-frame results.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::table::MeasurementTable;
use super::FrameStats;
use crate::core::frame::Point;
use crate::core::writers::{self, MeasurementWriter, WriteError};
use crate::visualization::{self, VisualizationError};

/// Errors raised by measurement sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Render(#[from] VisualizationError),
}

/// Everything a sink sees about one processed frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameReport<'a> {
    pub stats: &'a FrameStats,
    pub table: &'a MeasurementTable,
    pub objects: &'a [Point],
}

/// Receives the measurement table once per processed frame.
pub trait MeasurementSink {
    fn consume(&mut self, report: &FrameReport<'_>) -> Result<(), SinkError>;

    /// Called once when the run ends.
    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Appends the rows of every committed frame to the export file.
pub struct CsvExportSink {
    writer: MeasurementWriter<BufWriter<File>>,
}

impl CsvExportSink {
    pub fn create(path: &Path, append: bool) -> Result<Self, SinkError> {
        Ok(Self {
            writer: MeasurementWriter::create(path, append)?,
        })
    }
}

impl MeasurementSink for CsvExportSink {
    fn consume(&mut self, report: &FrameReport<'_>) -> Result<(), SinkError> {
        if report.stats.committed {
            self.writer.write_table(report.table)?;
            self.writer.flush()?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        log::info!("exported {} measurement rows", self.writer.rows());
        Ok(())
    }
}

/// Renders a PNG per frame into a directory.
pub struct PngRenderSink {
    dir: PathBuf,
    max_points: usize,
}

impl PngRenderSink {
    pub fn new(dir: PathBuf, max_points: usize) -> Self {
        Self { dir, max_points }
    }
}

impl MeasurementSink for PngRenderSink {
    fn consume(&mut self, report: &FrameReport<'_>) -> Result<(), SinkError> {
        if report.objects.is_empty() && report.table.is_vacant() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir).map_err(VisualizationError::Io)?;
        let path = self
            .dir
            .join(format!("frame_{:06}_{}.png", report.stats.frame_index, report.stats.end_timestamp));
        visualization::plot_frame(&path, report.objects, report.table, self.max_points)?;
        Ok(())
    }
}

/// Dumps each frame's object points as a PLY file.
pub struct PlyDumpSink {
    dir: PathBuf,
}

impl PlyDumpSink {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl MeasurementSink for PlyDumpSink {
    fn consume(&mut self, report: &FrameReport<'_>) -> Result<(), SinkError> {
        let path = self
            .dir
            .join(format!("objects_{}.ply", report.stats.end_timestamp));
        writers::write_ply(&path, report.objects)?;
        Ok(())
    }
}

/// Logs every measurement at debug level and a run total at the end.
#[derive(Debug, Default)]
pub struct LogSink {
    frames: u64,
    measurements: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MeasurementSink for LogSink {
    fn consume(&mut self, report: &FrameReport<'_>) -> Result<(), SinkError> {
        self.frames += 1;
        for m in report.table.occupied() {
            self.measurements += 1;
            log::debug!(
                "frame {} slot {}: ({:.3}, {:.3}) az {:.4} t {}",
                report.stats.frame_index,
                m.slot_id,
                m.centroid_x,
                m.centroid_y,
                m.azimuth,
                m.corrected_time
            );
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        log::info!("{} measurements over {} frames", self.measurements, self.frames);
        Ok(())
    }
}
