//! Per-rotation LiDAR object measurement pipeline.
//!
//! This crate provides tools for:
//! - Replaying recorded scans (CSV and ASCII PLY) as rotation frames
//! - Pass-through filtering and RANSAC ground removal
//! - Euclidean clustering on a k-d tree (parallelized)
//! - Axis-aligned box measurement with rotation-skew corrected timestamps
//! - A single-slot handoff between acquisition and processing threads
//!
//! # Example
//!
//! ```no_run
//! use lidar_pipeline::{core::loaders::load_scan, Frame, FramePipeline, PipelineConfig};
//! use std::time::Duration;
//!
//! let points = load_scan("scan_1000.csv").unwrap();
//! let mut pipeline = FramePipeline::new(&PipelineConfig::default());
//! let stats = pipeline.process(&Frame::new(points, 1000, Duration::from_millis(100)));
//! println!("{} measurements", stats.measurements);
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod pipeline;
pub mod processors;
pub mod visualization;

pub use config::{ClusteringConfig, GroundConfig, PipelineConfig};
pub use crate::core::frame::{Frame, Point};
pub use pipeline::{FramePipeline, FrameStats, History, Measurement, MeasurementTable, Runner};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
