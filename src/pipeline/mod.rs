//! Frame lifecycle: runs one frame through every stage and accumulates results.
//!
//! [`FramePipeline`] owns the measurement table, the history and the
//! ground/object buffers that are reused from one frame to the next. All
//! processing goes through `&mut self`, so a second frame can never be
//! processed against the same state while one is in flight.

pub mod handoff;
pub mod runner;
pub mod sink;
pub mod table;

use crate::config::{ObjectSelection, PipelineConfig};
use crate::core::frame::{Frame, Point};
use crate::processors::{
    azimuth, corrected_time, finite_only, pass_through, rotate_xy, segment_ground,
    split_by_field, Aabb, BoxPolicy, BoxVerdict, EuclideanClusterer, PassThrough, Plane,
    SegmentationError,
};

pub use handoff::{FrameSlot, Poll};
pub use runner::{RunSummary, Runner};
pub use sink::{FrameReport, MeasurementSink, SinkError};
pub use table::{History, Measurement, MeasurementTable};

/// How the object points of a frame were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum GroundStatus {
    /// RANSAC ground plane removed.
    Plane(Plane),
    /// Objects selected by intensity band.
    IntensityBand,
    /// No plane could be fitted; every filtered point was treated as an object.
    #[default]
    NoPlaneFound,
}

/// Per-frame counters, mostly for logging.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameStats {
    pub frame_index: u64,
    pub end_timestamp: u64,
    pub input_points: usize,
    pub filtered_points: usize,
    pub ground_points: usize,
    pub object_points: usize,
    pub ground: GroundStatus,
    pub clusters: usize,
    pub measurements: usize,
    pub rejected_near_origin: usize,
    pub rejected_oversize: usize,
    pub dropped_over_capacity: usize,
    /// Whether the table was appended to the history.
    pub committed: bool,
}

/// Owns all state that lives across frames.
pub struct FramePipeline {
    filter: Option<PassThrough>,
    selection: ObjectSelection,
    ground_config: crate::config::GroundConfig,
    clusterer: EuclideanClusterer,
    policy: BoxPolicy,
    mounting_yaw: f32,
    table: MeasurementTable,
    history: History,
    ground: Vec<Point>,
    objects: Vec<Point>,
    frames_processed: u64,
}

impl FramePipeline {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            filter: config.filter.enabled.then(|| PassThrough::from(&config.filter)),
            selection: config.objects,
            ground_config: config.ground.clone(),
            clusterer: EuclideanClusterer::from(&config.clustering),
            policy: BoxPolicy::from(&config.boxes),
            mounting_yaw: config.boxes.mounting_yaw,
            table: MeasurementTable::with_capacity(config.table.capacity),
            history: History::new(),
            ground: Vec::new(),
            objects: Vec::new(),
            frames_processed: 0,
        }
    }

    /// Process one frame, recovering from a missing ground plane.
    ///
    /// When no plane can be fitted the whole filtered cloud is treated as
    /// non-ground and processing continues.
    pub fn process(&mut self, frame: &Frame) -> FrameStats {
        let (mut stats, filtered) = self.begin(frame);

        stats.ground = match self.select_objects(filtered) {
            Ok(status) => status,
            Err(SegmentationError::NoPlaneFound { points }) => {
                log::warn!(
                    "frame {}: no ground plane in {} points, treating all as objects",
                    stats.frame_index,
                    points
                );
                GroundStatus::NoPlaneFound
            }
        };

        self.finish(frame, stats)
    }

    /// Process one frame, failing if no ground plane can be fitted.
    ///
    /// On failure the table is left cleared and nothing is committed.
    pub fn process_strict(&mut self, frame: &Frame) -> Result<FrameStats, SegmentationError> {
        let (mut stats, filtered) = self.begin(frame);
        stats.ground = self.select_objects(filtered)?;
        Ok(self.finish(frame, stats))
    }

    fn begin(&mut self, frame: &Frame) -> (FrameStats, Vec<Point>) {
        self.table.clear();

        let filtered = match &self.filter {
            Some(filter) => pass_through(&frame.points, filter),
            None => finite_only(&frame.points),
        };

        let stats = FrameStats {
            frame_index: self.frames_processed,
            end_timestamp: frame.end_timestamp,
            input_points: frame.len(),
            filtered_points: filtered.len(),
            ..FrameStats::default()
        };
        self.frames_processed += 1;

        (stats, filtered)
    }

    /// Fill the ground/object buffers from the filtered cloud.
    ///
    /// On `NoPlaneFound` the object buffer already holds the whole filtered cloud.
    fn select_objects(&mut self, filtered: Vec<Point>) -> Result<GroundStatus, SegmentationError> {
        self.ground.clear();
        self.objects.clear();

        match self.selection {
            ObjectSelection::IntensityBand { min, max } => {
                let (objects, rest) =
                    split_by_field(&filtered, crate::config::FilterField::Intensity, min, max);
                self.objects.extend(objects);
                self.ground.extend(rest);
                Ok(GroundStatus::IntensityBand)
            }
            ObjectSelection::GroundPlane => match segment_ground(&filtered, &self.ground_config) {
                Ok(split) => {
                    self.ground.extend(split.ground);
                    self.objects.extend(split.objects);
                    Ok(GroundStatus::Plane(split.plane))
                }
                Err(e) => {
                    self.objects.extend(filtered);
                    Err(e)
                }
            },
        }
    }

    fn finish(&mut self, frame: &Frame, mut stats: FrameStats) -> FrameStats {
        stats.ground_points = self.ground.len();
        stats.object_points = self.objects.len();

        let clusters = self.clusterer.extract(&self.objects);
        stats.clusters = clusters.len();

        let capacity = self.table.capacity();
        stats.dropped_over_capacity = clusters.len().saturating_sub(capacity);

        for (slot, cluster) in clusters.iter().enumerate().take(capacity) {
            let Some(bbox) = Aabb::from_points(cluster.points(&self.objects)) else {
                continue;
            };

            match self.policy.evaluate(&bbox) {
                BoxVerdict::Accepted => {}
                BoxVerdict::RejectedNearOrigin => {
                    stats.rejected_near_origin += 1;
                    log::debug!("slot {}: centroid within exclusion radius", slot);
                    continue;
                }
                BoxVerdict::RejectedOversize => {
                    stats.rejected_oversize += 1;
                    log::debug!("slot {}: footprint {:?} too large", slot, bbox.extent());
                    continue;
                }
            }

            let measurement = self.measure(slot, &bbox, frame);
            if self.table.write(slot, measurement) {
                stats.measurements += 1;
            }
        }

        stats.committed = self.history.commit_if_any(&self.table);

        log::info!(
            "frame {} @ {}: {} pts -> {} objects, {} clusters, {} measurements",
            stats.frame_index,
            stats.end_timestamp,
            stats.input_points,
            stats.object_points,
            stats.clusters,
            stats.measurements
        );
        if stats.dropped_over_capacity > 0 {
            log::debug!(
                "frame {}: {} clusters beyond table capacity dropped",
                stats.frame_index,
                stats.dropped_over_capacity
            );
        }

        stats
    }

    fn measure(&self, slot: usize, bbox: &Aabb, frame: &Frame) -> Measurement {
        let (cx, cy) = bbox.centroid_xy();
        let azimuth = azimuth(cx, cy);
        let (centroid_x, centroid_y) = rotate_xy(cx, cy, self.mounting_yaw);

        Measurement {
            slot_id: slot,
            centroid_x,
            centroid_y,
            azimuth,
            corrected_time: corrected_time(frame.end_timestamp, frame.rotation_period, azimuth),
            box_min: bbox.min,
            box_max: bbox.max,
        }
    }

    /// Table of the most recently processed frame.
    pub fn table(&self) -> &MeasurementTable {
        &self.table
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Hand over the accumulated history, leaving an empty one behind.
    pub fn take_history(&mut self) -> History {
        std::mem::take(&mut self.history)
    }

    /// Object (non-ground) points of the most recent frame.
    pub fn objects(&self) -> &[Point] {
        &self.objects
    }

    /// Ground points of the most recent frame.
    pub fn ground(&self) -> &[Point] {
        &self.ground
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;
    use std::time::Duration;

    /// Objects-only configuration: no filter, intensity band covering everything.
    fn objects_only() -> PipelineConfig {
        PipelineConfig {
            filter: FilterConfig {
                enabled: false,
                ..FilterConfig::default()
            },
            objects: ObjectSelection::IntensityBand {
                min: f32::MIN,
                max: f32::MAX,
            },
            ..PipelineConfig::default()
        }
    }

    fn cube(min: [f32; 3], max: [f32; 3]) -> Vec<Point> {
        let mut points = Vec::new();
        for &x in &[min[0], max[0]] {
            for &y in &[min[1], max[1]] {
                for &z in &[min[2], max[2]] {
                    points.push(Point::new(x, y, z, 100.0));
                }
            }
        }
        points
    }

    fn frame(points: Vec<Point>) -> Frame {
        Frame::new(points, 1000, Duration::from_micros(100))
    }

    #[test]
    fn test_frame_without_objects_leaves_table_vacant() {
        let mut pipeline = FramePipeline::new(&objects_only());
        let stats = pipeline.process(&frame(Vec::new()));

        assert!(pipeline.table().is_vacant());
        assert!(!stats.committed);
        assert!(pipeline.history().is_empty());
    }

    #[test]
    fn test_single_cluster_measurement() {
        let mut pipeline = FramePipeline::new(&objects_only());
        let stats = pipeline.process(&frame(cube([1.0, 1.0, 0.0], [2.0, 2.0, 1.0])));

        assert_eq!(stats.clusters, 1);
        assert_eq!(stats.measurements, 1);
        let m = pipeline.table().get(0).copied().unwrap();
        assert_eq!((m.centroid_x, m.centroid_y), (1.5, 1.5));
        assert_eq!(m.box_min, [1.0, 1.0, 0.0]);
        assert_eq!(m.box_max, [2.0, 2.0, 1.0]);
        assert_eq!(m.slot_id, 0);
        assert_eq!(pipeline.history().len(), 1);
    }

    #[test]
    fn test_rejected_cluster_leaves_its_slot_empty() {
        let mut points = cube([-0.2, -0.2, 0.0], [0.2, 0.2, 0.5]);
        points.extend(cube([10.0, 10.0, 0.0], [10.5, 10.5, 0.5]));

        let mut pipeline = FramePipeline::new(&objects_only());
        let stats = pipeline.process(&frame(points));

        assert_eq!(stats.rejected_near_origin, 1);
        assert!(pipeline.table().get(0).is_none());
        assert_eq!(pipeline.table().get(1).map(|m| m.centroid_x), Some(10.25));
    }

    #[test]
    fn test_no_plane_fallback_and_strict_mode() {
        let config = PipelineConfig {
            filter: FilterConfig {
                enabled: false,
                ..FilterConfig::default()
            },
            ..PipelineConfig::default()
        };
        // Two points cannot define a plane
        let points = vec![Point::new(5.0, 0.0, 0.0, 1.0), Point::new(5.5, 0.0, 0.0, 1.0)];

        let mut pipeline = FramePipeline::new(&config);
        let stats = pipeline.process(&frame(points.clone()));
        assert_eq!(stats.ground, GroundStatus::NoPlaneFound);
        assert_eq!(stats.object_points, 2);
        assert_eq!(stats.measurements, 1);

        let err = pipeline.process_strict(&frame(points)).unwrap_err();
        assert_eq!(err, SegmentationError::NoPlaneFound { points: 2 });
        assert!(pipeline.table().is_vacant());
        assert_eq!(pipeline.history().len(), 1);
    }

    #[test]
    fn test_mounting_yaw_rotates_reported_centroid_only() {
        let mut config = objects_only();
        config.boxes.mounting_yaw = std::f32::consts::PI;

        let mut pipeline = FramePipeline::new(&config);
        pipeline.process(&frame(cube([3.0, -0.1, 0.0], [3.2, 0.1, 0.5])));

        let m = pipeline.table().get(0).copied().unwrap();
        approx::assert_relative_eq!(m.centroid_x, -3.1, epsilon = 1e-5);
        approx::assert_relative_eq!(m.azimuth, std::f32::consts::FRAC_PI_2, epsilon = 1e-5);
        assert_eq!(m.box_min[0], 3.0);
    }

    #[test]
    fn test_take_history() {
        let mut pipeline = FramePipeline::new(&objects_only());
        pipeline.process(&frame(cube([4.0, 4.0, 0.0], [4.5, 4.5, 0.5])));

        let history = pipeline.take_history();
        assert_eq!(history.len(), 1);
        assert!(pipeline.history().is_empty());
        assert_eq!(pipeline.frames_processed(), 1);
    }
}
