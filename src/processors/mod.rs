//! Per-frame processing stages.

pub mod bounding_box;
pub mod clustering;
pub mod filtering;
pub mod ground;
pub mod temporal;

// Re-export key types for convenience
pub use bounding_box::{rotate_xy, Aabb, BoxPolicy, BoxVerdict};
pub use clustering::{Cluster, EuclideanClusterer};
pub use filtering::{finite_only, pass_through, split_by_field, PassThrough};
pub use ground::{segment_ground, GroundSplit, Plane, SegmentationError};
pub use temporal::{azimuth, corrected_time, normalize_azimuth};
