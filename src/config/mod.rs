//! Configuration types for the lidar pipeline.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Point field a pass-through filter operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    Z,
    Intensity,
}

/// Whether a pass-through filter keeps or rejects the points inside its interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    Keep,
    Reject,
}

/// Pass-through filter applied to every raw frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Disable to feed the raw frame straight into object selection
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_filter_field")]
    pub field: FilterField,

    /// Lower bound of the closed interval
    #[serde(default = "default_filter_min")]
    pub min: f32,

    /// Upper bound of the closed interval
    #[serde(default = "default_filter_max")]
    pub max: f32,

    #[serde(default = "default_filter_mode")]
    pub mode: FilterMode,
}

fn default_true() -> bool {
    true
}

fn default_filter_field() -> FilterField {
    FilterField::Z
}

fn default_filter_min() -> f32 {
    2.0
}

fn default_filter_max() -> f32 {
    25.0
}

fn default_filter_mode() -> FilterMode {
    FilterMode::Reject
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            field: default_filter_field(),
            min: default_filter_min(),
            max: default_filter_max(),
            mode: default_filter_mode(),
        }
    }
}

/// How object points are separated from the background.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ObjectSelection {
    /// Fit and remove the dominant ground plane
    #[default]
    GroundPlane,
    /// Keep only points whose intensity lies in `[min, max]` (retro-reflective targets)
    IntensityBand { min: f32, max: f32 },
}

/// Configuration for RANSAC ground plane segmentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundConfig {
    /// Maximum point-to-plane distance for an inlier
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f32,

    /// Upper bound on sampled planes per frame
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Confidence used for adaptive early termination
    #[serde(default = "default_probability")]
    pub probability: f64,

    /// Seed for the sampler; every frame starts from this seed
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_distance_threshold() -> f32 {
    0.4
}

fn default_max_iterations() -> usize {
    200
}

fn default_probability() -> f64 {
    0.99
}

fn default_seed() -> u64 {
    42
}

impl Default for GroundConfig {
    fn default() -> Self {
        Self {
            distance_threshold: default_distance_threshold(),
            max_iterations: default_max_iterations(),
            probability: default_probability(),
            seed: default_seed(),
        }
    }
}

/// Configuration for Euclidean cluster extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Neighborhood radius connecting two points
    #[serde(default = "default_tolerance")]
    pub tolerance: f32,

    /// Smallest accepted cluster
    #[serde(default = "default_min_size")]
    pub min_size: usize,

    /// Largest accepted cluster
    #[serde(default = "default_max_size")]
    pub max_size: usize,
}

fn default_tolerance() -> f32 {
    2.0
}

fn default_min_size() -> usize {
    1
}

fn default_max_size() -> usize {
    100
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            min_size: default_min_size(),
            max_size: default_max_size(),
        }
    }
}

/// Which extents must exceed the footprint cap for a box to be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FootprintRule {
    /// Reject when both x and y extents exceed the cap
    Both,
    /// Reject when either extent exceeds the cap
    Either,
}

/// Configuration for bounding box acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxConfig {
    /// Boxes whose centroid is closer than this to the sensor are dropped
    #[serde(default = "default_exclusion_radius")]
    pub exclusion_radius: f32,

    /// Enable the compact-object footprint check
    #[serde(default)]
    pub compact_only: bool,

    /// Footprint cap for compact objects
    #[serde(default = "default_max_footprint")]
    pub max_footprint: f32,

    #[serde(default = "default_footprint_rule")]
    pub footprint_rule: FootprintRule,

    /// Rotation (radians, about z) applied to reported centroids
    #[serde(default)]
    pub mounting_yaw: f32,
}

fn default_exclusion_radius() -> f32 {
    0.8
}

fn default_max_footprint() -> f32 {
    0.9
}

fn default_footprint_rule() -> FootprintRule {
    FootprintRule::Both
}

impl Default for BoxConfig {
    fn default() -> Self {
        Self {
            exclusion_radius: default_exclusion_radius(),
            compact_only: false,
            max_footprint: default_max_footprint(),
            footprint_rule: default_footprint_rule(),
            mounting_yaw: 0.0,
        }
    }
}

/// Rotation timing used when a frame carries no usable predecessor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_nominal_rotation_period_us")]
    pub nominal_rotation_period_us: u64,
}

fn default_nominal_rotation_period_us() -> u64 {
    100_000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            nominal_rotation_period_us: default_nominal_rotation_period_us(),
        }
    }
}

/// Measurement table sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    30
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

/// Producer behaviour when the consumer has not yet taken the previous frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayPacing {
    /// Sleep one rotation period per frame and overwrite unconsumed frames
    Realtime,
    /// Publish as fast as the consumer drains, never overwriting
    Lossless,
}

/// Consumer loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Sleep between polls of an empty or contended handoff slot
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_pacing")]
    pub pacing: ReplayPacing,
}

fn default_poll_interval_ms() -> u64 {
    5
}

fn default_pacing() -> ReplayPacing {
    ReplayPacing::Lossless
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            pacing: default_pacing(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub objects: ObjectSelection,

    #[serde(default)]
    pub ground: GroundConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub boxes: BoxConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub table: TableConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject parameter combinations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.filter.min > self.filter.max {
            return Err(ConfigError::Invalid(format!(
                "filter interval [{}, {}] is empty",
                self.filter.min, self.filter.max
            )));
        }
        if let ObjectSelection::IntensityBand { min, max } = self.objects {
            if min > max {
                return Err(ConfigError::Invalid(format!(
                    "intensity band [{}, {}] is empty",
                    min, max
                )));
            }
        }
        if self.ground.distance_threshold <= 0.0 {
            return Err(ConfigError::Invalid(
                "ground.distance_threshold must be positive".into(),
            ));
        }
        let probability = self.ground.probability;
        if probability.is_nan() || probability <= 0.0 || probability >= 1.0 {
            return Err(ConfigError::Invalid(
                "ground.probability must be in (0, 1)".into(),
            ));
        }
        if self.ground.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "ground.max_iterations must be at least 1".into(),
            ));
        }
        if self.clustering.tolerance <= 0.0 {
            return Err(ConfigError::Invalid(
                "clustering.tolerance must be positive".into(),
            ));
        }
        if self.clustering.min_size > self.clustering.max_size {
            return Err(ConfigError::Invalid(format!(
                "clustering.min_size {} exceeds max_size {}",
                self.clustering.min_size, self.clustering.max_size
            )));
        }
        if self.table.capacity == 0 {
            return Err(ConfigError::Invalid("table.capacity must be at least 1".into()));
        }
        if self.timing.nominal_rotation_period_us == 0 {
            return Err(ConfigError::Invalid(
                "timing.nominal_rotation_period_us must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_pipeline_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.table.capacity, 30);
        assert_eq!(config.clustering.max_size, 100);
        assert_eq!(config.boxes.exclusion_radius, 0.8);
        assert_eq!(config.objects, ObjectSelection::GroundPlane);
        assert!(!config.boxes.compact_only);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "clustering:\n  tolerance: 0.45\nobjects:\n  method: intensity_band\n  min: 100.0\n  max: 255.0\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.clustering.tolerance, 0.45);
        assert_eq!(config.clustering.min_size, 1);
        assert_eq!(
            config.objects,
            ObjectSelection::IntensityBand { min: 100.0, max: 255.0 }
        );
        assert_eq!(config.filter.mode, FilterMode::Reject);
    }

    #[test]
    fn test_yaml_round_trip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");
        let mut config = PipelineConfig::default();
        config.boxes.compact_only = true;
        config.table.capacity = 5;

        config.to_yaml(&path).unwrap();
        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert!(loaded.boxes.compact_only);
        assert_eq!(loaded.table.capacity, 5);
    }

    #[test]
    fn test_validate_rejects_inverted_cluster_bounds() {
        let mut config = PipelineConfig::default();
        config.clustering.min_size = 200;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config: PipelineConfig =
            serde_yaml::from_str(include_str!("../../config/pipeline.yaml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.clustering.tolerance, 2.0);
        assert_eq!(config.boxes.footprint_rule, FootprintRule::Both);
        assert_eq!(config.runtime.pacing, ReplayPacing::Lossless);
    }

    #[test]
    fn test_validate_rejects_degenerate_ransac_settings() {
        for probability in [0.0, 1.0, f64::NAN] {
            let mut config = PipelineConfig::default();
            config.ground.probability = probability;
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }

        let mut config = PipelineConfig::default();
        config.ground.max_iterations = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = PipelineConfig::default();
        config.table.capacity = 0;
        assert!(config.validate().is_err());
    }
}
