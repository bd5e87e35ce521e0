//! RANSAC ground plane segmentation.
//!
//! Repeatedly samples three points, forms the plane through them and counts
//! the points within `distance_threshold` of it. The best-supported plane is
//! the ground; everything else is an object candidate. The iteration count
//! adapts to the best inlier ratio seen so far so that dense ground frames
//! finish after a handful of samples.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;

use crate::config::GroundConfig;
use crate::core::frame::Point;

/// Minimal sample size for a plane hypothesis.
const SAMPLE_SIZE: usize = 3;

/// Errors raised by ground segmentation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SegmentationError {
    #[error("could not estimate a planar model for {points} points")]
    NoPlaneFound { points: usize },
}

/// Plane in Hessian normal form: `normal · p + d = 0` with a unit normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: [f32; 3],
    pub d: f32,
}

impl Plane {
    /// Plane through three points, or `None` when they are (nearly) collinear.
    pub fn through(a: &Point, b: &Point, c: &Point) -> Option<Self> {
        let u = [b.x - a.x, b.y - a.y, b.z - a.z];
        let v = [c.x - a.x, c.y - a.y, c.z - a.z];
        let n = [
            u[1] * v[2] - u[2] * v[1],
            u[2] * v[0] - u[0] * v[2],
            u[0] * v[1] - u[1] * v[0],
        ];
        let norm = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
        if !norm.is_finite() || norm < 1e-6 {
            return None;
        }

        let normal = [n[0] / norm, n[1] / norm, n[2] / norm];
        let d = -(normal[0] * a.x + normal[1] * a.y + normal[2] * a.z);
        Some(Self { normal, d })
    }

    /// Unsigned point-to-plane distance.
    #[inline]
    pub fn distance(&self, p: &Point) -> f32 {
        (self.normal[0] * p.x + self.normal[1] * p.y + self.normal[2] * p.z + self.d).abs()
    }
}

/// Disjoint ground/object partition of a point sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundSplit {
    pub plane: Plane,
    pub ground: Vec<Point>,
    pub objects: Vec<Point>,
}

/// Number of samples needed to hit an all-inlier sample with `probability`.
fn required_iterations(inlier_ratio: f64, probability: f64) -> f64 {
    let all_inliers = inlier_ratio.powi(SAMPLE_SIZE as i32);
    let miss = (1.0 - all_inliers).clamp(f64::EPSILON, 1.0 - f64::EPSILON);
    (1.0 - probability).ln() / miss.ln()
}

/// Draw three distinct indices below `n`.
fn sample_indices(rng: &mut StdRng, n: usize) -> [usize; SAMPLE_SIZE] {
    let a = rng.random_range(0..n);
    let mut b = rng.random_range(0..n);
    while b == a {
        b = rng.random_range(0..n);
    }
    let mut c = rng.random_range(0..n);
    while c == a || c == b {
        c = rng.random_range(0..n);
    }
    [a, b, c]
}

/// Split `points` into ground plane inliers and object outliers.
///
/// Sampling restarts from `config.seed` on every call, so the same input
/// always produces the same split. Both output sequences keep input order.
///
/// # Errors
///
/// `NoPlaneFound` when the input has fewer than three points or no sampled
/// plane is supported by any point (e.g. every sample was collinear).
pub fn segment_ground(
    points: &[Point],
    config: &GroundConfig,
) -> Result<GroundSplit, SegmentationError> {
    let n = points.len();
    if n < SAMPLE_SIZE {
        return Err(SegmentationError::NoPlaneFound { points: n });
    }

    let threshold = config.distance_threshold;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut best: Option<(Plane, usize)> = None;
    let mut needed = config.max_iterations as f64;
    let mut iteration = 0usize;

    while iteration < config.max_iterations && (iteration as f64) < needed {
        iteration += 1;

        let [a, b, c] = sample_indices(&mut rng, n);
        let Some(plane) = Plane::through(&points[a], &points[b], &points[c]) else {
            continue;
        };

        let support = points
            .par_iter()
            .filter(|p| plane.distance(p) <= threshold)
            .count();

        if best.map_or(true, |(_, count)| support > count) {
            best = Some((plane, support));
            needed = required_iterations(support as f64 / n as f64, config.probability);
        }
    }

    let (plane, support) = match best {
        Some((plane, support)) if support > 0 => (plane, support),
        _ => return Err(SegmentationError::NoPlaneFound { points: n }),
    };

    log::debug!(
        "ground plane n=({:.3}, {:.3}, {:.3}) d={:.3}: {}/{} inliers after {} samples",
        plane.normal[0],
        plane.normal[1],
        plane.normal[2],
        plane.d,
        support,
        n,
        iteration
    );

    let (ground, objects): (Vec<Point>, Vec<Point>) = points
        .iter()
        .copied()
        .partition(|p| plane.distance(p) <= threshold);

    Ok(GroundSplit {
        plane,
        ground,
        objects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// A 10 x 10 floor grid at z = 0 plus a small object standing on it.
    fn floor_with_object() -> Vec<Point> {
        let mut points = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                points.push(Point::new(i as f32, j as f32, 0.0, 5.0));
            }
        }
        for k in 0..6 {
            points.push(Point::new(4.0 + 0.1 * k as f32, 4.5, 1.0 + 0.2 * k as f32, 80.0));
        }
        points
    }

    #[test]
    fn test_plane_through_points() {
        let plane = Plane::through(
            &Point::new(0.0, 0.0, 1.0, 0.0),
            &Point::new(1.0, 0.0, 1.0, 0.0),
            &Point::new(0.0, 1.0, 1.0, 0.0),
        )
        .unwrap();

        assert_relative_eq!(plane.normal[2].abs(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(plane.distance(&Point::new(5.0, -3.0, 3.5, 0.0)), 2.5, epsilon = 1e-5);
    }

    #[test]
    fn test_plane_rejects_collinear() {
        let plane = Plane::through(
            &Point::new(0.0, 0.0, 0.0, 0.0),
            &Point::new(1.0, 1.0, 1.0, 0.0),
            &Point::new(2.0, 2.0, 2.0, 0.0),
        );
        assert!(plane.is_none());
    }

    #[test]
    fn test_segment_separates_floor_and_object() {
        let points = floor_with_object();
        let split = segment_ground(&points, &GroundConfig::default()).unwrap();

        assert_eq!(split.ground.len(), 100);
        assert_eq!(split.objects.len(), 6);
        assert!(split.objects.iter().all(|p| p.intensity == 80.0));
        // Order within each partition is preserved
        assert_eq!(split.objects[0].x, 4.0);
        assert_eq!(split.ground[0], points[0]);
    }

    #[test]
    fn test_segment_is_deterministic() {
        let points = floor_with_object();
        let config = GroundConfig::default();
        let first = segment_ground(&points, &config).unwrap();
        let second = segment_ground(&points, &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_too_few_points() {
        let points = vec![Point::new(0.0, 0.0, 0.0, 0.0), Point::new(1.0, 0.0, 0.0, 0.0)];
        assert_eq!(
            segment_ground(&points, &GroundConfig::default()),
            Err(SegmentationError::NoPlaneFound { points: 2 })
        );
    }

    #[test]
    fn test_collinear_cloud_has_no_plane() {
        let points: Vec<Point> = (0..20)
            .map(|i| Point::new(i as f32, 2.0 * i as f32, 0.0, 0.0))
            .collect();
        assert!(matches!(
            segment_ground(&points, &GroundConfig::default()),
            Err(SegmentationError::NoPlaneFound { points: 20 })
        ));
    }

    #[test]
    fn test_required_iterations_shrinks_with_support() {
        let sparse = required_iterations(0.2, 0.99);
        let dense = required_iterations(0.9, 0.99);
        assert!(sparse > dense);
        assert!(required_iterations(1.0, 0.99) < 1.0);
    }
}
