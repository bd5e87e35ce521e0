//! Euclidean cluster extraction over object points.
//!
//! This module groups points by distance connectivity using:
//! - `kiddo` KD-tree for O(log n) radius queries, built once per frame
//! - breadth-first region growing in seed order, so clusters come out in
//!   first-discovered-first-out order
//! - `rayon` for the radius queries of each breadth-first level
//!
//! # Example
//!
//! ```no_run
//! use lidar_pipeline::core::frame::Point;
//! use lidar_pipeline::processors::clustering::EuclideanClusterer;
//!
//! let points = vec![Point::new(0.0, 0.0, 0.0, 0.0), Point::new(0.5, 0.0, 0.0, 0.0)];
//! let clusters = EuclideanClusterer::new(1.0, 1, 100).extract(&points);
//! assert_eq!(clusters.len(), 1);
//! ```

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use rayon::prelude::*;

use crate::config::ClusteringConfig;
use crate::core::frame::Point;

/// Indices into the object point slice that make up one physical object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub indices: Vec<usize>,
}

impl Cluster {
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Resolve the indices against the slice the cluster was extracted from.
    pub fn points<'a>(&'a self, cloud: &'a [Point]) -> impl Iterator<Item = &'a Point> + 'a {
        self.indices.iter().map(move |&i| &cloud[i])
    }
}

/// Distance-connectivity clustering with size bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EuclideanClusterer {
    tolerance: f32,
    min_size: usize,
    max_size: usize,
}

impl EuclideanClusterer {
    pub fn new(tolerance: f32, min_size: usize, max_size: usize) -> Self {
        Self {
            tolerance,
            min_size,
            max_size,
        }
    }

    /// Extract clusters from `points`.
    ///
    /// # Algorithm
    ///
    /// 1. **Build KD-tree**: O(n log n) construction using kiddo
    /// 2. **Region growing**: for each unvisited seed in index order, expand
    ///    breadth-first one level at a time; the radius queries of a level
    ///    run concurrently with rayon
    /// 3. **Size gate**: keep the component only if
    ///    `min_size <= len <= max_size`
    ///
    /// Neighbor lists exist only for the level being expanded, so memory
    /// stays bounded by the largest cluster rather than the whole frame.
    /// Indices inside each cluster are sorted ascending.
    pub fn extract(&self, points: &[Point]) -> Vec<Cluster> {
        let n = points.len();
        if n == 0 {
            return Vec::new();
        }

        let coords: Vec<[f32; 3]> = points.iter().map(Point::coords).collect();
        let tree: ImmutableKdTree<f32, 3> = ImmutableKdTree::new_from_slice(&coords);
        let radius_sq = self.tolerance * self.tolerance;

        let mut visited = vec![false; n];
        let mut clusters = Vec::new();

        for seed in 0..n {
            if visited[seed] {
                continue;
            }
            visited[seed] = true;

            let mut members = vec![seed];
            let mut level = vec![seed];
            while !level.is_empty() {
                let found: Vec<Vec<usize>> = level
                    .par_iter()
                    .map(|&i| {
                        tree.within::<SquaredEuclidean>(&coords[i], radius_sq)
                            .iter()
                            .map(|nn| nn.item as usize)
                            .collect()
                    })
                    .collect();

                let mut next = Vec::new();
                for j in found.into_iter().flatten() {
                    if !visited[j] {
                        visited[j] = true;
                        next.push(j);
                    }
                }
                members.extend_from_slice(&next);
                level = next;
            }

            if members.len() >= self.min_size && members.len() <= self.max_size {
                members.sort_unstable();
                clusters.push(Cluster { indices: members });
            } else {
                log::trace!("cluster seeded at {} dropped: {} points", seed, members.len());
            }
        }

        clusters
    }
}

impl From<&ClusteringConfig> for EuclideanClusterer {
    fn from(config: &ClusteringConfig) -> Self {
        Self::new(config.tolerance, config.min_size, config.max_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(cx: f32, cy: f32, count: usize) -> Vec<Point> {
        (0..count)
            .map(|k| Point::new(cx + 0.1 * k as f32, cy + 0.05 * k as f32, 0.5, 0.0))
            .collect()
    }

    #[test]
    fn test_two_separated_clusters() {
        let mut points = blob(0.0, 0.0, 4);
        points.extend(blob(50.0, 50.0, 4));

        let clusters = EuclideanClusterer::new(1.0, 1, 100).extract(&points);

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].indices, vec![0, 1, 2, 3]);
        assert_eq!(clusters[1].indices, vec![4, 5, 6, 7]);
    }

    #[test]
    fn test_discovery_order_follows_first_index() {
        // The far blob appears first in the input, so it is discovered first
        let mut points = blob(30.0, 0.0, 3);
        points.extend(blob(0.0, 0.0, 3));

        let clusters = EuclideanClusterer::new(1.0, 1, 100).extract(&points);
        assert_eq!(clusters[0].indices, vec![0, 1, 2]);
        assert_eq!(clusters[1].indices, vec![3, 4, 5]);
    }

    #[test]
    fn test_chain_connectivity() {
        // Consecutive points 0.9 apart: end points are far but connected transitively
        let points: Vec<Point> = (0..10)
            .map(|k| Point::new(0.9 * k as f32, 0.0, 0.0, 0.0))
            .collect();
        let clusters = EuclideanClusterer::new(1.0, 1, 100).extract(&points);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 10);
    }

    #[test]
    fn test_interleaved_members_are_sorted() {
        let points = vec![
            Point::new(0.0, 0.0, 0.0, 0.0),
            Point::new(20.0, 0.0, 0.0, 0.0),
            Point::new(0.5, 0.0, 0.0, 0.0),
            Point::new(20.5, 0.0, 0.0, 0.0),
        ];
        let clusters = EuclideanClusterer::new(1.0, 1, 100).extract(&points);
        assert_eq!(clusters[0].indices, vec![0, 2]);
        assert_eq!(clusters[1].indices, vec![1, 3]);

        let xs: Vec<f32> = clusters[1].points(&points).map(|p| p.x).collect();
        assert_eq!(xs, vec![20.0, 20.5]);
    }

    #[test]
    fn test_size_bounds() {
        let mut points = blob(0.0, 0.0, 2);
        points.extend(blob(20.0, 0.0, 5));
        points.extend(blob(40.0, 0.0, 9));

        let clusters = EuclideanClusterer::new(1.0, 3, 6).extract(&points);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 5);
        assert_eq!(clusters[0].indices[0], 2);
    }

    #[test]
    fn test_empty_input() {
        let clusters = EuclideanClusterer::new(1.0, 1, 100).extract(&[]);
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_single_point_cluster() {
        let points = vec![Point::new(3.0, 4.0, 0.0, 0.0)];
        let clusters = EuclideanClusterer::new(0.5, 1, 100).extract(&points);
        assert_eq!(clusters, vec![Cluster { indices: vec![0] }]);
    }

    #[test]
    fn test_from_config() {
        let config = ClusteringConfig {
            tolerance: 0.45,
            min_size: 10,
            max_size: 6000,
        };
        let clusterer = EuclideanClusterer::from(&config);
        assert_eq!(clusterer, EuclideanClusterer::new(0.45, 10, 6000));
    }

    #[test]
    fn test_matches_brute_force_connectivity() {
        // Deterministic scatter: several loose groups plus isolated points
        let points: Vec<Point> = (0..300u32)
            .map(|k| {
                let h = k.wrapping_mul(2_654_435_761);
                let group = (k % 7) as f32 * 12.0;
                let x = group + (h % 1000) as f32 / 250.0;
                let y = ((h >> 10) % 1000) as f32 / 250.0;
                let z = ((h >> 20) % 100) as f32 / 100.0;
                Point::new(x, y, z, 0.0)
            })
            .collect();
        let tolerance = 0.6137f32;

        let n = points.len();
        let mut label = vec![usize::MAX; n];
        let mut expected: Vec<Vec<usize>> = Vec::new();
        for seed in 0..n {
            if label[seed] != usize::MAX {
                continue;
            }
            label[seed] = expected.len();
            let mut stack = vec![seed];
            let mut members = Vec::new();
            while let Some(i) = stack.pop() {
                members.push(i);
                for j in 0..n {
                    let d = [
                        points[i].x - points[j].x,
                        points[i].y - points[j].y,
                        points[i].z - points[j].z,
                    ];
                    let dist_sq = d[0] * d[0] + d[1] * d[1] + d[2] * d[2];
                    if label[j] == usize::MAX && dist_sq <= tolerance * tolerance {
                        label[j] = label[seed];
                        stack.push(j);
                    }
                }
            }
            members.sort_unstable();
            expected.push(members);
        }

        let clusters = EuclideanClusterer::new(tolerance, 1, n).extract(&points);
        let actual: Vec<Vec<usize>> = clusters.into_iter().map(|c| c.indices).collect();
        assert_eq!(actual, expected);
    }
}
