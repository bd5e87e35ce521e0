//! Axis-aligned bounding boxes and cluster acceptance policy.

use crate::config::{BoxConfig, FootprintRule};
use crate::core::frame::Point;

/// Axis-aligned extremal box over a set of points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Aabb {
    /// Component-wise min/max over `points`; `None` for an empty set.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Point>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = Aabb {
            min: first.coords(),
            max: first.coords(),
        };
        for p in iter {
            let c = p.coords();
            for axis in 0..3 {
                bbox.min[axis] = bbox.min[axis].min(c[axis]);
                bbox.max[axis] = bbox.max[axis].max(c[axis]);
            }
        }
        Some(bbox)
    }

    /// Geometric center of the box in the horizontal plane.
    #[inline]
    pub fn centroid_xy(&self) -> (f32, f32) {
        (
            (self.max[0] + self.min[0]) / 2.0,
            (self.max[1] + self.min[1]) / 2.0,
        )
    }

    /// Horizontal distance of the centroid from the sensor origin.
    #[inline]
    pub fn range_xy(&self) -> f32 {
        let (x, y) = self.centroid_xy();
        x.hypot(y)
    }

    #[inline]
    pub fn extent(&self) -> [f32; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}

/// Outcome of running a box through the acceptance policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxVerdict {
    Accepted,
    /// Centroid inside the mounting/self-occlusion zone.
    RejectedNearOrigin,
    /// Footprint too large for the compact object class.
    RejectedOversize,
}

/// Exclusion-radius and compact-object rules for candidate boxes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxPolicy {
    pub exclusion_radius: f32,
    /// Footprint cap; `None` disables the compact-object check.
    pub max_footprint: Option<f32>,
    pub footprint_rule: FootprintRule,
}

impl BoxPolicy {
    /// Reject `distance < exclusion_radius`; a centroid exactly on the
    /// radius is accepted. A non-finite centroid is always rejected.
    pub fn evaluate(&self, bbox: &Aabb) -> BoxVerdict {
        let range = bbox.range_xy();
        if !range.is_finite() || range < self.exclusion_radius {
            return BoxVerdict::RejectedNearOrigin;
        }

        if let Some(cap) = self.max_footprint {
            let [dx, dy, _] = bbox.extent();
            let oversize = match self.footprint_rule {
                FootprintRule::Both => dx > cap && dy > cap,
                FootprintRule::Either => dx >= cap || dy >= cap,
            };
            if oversize {
                return BoxVerdict::RejectedOversize;
            }
        }

        BoxVerdict::Accepted
    }
}

impl From<&BoxConfig> for BoxPolicy {
    fn from(config: &BoxConfig) -> Self {
        Self {
            exclusion_radius: config.exclusion_radius,
            max_footprint: config.compact_only.then_some(config.max_footprint),
            footprint_rule: config.footprint_rule,
        }
    }
}

/// Rotate a horizontal position about the z axis by `yaw` radians.
#[inline]
pub fn rotate_xy(x: f32, y: f32, yaw: f32) -> (f32, f32) {
    if yaw == 0.0 {
        return (x, y);
    }
    let (sin, cos) = yaw.sin_cos();
    (x * cos - y * sin, x * sin + y * cos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn policy(compact: bool) -> BoxPolicy {
        BoxPolicy::from(&BoxConfig {
            compact_only: compact,
            ..BoxConfig::default()
        })
    }

    fn point_box(center: (f32, f32), half: f32) -> Aabb {
        Aabb {
            min: [center.0 - half, center.1 - half, 0.0],
            max: [center.0 + half, center.1 + half, 1.0],
        }
    }

    #[test]
    fn test_aabb_from_points() {
        let points = vec![
            Point::new(1.0, 2.0, 0.5, 0.0),
            Point::new(2.0, 1.0, 1.0, 0.0),
            Point::new(1.5, 1.5, 0.0, 0.0),
        ];
        let bbox = Aabb::from_points(&points).unwrap();
        assert_eq!(bbox.min, [1.0, 1.0, 0.0]);
        assert_eq!(bbox.max, [2.0, 2.0, 1.0]);
        assert_eq!(bbox.centroid_xy(), (1.5, 1.5));
        assert_relative_eq!(bbox.range_xy(), 2.1213203, epsilon = 1e-5);
    }

    #[test]
    fn test_aabb_empty() {
        assert!(Aabb::from_points(&Vec::<Point>::new()).is_none());
    }

    #[test]
    fn test_exclusion_radius_boundary() {
        let policy = policy(false);
        assert_eq!(
            policy.evaluate(&point_box((0.79, 0.0), 0.0)),
            BoxVerdict::RejectedNearOrigin
        );
        assert_eq!(policy.evaluate(&point_box((0.8, 0.0), 0.0)), BoxVerdict::Accepted);
        assert_eq!(
            policy.evaluate(&point_box((0.0, -0.5), 0.2)),
            BoxVerdict::RejectedNearOrigin
        );
    }

    #[test]
    fn test_compact_mode_is_opt_in() {
        let large = point_box((5.0, 5.0), 1.0);
        assert_eq!(policy(false).evaluate(&large), BoxVerdict::Accepted);
        assert_eq!(policy(true).evaluate(&large), BoxVerdict::RejectedOversize);
        assert_eq!(policy(true).evaluate(&point_box((5.0, 5.0), 0.3)), BoxVerdict::Accepted);
    }

    #[test]
    fn test_footprint_rule() {
        // Long and thin: x extent 2.0, y extent 0.2
        let thin = Aabb {
            min: [4.0, 4.9, 0.0],
            max: [6.0, 5.1, 0.5],
        };
        let mut both = policy(true);
        assert_eq!(both.evaluate(&thin), BoxVerdict::Accepted);

        both.footprint_rule = FootprintRule::Either;
        assert_eq!(both.evaluate(&thin), BoxVerdict::RejectedOversize);
    }

    #[test]
    fn test_either_rule_rejects_at_cap() {
        let policy = BoxPolicy {
            exclusion_radius: 0.8,
            max_footprint: Some(0.5),
            footprint_rule: FootprintRule::Either,
        };
        let at_cap = Aabb {
            min: [5.0, 5.0, 0.0],
            max: [5.5, 5.25, 0.5],
        };
        let under_cap = Aabb {
            min: [5.0, 5.0, 0.0],
            max: [5.25, 5.25, 0.5],
        };
        assert_eq!(policy.evaluate(&at_cap), BoxVerdict::RejectedOversize);
        assert_eq!(policy.evaluate(&under_cap), BoxVerdict::Accepted);
    }

    #[test]
    fn test_non_finite_centroid_is_rejected() {
        let nan_box = Aabb {
            min: [f32::NAN; 3],
            max: [f32::NAN; 3],
        };
        assert_eq!(policy(false).evaluate(&nan_box), BoxVerdict::RejectedNearOrigin);
    }

    #[test]
    fn test_rotate_xy() {
        assert_eq!(rotate_xy(1.5, -2.0, 0.0), (1.5, -2.0));
        let (x, y) = rotate_xy(1.0, 2.0, std::f32::consts::PI);
        assert_relative_eq!(x, -1.0, epsilon = 1e-6);
        assert_relative_eq!(y, -2.0, epsilon = 1e-6);
        let (x, y) = rotate_xy(1.0, 0.0, std::f32::consts::FRAC_PI_2);
        assert_relative_eq!(x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(y, 1.0, epsilon = 1e-6);
    }
}
