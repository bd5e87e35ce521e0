//! Pass-through filtering on a single point field.

use crate::config::{FilterConfig, FilterField, FilterMode};
use crate::core::frame::Point;

/// A closed interval on one point field plus a keep/reject polarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassThrough {
    pub field: FilterField,
    pub min: f32,
    pub max: f32,
    pub mode: FilterMode,
}

impl PassThrough {
    pub fn new(field: FilterField, min: f32, max: f32, mode: FilterMode) -> Self {
        Self {
            field,
            min,
            max,
            mode,
        }
    }

    /// Drop points above a height ceiling.
    pub fn height_ceiling(ceiling: f32) -> Self {
        Self::new(FilterField::Z, f32::NEG_INFINITY, ceiling, FilterMode::Keep)
    }

    #[inline]
    fn contains(&self, point: &Point) -> bool {
        let value = field_value(point, self.field);
        value >= self.min && value <= self.max
    }

    /// Whether `point` survives the filter.
    #[inline]
    pub fn admits(&self, point: &Point) -> bool {
        match self.mode {
            FilterMode::Keep => self.contains(point),
            FilterMode::Reject => !self.contains(point),
        }
    }
}

impl From<&FilterConfig> for PassThrough {
    fn from(config: &FilterConfig) -> Self {
        Self::new(config.field, config.min, config.max, config.mode)
    }
}

#[inline]
fn field_value(point: &Point, field: FilterField) -> f32 {
    match field {
        FilterField::Z => point.z,
        FilterField::Intensity => point.intensity,
    }
}

/// Apply a pass-through filter, preserving point order.
///
/// Points with a non-finite coordinate are dropped in either mode. An empty
/// result is valid.
pub fn pass_through(points: &[Point], filter: &PassThrough) -> Vec<Point> {
    points
        .iter()
        .copied()
        .filter(|p| p.is_finite() && filter.admits(p))
        .collect()
}

/// Copy of `points` without the returns that have a non-finite coordinate.
pub fn finite_only(points: &[Point]) -> Vec<Point> {
    points.iter().copied().filter(Point::is_finite).collect()
}

/// Split points into those inside `[min, max]` on `field` and those outside.
///
/// Used by the retro-reflective shortcut: the inside band holds the
/// high-reflectivity object returns.
pub fn split_by_field(
    points: &[Point],
    field: FilterField,
    min: f32,
    max: f32,
) -> (Vec<Point>, Vec<Point>) {
    let band = PassThrough::new(field, min, max, FilterMode::Keep);
    points.iter().copied().partition(|p| band.admits(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(zs: &[f32]) -> Vec<Point> {
        zs.iter()
            .enumerate()
            .map(|(i, &z)| Point::new(i as f32, 0.0, z, z * 10.0))
            .collect()
    }

    #[test]
    fn test_keep_is_closed_interval() {
        let points = column(&[0.5, 1.0, 1.5, 2.0, 2.5]);
        let filter = PassThrough::new(FilterField::Z, 1.0, 2.0, FilterMode::Keep);

        let kept = pass_through(&points, &filter);
        let zs: Vec<f32> = kept.iter().map(|p| p.z).collect();
        assert_eq!(zs, vec![1.0, 1.5, 2.0]);
    }

    #[test]
    fn test_reject_returns_outside_in_order() {
        let points = column(&[3.0, -1.0, 30.0, 2.0, 0.1]);
        let filter = PassThrough::new(FilterField::Z, 2.0, 25.0, FilterMode::Reject);

        let kept = pass_through(&points, &filter);
        let xs: Vec<f32> = kept.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![1.0, 2.0, 4.0]);
    }

    #[test]
    fn test_height_ceiling_can_be_empty() {
        let points = column(&[5.0, 6.0]);
        assert!(pass_through(&points, &PassThrough::height_ceiling(4.0)).is_empty());
        assert!(pass_through(&[], &PassThrough::height_ceiling(4.0)).is_empty());
    }

    #[test]
    fn test_split_by_intensity() {
        let points = column(&[1.0, 10.0, 20.0, 5.0]);
        let (reflective, rest) = split_by_field(&points, FilterField::Intensity, 90.0, 255.0);

        assert_eq!(reflective.len(), 2);
        assert_eq!(reflective[0].intensity, 100.0);
        assert_eq!(reflective[1].intensity, 200.0);
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].x, 0.0);
        assert_eq!(rest[1].x, 3.0);
    }

    #[test]
    fn test_non_finite_points_dropped_in_both_modes() {
        let points = vec![
            Point::new(0.0, 0.0, f32::NAN, 0.0),
            Point::new(f32::NAN, 3.0, 30.0, 0.0),
            Point::new(1.0, f32::INFINITY, 0.5, 0.0),
            Point::new(2.0, 2.0, 30.0, 0.0),
        ];
        let keep = PassThrough::new(FilterField::Z, -1.0, 1.0, FilterMode::Keep);
        let reject = PassThrough::new(FilterField::Z, 2.0, 25.0, FilterMode::Reject);

        assert!(pass_through(&points, &keep).is_empty());
        let kept = pass_through(&points, &reject);
        assert_eq!(kept, vec![Point::new(2.0, 2.0, 30.0, 0.0)]);
        assert_eq!(finite_only(&points), kept);
    }
}
