//! Frame data types shared by every pipeline stage.

use std::time::Duration;

/// A single lidar return.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Calibrated reflectivity of the return.
    pub intensity: f32,
}

impl Point {
    #[inline]
    pub fn new(x: f32, y: f32, z: f32, intensity: f32) -> Self {
        Self { x, y, z, intensity }
    }

    /// Coordinates as an array, the layout the k-d tree consumes.
    #[inline]
    pub fn coords(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Whether all three coordinates are finite. Dropped returns arrive as NaN.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// One full sensor rotation worth of points.
///
/// The last point of the rotation was sampled at `end_timestamp`; the first
/// one roughly `rotation_period` earlier.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub points: Vec<Point>,
    /// End of the rotation, microseconds.
    pub end_timestamp: u64,
    pub rotation_period: Duration,
}

impl Frame {
    pub fn new(points: Vec<Point>, end_timestamp: u64, rotation_period: Duration) -> Self {
        Self {
            points,
            end_timestamp,
            rotation_period,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Derives each frame's rotation period from consecutive end timestamps.
///
/// The first frame, a repeated timestamp and a timestamp that moves backwards
/// (sensor clock wrap or replay restart) all fall back to the nominal period.
#[derive(Debug, Clone)]
pub struct RotationClock {
    nominal: Duration,
    last_end: Option<u64>,
}

impl RotationClock {
    pub fn new(nominal: Duration) -> Self {
        Self {
            nominal,
            last_end: None,
        }
    }

    /// Record a new end-of-rotation timestamp and return its rotation period.
    pub fn observe(&mut self, end_timestamp: u64) -> Duration {
        let period = match self.last_end {
            Some(prev) if end_timestamp > prev => Duration::from_micros(end_timestamp - prev),
            _ => self.nominal,
        };
        self.last_end = Some(end_timestamp);
        period
    }

    /// Build a frame for `points` ending at `end_timestamp`.
    pub fn frame(&mut self, points: Vec<Point>, end_timestamp: u64) -> Frame {
        let period = self.observe(end_timestamp);
        Frame::new(points, end_timestamp, period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_clock_uses_delta_between_frames() {
        let mut clock = RotationClock::new(Duration::from_micros(100_000));
        assert_eq!(clock.observe(1_000_000), Duration::from_micros(100_000));
        assert_eq!(clock.observe(1_099_500), Duration::from_micros(99_500));
        assert_eq!(clock.observe(1_200_000), Duration::from_micros(100_500));
    }

    #[test]
    fn test_rotation_clock_falls_back_on_backwards_time() {
        let mut clock = RotationClock::new(Duration::from_micros(50));
        clock.observe(1_000);
        assert_eq!(clock.observe(400), Duration::from_micros(50));
        assert_eq!(clock.observe(400), Duration::from_micros(50));
        assert_eq!(clock.observe(480), Duration::from_micros(80));
    }

    #[test]
    fn test_frame_helpers() {
        let mut clock = RotationClock::new(Duration::from_micros(100));
        let frame = clock.frame(vec![Point::new(1.0, 2.0, 3.0, 4.0)], 1000);
        assert_eq!(frame.len(), 1);
        assert!(!frame.is_empty());
        assert_eq!(frame.points[0].coords(), [1.0, 2.0, 3.0]);
        assert_eq!(frame.rotation_period, Duration::from_micros(100));
    }

    #[test]
    fn test_point_is_finite() {
        assert!(Point::new(1.0, -2.0, 0.0, f32::NAN).is_finite());
        assert!(!Point::new(f32::NAN, 0.0, 0.0, 1.0).is_finite());
        assert!(!Point::new(0.0, f32::INFINITY, 0.0, 1.0).is_finite());
        assert!(!Point::new(0.0, 0.0, f32::NEG_INFINITY, 1.0).is_finite());
    }
}
