//! Scan-synchronized timestamp correction.
//!
//! A spinning sensor sweeps one full rotation over `rotation_period`,
//! finishing at the frame's `end_timestamp`. A return seen at azimuth `a`
//! (measured from the start-of-rotation reference) was therefore captured at
//!
//! ```text
//! corrected = end_timestamp - rotation_period * (2π - a) / 2π
//! ```
//!
//! Azimuth is `atan2(x, y)`: zero along +y, increasing towards +x.

use std::f32::consts::TAU;
use std::time::Duration;

/// Reduce an angle into `[0, 2π)`.
#[inline]
pub fn normalize_azimuth(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Azimuth of a horizontal position, normalized into `[0, 2π)`.
#[inline]
pub fn azimuth(x: f32, y: f32) -> f32 {
    normalize_azimuth(x.atan2(y))
}

/// Capture time of a sample at `azimuth` within a rotation ending at `end_timestamp`.
///
/// Timestamps are microseconds. The offset is rounded to the nearest
/// microsecond and the subtraction saturates at zero.
pub fn corrected_time(end_timestamp: u64, rotation_period: Duration, azimuth: f32) -> u64 {
    let a = f64::from(normalize_azimuth(azimuth));
    let full = std::f64::consts::TAU;
    let period_us = rotation_period.as_secs_f64() * 1e6;
    let offset = (period_us * (full - a) / full).round();
    end_timestamp.saturating_sub(offset as u64)
}
