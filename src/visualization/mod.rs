//! Visualization tools for processed frames.
//!
//! Renders a top-down (x vs y) PNG of a frame's object points with the
//! footprint of every measured box drawn as a rectangle outline.

use std::path::Path;

use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::core::frame::Point;
use crate::pipeline::table::MeasurementTable;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Nothing to draw")]
    EmptyFrame,
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Default plot width in pixels.
const DEFAULT_WIDTH: u32 = 1280;

/// Default plot height in pixels.
const DEFAULT_HEIGHT: u32 = 1280;

/// Box outline colors, cycled by slot.
const BOX_COLORS: &[(u8, u8, u8)] = &[
    (228, 26, 28),   // Red
    (55, 126, 184),  // Blue
    (77, 175, 74),   // Green
    (152, 78, 163),  // Purple
    (255, 127, 0),   // Orange
    (166, 86, 40),   // Brown
    (247, 129, 191), // Pink
    (0, 206, 209),   // Turquoise
];

/// Object point color.
const POINT_COLOR: (u8, u8, u8) = (100, 149, 237);

/// Plot a frame's object points and measured boxes as a PNG.
///
/// # Arguments
///
/// * `output_path` - Path to save the PNG image
/// * `objects` - Non-ground points of the frame
/// * `table` - Measurement table of the same frame
/// * `max_points` - Maximum number of points to plot (subsamples if exceeded)
pub fn plot_frame(
    output_path: &Path,
    objects: &[Point],
    table: &MeasurementTable,
    max_points: usize,
) -> Result<()> {
    if objects.is_empty() && table.is_vacant() {
        return Err(VisualizationError::EmptyFrame);
    }

    let step = (objects.len() / max_points.max(1)).max(1);
    let points: Vec<(f32, f32)> = objects.iter().step_by(step).map(|p| (p.x, p.y)).collect();

    let mut extents: Vec<(f32, f32)> = points.clone();
    for m in table.occupied() {
        extents.push((m.box_min[0], m.box_min[1]));
        extents.push((m.box_max[0], m.box_max[1]));
    }

    let (x_min, x_max, y_min, y_max) = compute_bounds(&extents);
    let x_padding = (x_max - x_min) * 0.05;
    let y_padding = (y_max - y_min) * 0.05;

    let root = BitMapBackend::new(output_path, (DEFAULT_WIDTH, DEFAULT_HEIGHT))
        .into_drawing_area();

    root.fill(&WHITE).map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(
            (x_min - x_padding)..(x_max + x_padding),
            (y_min - y_padding)..(y_max + y_padding),
        )
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .draw()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let point_color = RGBColor(POINT_COLOR.0, POINT_COLOR.1, POINT_COLOR.2);
    chart
        .draw_series(points.iter().map(|&(x, y)| Circle::new((x, y), 2, point_color.filled())))
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .draw_series(table.occupied().map(|m| {
            let c = BOX_COLORS[m.slot_id % BOX_COLORS.len()];
            Rectangle::new(
                [(m.box_min[0], m.box_min[1]), (m.box_max[0], m.box_max[1])],
                RGBColor(c.0, c.1, c.2).stroke_width(2),
            )
        }))
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    // Sensor origin
    chart
        .draw_series(std::iter::once(Cross::new((0.0f32, 0.0f32), 6, BLACK.stroke_width(2))))
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    root.present().map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    Ok(())
}

/// Compute the bounds (min/max) for x and y coordinates, always including the origin.
fn compute_bounds(points: &[(f32, f32)]) -> (f32, f32, f32, f32) {
    let mut x_min = 0.0f32;
    let mut x_max = 0.0f32;
    let mut y_min = 0.0f32;
    let mut y_max = 0.0f32;

    for &(x, y) in points {
        if !x.is_finite() || !y.is_finite() {
            continue;
        }
        x_min = x_min.min(x);
        x_max = x_max.max(x);
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }

    if (x_max - x_min).abs() < f32::EPSILON {
        x_min -= 1.0;
        x_max += 1.0;
    }
    if (y_max - y_min).abs() < f32::EPSILON {
        y_min -= 1.0;
        y_max += 1.0;
    }

    (x_min, x_max, y_min, y_max)
}
