//! Grid snapping for placement points.

use crate::settings::BoardSettings;
use kurbo::Point;

/// Round a point to the nearest grid intersection.
pub fn snap_to_grid(point: Point, grid_size: f64) -> Point {
    if grid_size <= 0.0 {
        return point;
    }
    Point::new(
        (point.x / grid_size).round() * grid_size,
        (point.y / grid_size).round() * grid_size,
    )
}

/// Snap only when the board has snapping turned on.
pub fn snap_point(point: Point, settings: &BoardSettings) -> Point {
    if settings.snap_to_grid {
        snap_to_grid(point, settings.grid_size)
    } else {
        point
    }
}
