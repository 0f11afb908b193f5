//! View transform between screen and world coordinates.

use kurbo::{Affine, Point, Vec2};
use serde::{Deserialize, Serialize};

pub const MIN_ZOOM: f64 = 0.1;
pub const MAX_ZOOM: f64 = 10.0;

/// Pan offset plus zoom. World coordinates are what shapes and persisted
/// records use; screen coordinates are what pointer events arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Screen-space translation.
    pub offset: Vec2,
    /// 1.0 = 100%.
    pub zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            zoom: 1.0,
        }
    }
}

impl Camera {
    /// World to screen.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.offset) * Affine::scale(self.zoom)
    }

    pub fn screen_to_world(&self, screen: Point) -> Point {
        self.transform().inverse() * screen
    }

    pub fn world_to_screen(&self, world: Point) -> Point {
        self.transform() * world
    }

    /// Pan by a screen-space delta.
    pub fn pan(&mut self, delta: Vec2) {
        self.offset += delta;
    }

    /// Set the zoom factor, clamped, keeping `anchor` (screen space) fixed.
    pub fn zoom_to(&mut self, zoom: f64, anchor: Point) {
        let zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        let world = self.screen_to_world(anchor);
        self.zoom = zoom;
        self.offset += anchor - self.world_to_screen(world);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_to_world_with_offset_and_zoom() {
        let camera = Camera {
            offset: Vec2::new(50.0, 100.0),
            zoom: 2.0,
        };
        let world = camera.screen_to_world(Point::new(150.0, 300.0));
        assert!((world.x - 50.0).abs() < 1e-10);
        assert!((world.y - 100.0).abs() < 1e-10);
        let back = camera.world_to_screen(world);
        assert!((back.x - 150.0).abs() < 1e-10);
    }

    #[test]
    fn test_zoom_keeps_anchor_fixed() {
        let mut camera = Camera::default();
        let anchor = Point::new(200.0, 120.0);
        let before = camera.screen_to_world(anchor);
        camera.zoom_to(3.0, anchor);
        let after = camera.screen_to_world(anchor);
        assert!((before.x - after.x).abs() < 1e-9);
        assert!((before.y - after.y).abs() < 1e-9);
    }

    #[test]
    fn test_zoom_clamped() {
        let mut camera = Camera::default();
        camera.zoom_to(0.0001, Point::ZERO);
        assert!((camera.zoom - MIN_ZOOM).abs() < f64::EPSILON);
        camera.zoom_to(1e6, Point::ZERO);
        assert!((camera.zoom - MAX_ZOOM).abs() < f64::EPSILON);
    }
}
