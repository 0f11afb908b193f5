//! Sticky note.

use super::{SerializableColor, ShapeId, ShapeStyle, ShapeTrait};
use kurbo::{Affine, BezPath, Point, Rect, Shape as KurboShape};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A coloured note with text on it. Persisted as a `sticky-group`: the note
/// and its text move as one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sticky {
    pub(crate) id: ShapeId,
    pub position: Point,
    pub width: f64,
    pub height: f64,
    /// Paper colour.
    pub color: SerializableColor,
    pub text: String,
    pub font_size: f64,
    #[serde(default)]
    pub rotation: f64,
    pub style: ShapeStyle,
}

impl Sticky {
    pub const DEFAULT_SIZE: f64 = 200.0;
    pub const DEFAULT_FONT_SIZE: f64 = 18.0;

    pub fn new(position: Point, color: SerializableColor) -> Self {
        Self {
            id: Uuid::new_v4(),
            position,
            width: Self::DEFAULT_SIZE,
            height: Self::DEFAULT_SIZE,
            color,
            text: String::new(),
            font_size: Self::DEFAULT_FONT_SIZE,
            rotation: 0.0,
            style: ShapeStyle {
                fill_color: Some(color),
                stroke_width: 0.0,
                ..ShapeStyle::default()
            },
        }
    }

    pub fn as_rect(&self) -> Rect {
        Rect::from_origin_size(self.position, (self.width, self.height))
    }
}

impl ShapeTrait for Sticky {
    fn id(&self) -> ShapeId {
        self.id
    }

    fn bounds(&self) -> Rect {
        self.as_rect()
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        // Paper is always opaque
        self.as_rect().inflate(tolerance, tolerance).contains(point)
    }

    fn to_path(&self) -> BezPath {
        self.as_rect().to_path(0.1)
    }

    fn style(&self) -> &ShapeStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut ShapeStyle {
        &mut self.style
    }

    fn transform(&mut self, affine: Affine) {
        self.position = affine * self.position;
        let scale = affine.as_coeffs();
        self.width *= scale[0].abs();
        self.height *= scale[3].abs();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sticky_is_square_and_filled() {
        let yellow = SerializableColor::new(255, 235, 59, 255);
        let note = Sticky::new(Point::new(10.0, 10.0), yellow);
        assert!((note.width - note.height).abs() < f64::EPSILON);
        assert_eq!(note.style.fill_color, Some(yellow));
        assert!(note.hit_test(Point::new(110.0, 110.0), 0.0));
    }
}
