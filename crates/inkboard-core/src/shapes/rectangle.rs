//! Rectangle drawn with the rectangle tool.

use super::{ShapeId, ShapeStyle, ShapeTrait};
use kurbo::{Affine, BezPath, Point, Rect, Shape as KurboShape};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A box on the board. `position` is the top-left corner of the unrotated
/// frame; rotation turns the frame about its centre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub(crate) id: ShapeId,
    pub position: Point,
    pub width: f64,
    pub height: f64,
    /// Radians.
    #[serde(default)]
    pub rotation: f64,
    pub style: ShapeStyle,
}

impl Rectangle {
    pub fn new(position: Point, width: f64, height: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            position,
            width,
            height,
            rotation: 0.0,
            style: ShapeStyle::default(),
        }
    }

    /// Span the drag from `anchor` to `cursor`, in any direction.
    pub fn set_corners(&mut self, anchor: Point, cursor: Point) {
        let frame = Rect::from_points(anchor, cursor);
        self.position = frame.origin();
        self.width = frame.width();
        self.height = frame.height();
    }

    /// The unrotated frame.
    pub fn frame(&self) -> Rect {
        Rect::from_origin_size(self.position, (self.width, self.height))
    }

    fn rotation_about_centre(&self, angle: f64) -> Affine {
        Affine::rotate_about(angle, self.frame().center())
    }
}

impl ShapeTrait for Rectangle {
    fn id(&self) -> ShapeId {
        self.id
    }

    fn bounds(&self) -> Rect {
        if self.rotation == 0.0 {
            self.frame()
        } else {
            self.to_path().bounding_box()
        }
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        // Test in the frame's own axes
        let local = self.rotation_about_centre(-self.rotation) * point;
        let frame = self.frame();
        let reach = tolerance + self.style.stroke_width / 2.0;
        if !frame.inflate(reach, reach).contains(local) {
            return false;
        }
        // A box thinner than the reach is all outline
        self.style.fill_color.is_some() || !frame.inflate(-reach, -reach).contains(local)
    }

    fn to_path(&self) -> BezPath {
        let path = self.frame().to_path(0.1);
        if self.rotation == 0.0 {
            path
        } else {
            self.rotation_about_centre(self.rotation) * path
        }
    }

    fn style(&self) -> &ShapeStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut ShapeStyle {
        &mut self.style
    }

    fn transform(&mut self, affine: Affine) {
        let [sx, _, _, sy, _, _] = affine.as_coeffs();
        self.position = affine * self.position;
        self.width *= sx.abs();
        self.height *= sy.abs();
    }
}
