//! Ellipse drawn with the ellipse tool.

use super::{ShapeId, ShapeStyle, ShapeTrait};
use kurbo::{Affine, BezPath, Ellipse as KurboEllipse, Point, Rect, Shape as KurboShape, Vec2};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An ellipse inscribed in the box the user dragged out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ellipse {
    pub(crate) id: ShapeId,
    pub center: Point,
    pub radius_x: f64,
    pub radius_y: f64,
    /// Radians, about the centre.
    #[serde(default)]
    pub rotation: f64,
    pub style: ShapeStyle,
}

/// Where `offset` falls relative to an axis-aligned ellipse with radii
/// `radii`: below 1 inside, above 1 outside.
fn reach(offset: Vec2, radii: Vec2) -> f64 {
    (offset.x / radii.x).powi(2) + (offset.y / radii.y).powi(2)
}

impl Ellipse {
    pub fn new(center: Point, radius_x: f64, radius_y: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            center,
            radius_x,
            radius_y,
            rotation: 0.0,
            style: ShapeStyle::default(),
        }
    }

    /// Inscribe in the box from `anchor` to `cursor`, in any direction.
    pub fn set_corners(&mut self, anchor: Point, cursor: Point) {
        let frame = Rect::from_points(anchor, cursor);
        self.center = frame.center();
        self.radius_x = frame.width() / 2.0;
        self.radius_y = frame.height() / 2.0;
    }

    fn outline(&self) -> KurboEllipse {
        KurboEllipse::new(self.center, (self.radius_x, self.radius_y), self.rotation)
    }
}

impl ShapeTrait for Ellipse {
    fn id(&self) -> ShapeId {
        self.id
    }

    fn bounds(&self) -> Rect {
        if self.rotation == 0.0 {
            Rect::from_center_size(self.center, (2.0 * self.radius_x, 2.0 * self.radius_y))
        } else {
            self.outline().bounding_box()
        }
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        let offset = (Affine::rotate(-self.rotation) * (point - self.center).to_point()).to_vec2();
        let margin = tolerance + self.style.stroke_width / 2.0;
        let radii = Vec2::new(self.radius_x, self.radius_y);
        if reach(offset, radii + Vec2::new(margin, margin)) > 1.0 {
            return false;
        }
        if self.style.fill_color.is_some() {
            return true;
        }
        let hole = radii - Vec2::new(margin, margin);
        // Too thin to have a hole
        hole.x <= 0.0 || hole.y <= 0.0 || reach(offset, hole) > 1.0
    }

    fn to_path(&self) -> BezPath {
        self.outline().to_path(0.1)
    }

    fn style(&self) -> &ShapeStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut ShapeStyle {
        &mut self.style
    }

    fn transform(&mut self, affine: Affine) {
        let [sx, _, _, sy, _, _] = affine.as_coeffs();
        self.center = affine * self.center;
        self.radius_x *= sx.abs();
        self.radius_y *= sy.abs();
    }
}
