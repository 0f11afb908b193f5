//! Group shape for combining multiple shapes.

use super::{Shape, ShapeId, ShapeStyle, ShapeTrait};
use kurbo::{Affine, BezPath, Point, Rect, Vec2};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A group of shapes that moves as one unit.
///
/// Members are stored at offsets local to `position`, so moving the group only
/// touches `position`. Groups can nest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub(crate) id: ShapeId,
    /// Absolute position of the group origin (top-left of the members' bounds
    /// at grouping time).
    pub position: Point,
    /// Child shapes, in local coordinates.
    pub children: Vec<Shape>,
    style: ShapeStyle,
}

impl Group {
    /// Group shapes given in world coordinates.
    pub fn from_members(members: Vec<Shape>) -> Self {
        let origin = members
            .iter()
            .map(Shape::bounds)
            .reduce(|a, b| a.union(b))
            .map(|r| r.origin())
            .unwrap_or(Point::ZERO);
        let to_local = Point::ZERO - origin;
        let children = members
            .into_iter()
            .map(|mut m| {
                m.translate(to_local);
                m
            })
            .collect();
        Self {
            id: Uuid::new_v4(),
            position: origin,
            children,
            style: ShapeStyle::default(),
        }
    }

    /// Dissolve the group, returning members back in world coordinates.
    pub fn into_members(self) -> Vec<Shape> {
        let to_world = self.position.to_vec2();
        self.children
            .into_iter()
            .map(|mut m| {
                m.translate(to_world);
                m
            })
            .collect()
    }

    pub fn children(&self) -> &[Shape] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<Shape> {
        &mut self.children
    }

    fn offset(&self) -> Vec2 {
        self.position.to_vec2()
    }
}

impl ShapeTrait for Group {
    fn id(&self) -> ShapeId {
        self.id
    }

    fn bounds(&self) -> Rect {
        self.children
            .iter()
            .map(Shape::bounds)
            .reduce(|a, b| a.union(b))
            .map(|r| r + self.offset())
            .unwrap_or(Rect::ZERO)
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        let local = point - self.offset();
        self.children.iter().any(|c| c.hit_test(local, tolerance))
    }

    fn to_path(&self) -> BezPath {
        let to_world = Affine::translate(self.offset());
        let mut path = BezPath::new();
        for child in &self.children {
            path.extend(to_world * child.to_path());
        }
        path
    }

    fn style(&self) -> &ShapeStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut ShapeStyle {
        &mut self.style
    }

    fn transform(&mut self, affine: Affine) {
        self.position = affine * self.position;
        let [a, b, c, d, _, _] = affine.as_coeffs();
        let linear = Affine::new([a, b, c, d, 0.0, 0.0]);
        if linear != Affine::IDENTITY {
            for child in &mut self.children {
                child.transform(linear);
            }
        }
    }
}
