//! Point-list polygons: star, hexagon, diamond and block arrow.
//!
//! The outline is computed once from [`POLYGON_BASE_RADIUS`] and kept in
//! local coordinates. Sizing a polygon only changes its scale factors.

use super::{ShapeId, ShapeStyle, ShapeTrait, point_to_polyline_dist, points_bounds};
use kurbo::{Affine, BezPath, Point, Rect, Vec2};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};
use uuid::Uuid;

/// Radius the local outline is built at.
pub const POLYGON_BASE_RADIUS: f64 = 50.0;

/// Inner/outer radius ratio of the star.
const STAR_INNER_RATIO: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolygonKind {
    Star,
    Hexagon,
    Diamond,
    /// Right-pointing block arrow.
    Arrow,
}

impl PolygonKind {
    /// Outline around the origin at the given radius.
    pub fn outline(self, r: f64) -> Vec<Point> {
        match self {
            PolygonKind::Star => (0..10)
                .map(|i| {
                    let radius = if i % 2 == 0 { r } else { r * STAR_INNER_RATIO };
                    let angle = -FRAC_PI_2 + i as f64 * PI / 5.0;
                    Point::new(radius * angle.cos(), radius * angle.sin())
                })
                .collect(),
            PolygonKind::Hexagon => (0..6)
                .map(|i| {
                    let angle = i as f64 * PI / 3.0;
                    Point::new(r * angle.cos(), r * angle.sin())
                })
                .collect(),
            PolygonKind::Diamond => vec![
                Point::new(0.0, -r),
                Point::new(r, 0.0),
                Point::new(0.0, r),
                Point::new(-r, 0.0),
            ],
            PolygonKind::Arrow => vec![
                Point::new(-r, -0.3 * r),
                Point::new(0.2 * r, -0.3 * r),
                Point::new(0.2 * r, -0.6 * r),
                Point::new(r, 0.0),
                Point::new(0.2 * r, 0.6 * r),
                Point::new(0.2 * r, 0.3 * r),
                Point::new(-r, 0.3 * r),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub(crate) id: ShapeId,
    pub kind: PolygonKind,
    /// World position of the local origin.
    pub center: Point,
    /// Outline relative to `center`, before scaling.
    pub points: Vec<Point>,
    pub scale_x: f64,
    pub scale_y: f64,
    /// Rotation angle in radians (around center).
    #[serde(default)]
    pub rotation: f64,
    pub style: ShapeStyle,
}

impl Polygon {
    pub fn new(kind: PolygonKind, center: Point) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            center,
            points: kind.outline(POLYGON_BASE_RADIUS),
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
            style: ShapeStyle::default(),
        }
    }

    /// Fit the polygon into the box spanned by two drag points by rescaling.
    pub fn set_corners(&mut self, p1: Point, p2: Point) {
        let diameter = 2.0 * POLYGON_BASE_RADIUS;
        self.center = p1.midpoint(p2);
        self.scale_x = (p2.x - p1.x).abs() / diameter;
        self.scale_y = (p2.y - p1.y).abs() / diameter;
    }

    fn local_to_world(&self) -> Affine {
        Affine::translate(self.center.to_vec2())
            * Affine::rotate(self.rotation)
            * Affine::scale_non_uniform(self.scale_x, self.scale_y)
    }

    /// Outline in world coordinates.
    pub fn world_points(&self) -> Vec<Point> {
        let to_world = self.local_to_world();
        self.points.iter().map(|p| to_world * *p).collect()
    }

    fn contains(&self, point: Point, outline: &[Point]) -> bool {
        // Even-odd ray casting
        let mut inside = false;
        let mut j = outline.len().wrapping_sub(1);
        for (i, pi) in outline.iter().enumerate() {
            let pj = outline[j];
            if (pi.y > point.y) != (pj.y > point.y)
                && point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

impl ShapeTrait for Polygon {
    fn id(&self) -> ShapeId {
        self.id
    }

    fn bounds(&self) -> Rect {
        points_bounds(&self.world_points())
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        let mut outline = self.world_points();
        if outline.is_empty() {
            return false;
        }
        if self.style.fill_color.is_some() && self.contains(point, &outline) {
            return true;
        }
        outline.push(outline[0]);
        point_to_polyline_dist(point, &outline) <= tolerance + self.style.stroke_width / 2.0
    }

    fn to_path(&self) -> BezPath {
        let mut path = BezPath::new();
        let mut iter = self.world_points().into_iter();
        if let Some(first) = iter.next() {
            path.move_to(first);
            for p in iter {
                path.line_to(p);
            }
            path.close_path();
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
        self.center = affine * self.center;
        let coeffs = affine.as_coeffs();
        self.scale_x *= Vec2::new(coeffs[0], coeffs[1]).hypot();
        self.scale_y *= Vec2::new(coeffs[2], coeffs[3]).hypot();
    }
}
