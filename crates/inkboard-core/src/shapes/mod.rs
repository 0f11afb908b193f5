//! Shape definitions for the design board.

mod ellipse;
mod freehand;
mod group;
mod image;
mod kanban;
mod line;
mod polygon;
mod rectangle;
mod sticky;
mod text;
mod triangle;

pub use ellipse::Ellipse;
pub use freehand::Freehand;
pub use group::Group;
pub use self::image::{Image, ImageFormat, ImageImportError, MAX_IMAGE_DISPLAY_SIZE};
pub use kanban::{Kanban, KanbanColumn};
pub use line::Line;
pub use polygon::{POLYGON_BASE_RADIUS, Polygon, PolygonKind};
pub use rectangle::Rectangle;
pub use sticky::Sticky;
pub use text::{FontDecoration, FontFamily, FontSlant, FontWeight, Text, TextAlign};
pub use triangle::Triangle;

use kurbo::{Affine, BezPath, Point, Rect, Vec2};
use peniko::Color;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }

    pub fn transparent() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Parse a CSS-style hex color (`#rgb`, `#rrggbb` or `#rrggbbaa`).
    ///
    /// Returns `None` for anything else, including named colors other than
    /// `transparent`.
    pub fn from_hex(color: &str) -> Option<Self> {
        let color = color.trim();
        if color.eq_ignore_ascii_case("transparent") {
            return Some(Self::transparent());
        }
        let hex = color.strip_prefix('#')?;
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            3 => {
                let r = channel(&hex[0..1])? * 17;
                let g = channel(&hex[1..2])? * 17;
                let b = channel(&hex[2..3])? * 17;
                Some(Self::new(r, g, b, 255))
            }
            6 => Some(Self::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                255,
            )),
            8 => Some(Self::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                channel(&hex[6..8])?,
            )),
            _ => None,
        }
    }

    /// Format as `#rrggbb`, or `#rrggbbaa` when not fully opaque.
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Style properties for shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeStyle {
    /// Stroke color.
    pub stroke_color: SerializableColor,
    /// Stroke width.
    pub stroke_width: f64,
    /// Fill color (None = no fill).
    pub fill_color: Option<SerializableColor>,
    /// Overall opacity (0.0 = fully transparent, 1.0 = fully opaque).
    #[serde(default = "default_opacity")]
    pub opacity: f64,
}

fn default_opacity() -> f64 {
    1.0
}

impl ShapeStyle {
    /// Get the stroke color as a peniko Color.
    pub fn stroke(&self) -> Color {
        self.stroke_color.into()
    }

    /// Get the fill color as a peniko Color.
    pub fn fill(&self) -> Option<Color> {
        self.fill_color.map(|c| c.into())
    }

    /// Set the stroke color from a peniko Color.
    pub fn set_stroke(&mut self, color: Color) {
        self.stroke_color = color.into();
    }

    /// Set the fill color from a peniko Color.
    pub fn set_fill(&mut self, color: Option<Color>) {
        self.fill_color = color.map(|c| c.into());
    }
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self {
            stroke_color: SerializableColor::black(),
            stroke_width: 2.0,
            fill_color: None,
            opacity: 1.0,
        }
    }
}

/// Partial style update applied to a selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StylePatch {
    pub stroke_color: Option<SerializableColor>,
    pub stroke_width: Option<f64>,
    /// `Some(None)` clears the fill.
    pub fill_color: Option<Option<SerializableColor>>,
    pub opacity: Option<f64>,
}

impl StylePatch {
    pub fn apply(&self, style: &mut ShapeStyle) {
        if let Some(color) = self.stroke_color {
            style.stroke_color = color;
        }
        if let Some(width) = self.stroke_width {
            style.stroke_width = width;
        }
        if let Some(fill) = self.fill_color {
            style.fill_color = fill;
        }
        if let Some(opacity) = self.opacity {
            style.opacity = opacity.clamp(0.0, 1.0);
        }
    }
}

/// Unique identifier for shapes in the live scene graph.
pub type ShapeId = Uuid;

/// Denormalized transform of a shape: the columns cached next to a persisted
/// object's payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Rotation in degrees.
    pub rotation: f64,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl Geometry {
    fn from_bounds(bounds: Rect, rotation_radians: f64) -> Self {
        Self {
            x: bounds.x0,
            y: bounds.y0,
            width: bounds.width(),
            height: bounds.height(),
            rotation: rotation_radians.to_degrees(),
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }
}

/// Distance from a point to a line segment (a→b).
pub fn point_to_segment_dist(point: Point, a: Point, b: Point) -> f64 {
    let seg = Vec2::new(b.x - a.x, b.y - a.y);
    let pv = Vec2::new(point.x - a.x, point.y - a.y);
    let len_sq = seg.hypot2();
    if len_sq < f64::EPSILON {
        return pv.hypot();
    }
    let t = (pv.dot(seg) / len_sq).clamp(0.0, 1.0);
    let proj = Point::new(a.x + t * seg.x, a.y + t * seg.y);
    ((point.x - proj.x).powi(2) + (point.y - proj.y).powi(2)).sqrt()
}

/// Minimum distance from a point to a polyline (sequence of connected segments).
pub fn point_to_polyline_dist(point: Point, points: &[Point]) -> f64 {
    points
        .windows(2)
        .map(|w| point_to_segment_dist(point, w[0], w[1]))
        .fold(f64::INFINITY, f64::min)
}

/// Bounding box of a point set, `Rect::ZERO` when empty.
pub(crate) fn points_bounds(points: &[Point]) -> Rect {
    let Some(first) = points.first() else {
        return Rect::ZERO;
    };
    points
        .iter()
        .skip(1)
        .fold(Rect::from_points(*first, *first), |acc, p| {
            acc.union_pt(*p)
        })
}

/// Common trait for all shapes.
pub trait ShapeTrait {
    /// Get the unique identifier.
    fn id(&self) -> ShapeId;

    /// Get the bounding box in world coordinates.
    fn bounds(&self) -> Rect;

    /// Check if a point (in world coordinates) hits this shape.
    fn hit_test(&self, point: Point, tolerance: f64) -> bool;

    /// Get the path representation for rendering.
    fn to_path(&self) -> BezPath;

    /// Get the style.
    fn style(&self) -> &ShapeStyle;

    /// Get mutable style.
    fn style_mut(&mut self) -> &mut ShapeStyle;

    /// Apply a transform to this shape.
    fn transform(&mut self, affine: Affine);
}

/// Enum wrapper for all shape types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Rectangle(Rectangle),
    Ellipse(Ellipse),
    Triangle(Triangle),
    Polygon(Polygon),
    Line(Line),
    Freehand(Freehand),
    Text(Text),
    Sticky(Sticky),
    Image(Image),
    Group(Group),
    Kanban(Kanban),
}

macro_rules! dispatch {
    ($self:expr, $s:ident => $body:expr) => {
        match $self {
            Shape::Rectangle($s) => $body,
            Shape::Ellipse($s) => $body,
            Shape::Triangle($s) => $body,
            Shape::Polygon($s) => $body,
            Shape::Line($s) => $body,
            Shape::Freehand($s) => $body,
            Shape::Text($s) => $body,
            Shape::Sticky($s) => $body,
            Shape::Image($s) => $body,
            Shape::Group($s) => $body,
            Shape::Kanban($s) => $body,
        }
    };
}

impl Shape {
    pub fn id(&self) -> ShapeId {
        dispatch!(self, s => s.id())
    }

    pub fn bounds(&self) -> Rect {
        dispatch!(self, s => s.bounds())
    }

    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        dispatch!(self, s => s.hit_test(point, tolerance))
    }

    pub fn to_path(&self) -> BezPath {
        dispatch!(self, s => s.to_path())
    }

    pub fn style(&self) -> &ShapeStyle {
        dispatch!(self, s => s.style())
    }

    pub fn style_mut(&mut self) -> &mut ShapeStyle {
        dispatch!(self, s => s.style_mut())
    }

    pub fn transform(&mut self, affine: Affine) {
        dispatch!(self, s => s.transform(affine))
    }

    /// Move the shape by a delta in world coordinates.
    pub fn translate(&mut self, delta: Vec2) {
        self.transform(Affine::translate(delta));
    }

    /// Test if this shape intersects a selection rectangle.
    pub fn intersects_rect(&self, rect: Rect) -> bool {
        match self {
            Shape::Line(l) => {
                rect.contains(l.start)
                    || rect.contains(l.end)
                    || rect.intersect(l.bounds().inflate(1.0, 1.0)).area() > 0.0
            }
            _ => rect.intersect(self.bounds().inflate(1.0, 1.0)).area() > 0.0,
        }
    }

    /// Check if this shape is a group.
    pub fn is_group(&self) -> bool {
        matches!(self, Shape::Group(_))
    }

    /// Get the group if this shape is a group.
    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Shape::Group(g) => Some(g),
            _ => None,
        }
    }

    /// Regenerate the shape's ID (and those of group members).
    /// Used when duplicating or pasting so copies never share an identity.
    pub fn regenerate_id(&mut self) {
        let new_id = Uuid::new_v4();
        if let Shape::Group(g) = self {
            for child in &mut g.children {
                child.regenerate_id();
            }
        }
        dispatch!(self, s => s.id = new_id);
    }

    /// Get the rotation angle in radians (0 for shapes that don't support rotation).
    pub fn rotation(&self) -> f64 {
        match self {
            Shape::Rectangle(r) => r.rotation,
            Shape::Ellipse(e) => e.rotation,
            Shape::Triangle(t) => t.rotation,
            Shape::Polygon(p) => p.rotation,
            Shape::Text(t) => t.rotation,
            Shape::Sticky(s) => s.rotation,
            Shape::Image(i) => i.rotation,
            _ => 0.0,
        }
    }

    /// Set the rotation angle in radians. Ignored by shapes without rotation.
    pub fn set_rotation(&mut self, rotation: f64) {
        match self {
            Shape::Rectangle(r) => r.rotation = rotation,
            Shape::Ellipse(e) => e.rotation = rotation,
            Shape::Triangle(t) => t.rotation = rotation,
            Shape::Polygon(p) => p.rotation = rotation,
            Shape::Text(t) => t.rotation = rotation,
            Shape::Sticky(s) => s.rotation = rotation,
            Shape::Image(i) => i.rotation = rotation,
            _ => {}
        }
    }

    /// Read the denormalized transform off the live shape.
    pub fn geometry(&self) -> Geometry {
        match self {
            Shape::Rectangle(r) => Geometry {
                x: r.position.x,
                y: r.position.y,
                width: r.width,
                height: r.height,
                rotation: r.rotation.to_degrees(),
                scale_x: 1.0,
                scale_y: 1.0,
            },
            Shape::Triangle(t) => Geometry {
                x: t.position.x,
                y: t.position.y,
                width: t.width,
                height: t.height,
                rotation: t.rotation.to_degrees(),
                scale_x: 1.0,
                scale_y: 1.0,
            },
            Shape::Polygon(p) => Geometry {
                scale_x: p.scale_x,
                scale_y: p.scale_y,
                ..Geometry::from_bounds(p.bounds(), p.rotation)
            },
            Shape::Image(i) => Geometry {
                x: i.position.x,
                y: i.position.y,
                width: i.source_width as f64,
                height: i.source_height as f64,
                rotation: i.rotation.to_degrees(),
                scale_x: i.scale,
                scale_y: i.scale,
            },
            other => Geometry::from_bounds(other.bounds(), other.rotation()),
        }
    }
}
