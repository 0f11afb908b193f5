//! Shape factory: builds shapes from the active tool, pointer coordinates and
//! the current board settings.
//!
//! Style values are copied into the shape at creation time. Later settings
//! changes never reach shapes that already exist.

use crate::settings::BoardSettings;
use crate::shapes::{
    Ellipse, Freehand, Image, ImageImportError, Kanban, Line, Polygon, PolygonKind, Rectangle,
    Shape, Sticky, Text, Triangle,
};
use crate::tools::ToolKind;
use kurbo::Point;

/// Stroke width multiplier for the eraser brush relative to the pen.
pub const ERASER_WIDTH_MULTIPLIER: f64 = 2.0;

pub struct ShapeFactory<'a> {
    settings: &'a BoardSettings,
}

impl<'a> ShapeFactory<'a> {
    pub fn new(settings: &'a BoardSettings) -> Self {
        Self { settings }
    }

    /// Provisional zero-size shape for a drag-to-size tool.
    ///
    /// Returns `None` for tools that do not size a shape by dragging.
    pub fn begin_drag(&self, tool: ToolKind, at: Point) -> Option<Shape> {
        let style = self.settings.shape_style();
        let mut shape = match tool {
            ToolKind::Rectangle => Shape::Rectangle(Rectangle::new(at, 0.0, 0.0)),
            ToolKind::Ellipse => Shape::Ellipse(Ellipse::new(at, 0.0, 0.0)),
            ToolKind::Triangle => Shape::Triangle(Triangle::new(at, 0.0, 0.0)),
            ToolKind::Line => Shape::Line(Line::new(at, at)),
            ToolKind::Star => Shape::Polygon(zero_polygon(PolygonKind::Star, at)),
            ToolKind::Hexagon => Shape::Polygon(zero_polygon(PolygonKind::Hexagon, at)),
            ToolKind::Diamond => Shape::Polygon(zero_polygon(PolygonKind::Diamond, at)),
            ToolKind::Arrow => Shape::Polygon(zero_polygon(PolygonKind::Arrow, at)),
            _ => return None,
        };
        *shape.style_mut() = style;
        Some(shape)
    }

    /// Grow a provisional shape to span `start`..`current`.
    ///
    /// Box shapes sign-correct so a drag up or left moves the top-left corner.
    /// Polygons keep their point list and change scale only.
    pub fn resize(shape: &mut Shape, start: Point, current: Point) {
        match shape {
            Shape::Rectangle(r) => r.set_corners(start, current),
            Shape::Ellipse(e) => e.set_corners(start, current),
            Shape::Triangle(t) => t.set_corners(start, current),
            Shape::Polygon(p) => p.set_corners(start, current),
            Shape::Line(l) => {
                l.start = start;
                l.end = current;
            }
            _ => {}
        }
    }

    /// Object created immediately by a one-shot tool.
    ///
    /// Image placement needs file bytes first and goes through [`Self::image`].
    pub fn place(&self, tool: ToolKind, at: Point) -> Option<Shape> {
        let s = self.settings;
        match tool {
            ToolKind::Text => {
                let mut text = Text::new(at, String::new()).with_font_size(s.font_size);
                text.font_family = s.font_family;
                text.font_weight = s.font_weight;
                text.font_slant = s.font_slant;
                text.decoration = s.font_decoration;
                text.align = s.text_align;
                text.color = s.text_color;
                Some(Shape::Text(text))
            }
            ToolKind::Sticky => {
                let mut note = Sticky::new(at, s.sticky_color);
                let extent = s.shape_size.extent();
                note.width = extent;
                note.height = extent;
                note.font_size = s.font_size;
                Some(Shape::Sticky(note))
            }
            ToolKind::Kanban => Some(Shape::Kanban(Kanban::new(at))),
            _ => None,
        }
    }

    /// Start a pen stroke, or an eraser stroke painted in the background color.
    pub fn stroke(&self, start: Point, eraser: bool) -> Freehand {
        let mut stroke = Freehand::new(start);
        stroke.style = self.settings.pen_style();
        if eraser {
            stroke.style.stroke_color = self.settings.background_color;
            stroke.style.stroke_width *= ERASER_WIDTH_MULTIPLIER;
            stroke.eraser = true;
        }
        stroke
    }

    /// Decode picked file bytes into an image placed with its top-left at `at`.
    pub fn image(&self, at: Point, bytes: &[u8]) -> Result<Shape, ImageImportError> {
        Image::decode(at, bytes).map(Shape::Image)
    }
}

fn zero_polygon(kind: PolygonKind, at: Point) -> Polygon {
    let mut polygon = Polygon::new(kind, at);
    polygon.scale_x = 0.0;
    polygon.scale_y = 0.0;
    polygon
}
