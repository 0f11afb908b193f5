//! Kanban sub-board: titled columns of text cards.

use super::{ShapeId, ShapeStyle, ShapeTrait};
use kurbo::{Affine, BezPath, Point, Rect, Shape as KurboShape};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KanbanColumn {
    pub title: String,
    #[serde(default)]
    pub cards: Vec<String>,
}

impl KanbanColumn {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            cards: Vec::new(),
        }
    }
}

/// A kanban board placed on the canvas. Persisted as a `kanban-group`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kanban {
    pub(crate) id: ShapeId,
    pub position: Point,
    pub columns: Vec<KanbanColumn>,
    pub column_width: f64,
    pub height: f64,
    pub style: ShapeStyle,
}

impl Kanban {
    pub const DEFAULT_COLUMN_WIDTH: f64 = 200.0;
    pub const DEFAULT_HEIGHT: f64 = 300.0;

    /// A board with the usual To Do / In Progress / Done columns.
    pub fn new(position: Point) -> Self {
        Self {
            id: Uuid::new_v4(),
            position,
            columns: ["To Do", "In Progress", "Done"]
                .into_iter()
                .map(KanbanColumn::new)
                .collect(),
            column_width: Self::DEFAULT_COLUMN_WIDTH,
            height: Self::DEFAULT_HEIGHT,
            style: ShapeStyle::default(),
        }
    }

    pub fn width(&self) -> f64 {
        self.columns.len().max(1) as f64 * self.column_width
    }

    /// Append a card to a column. Returns false if the column does not exist.
    pub fn add_card(&mut self, column: usize, text: impl Into<String>) -> bool {
        match self.columns.get_mut(column) {
            Some(col) => {
                col.cards.push(text.into());
                true
            }
            None => false,
        }
    }

    /// Move a card between columns, appending it to the target.
    pub fn move_card(&mut self, from: usize, card: usize, to: usize) -> bool {
        if to >= self.columns.len() {
            return false;
        }
        let Some(col) = self.columns.get_mut(from) else {
            return false;
        };
        if card >= col.cards.len() {
            return false;
        }
        let text = col.cards.remove(card);
        self.columns[to].cards.push(text);
        true
    }

    fn as_rect(&self) -> Rect {
        Rect::from_origin_size(self.position, (self.width(), self.height))
    }
}

impl ShapeTrait for Kanban {
    fn id(&self) -> ShapeId {
        self.id
    }

    fn bounds(&self) -> Rect {
        self.as_rect()
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        self.as_rect().inflate(tolerance, tolerance).contains(point)
    }

    fn to_path(&self) -> BezPath {
        let rect = self.as_rect();
        let mut path = rect.to_path(0.1);
        // Column dividers
        for i in 1..self.columns.len() {
            let x = rect.x0 + i as f64 * self.column_width;
            path.move_to(Point::new(x, rect.y0));
            path.line_to(Point::new(x, rect.y1));
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
        let scale = affine.as_coeffs();
        self.column_width *= scale[0].abs();
        self.height *= scale[3].abs();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_columns() {
        let board = Kanban::new(Point::ZERO);
        let titles: Vec<_> = board.columns.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, ["To Do", "In Progress", "Done"]);
        assert!((board.bounds().width() - 600.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_move_card() {
        let mut board = Kanban::new(Point::ZERO);
        assert!(board.add_card(0, "Write tests"));
        assert!(!board.add_card(7, "nowhere"));
        assert!(board.move_card(0, 0, 2));
        assert!(board.columns[0].cards.is_empty());
        assert_eq!(board.columns[2].cards, ["Write tests"]);
        assert!(!board.move_card(0, 0, 1));
    }
}
