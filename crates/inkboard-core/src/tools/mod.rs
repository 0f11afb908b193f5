//! Tool state machine.
//!
//! Exactly one tool is active. Pointer events run through the active tool's
//! gesture and come back as [`ToolAction`]s for the canvas to apply.

use crate::factory::ShapeFactory;
use crate::settings::BoardSettings;
use crate::shapes::{Freehand, Shape};
use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// Drag-to-size shapes smaller than this in both dimensions are dropped on
/// commit instead of being added as degenerate objects.
pub const MIN_COMMIT_SIZE: f64 = 1.0;

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ToolKind {
    #[default]
    Select,
    Pan,
    #[serde(rename = "freehand-draw")]
    Draw,
    Erase,
    #[serde(rename = "rect")]
    Rectangle,
    Ellipse,
    Triangle,
    Star,
    Hexagon,
    Diamond,
    Line,
    Arrow,
    Text,
    Sticky,
    Image,
    Kanban,
}

impl ToolKind {
    /// Tools whose shape grows between pointer-down and pointer-up.
    pub fn is_drag_to_size(self) -> bool {
        matches!(
            self,
            ToolKind::Rectangle
                | ToolKind::Ellipse
                | ToolKind::Triangle
                | ToolKind::Star
                | ToolKind::Hexagon
                | ToolKind::Diamond
                | ToolKind::Line
                | ToolKind::Arrow
        )
    }

    /// Tools that place their object on pointer-down and hand control back
    /// to the select tool.
    pub fn is_one_shot(self) -> bool {
        matches!(
            self,
            ToolKind::Text | ToolKind::Sticky | ToolKind::Image | ToolKind::Kanban
        )
    }

    /// Continuous-stroke tools.
    pub fn is_stroke(self) -> bool {
        matches!(self, ToolKind::Draw | ToolKind::Erase)
    }
}

/// Pointer position in both spaces. Panning works in screen space because the
/// world moves underneath the pointer while it happens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerInput {
    pub screen: Point,
    pub world: Point,
    pub shift: bool,
}

/// Gesture in progress.
#[derive(Debug, Clone, Default)]
pub enum ToolState {
    #[default]
    Idle,
    Panning { last: Point },
    /// Select tool dragging the current selection from `start`.
    Moving { start: Point, last: Point, moved: bool },
    /// Select tool drawing a selection rectangle.
    Marquee { start: Point, current: Point, additive: bool },
    Stroking { stroke: Freehand },
    Sizing { start: Point, shape: Shape },
}

/// What the canvas has to do in response to a pointer event.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolAction {
    None,
    /// Shift the camera by a screen-space delta.
    Pan(Vec2),
    /// Move the selection by a world-space delta.
    MoveSelection(Vec2),
    /// Selection drag finished; `moved` is false for a plain click.
    MoveFinished { moved: bool },
    MarqueeChanged(Rect),
    MarqueeFinished { rect: Rect, additive: bool },
    /// Provisional shape or stroke changed; see [`ToolManager::preview`].
    Preview,
    /// Drag-to-size shape or stroke finished.
    Commit(Shape),
    /// One-shot object created; the active tool is back to select.
    Placed(Shape),
    /// Image tool clicked; the host should pick a file and call back with the
    /// bytes. The active tool is back to select.
    RequestImage(Point),
}

/// Owns the active tool and its in-progress gesture.
#[derive(Debug, Clone, Default)]
pub struct ToolManager {
    current_tool: ToolKind,
    state: ToolState,
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_tool(&self) -> ToolKind {
        self.current_tool
    }

    pub fn state(&self) -> &ToolState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, ToolState::Idle)
    }

    /// Switch tools. A gesture still in progress is finalized as if the
    /// pointer had been released where it last was.
    pub fn set_tool(&mut self, tool: ToolKind) -> ToolAction {
        let pending = self.finish();
        self.current_tool = tool;
        pending
    }

    /// The provisional shape being sized or stroked, for rendering.
    pub fn preview(&self) -> Option<Shape> {
        match &self.state {
            ToolState::Sizing { shape, .. } => Some(shape.clone()),
            ToolState::Stroking { stroke } => Some(Shape::Freehand(stroke.clone())),
            _ => None,
        }
    }

    /// Begin a select-tool drag of the current selection.
    pub fn begin_move(&mut self, at: Point) {
        self.state = ToolState::Moving {
            start: at,
            last: at,
            moved: false,
        };
    }

    /// Begin a select-tool marquee.
    pub fn begin_marquee(&mut self, at: Point, additive: bool) -> ToolAction {
        self.state = ToolState::Marquee {
            start: at,
            current: at,
            additive,
        };
        ToolAction::MarqueeChanged(Rect::from_points(at, at))
    }

    /// Pointer-down for every tool except select, whose hit testing needs the
    /// scene and goes through [`Self::begin_move`] / [`Self::begin_marquee`].
    pub fn pointer_down(&mut self, input: PointerInput, settings: &BoardSettings) -> ToolAction {
        let factory = ShapeFactory::new(settings);
        let tool = self.current_tool;
        match tool {
            ToolKind::Select => ToolAction::None,
            ToolKind::Pan => {
                self.state = ToolState::Panning { last: input.screen };
                ToolAction::None
            }
            ToolKind::Draw | ToolKind::Erase => {
                let stroke = factory.stroke(input.world, tool == ToolKind::Erase);
                self.state = ToolState::Stroking { stroke };
                ToolAction::Preview
            }
            ToolKind::Image => {
                self.current_tool = ToolKind::Select;
                ToolAction::RequestImage(input.world)
            }
            _ if tool.is_one_shot() => {
                self.current_tool = ToolKind::Select;
                match factory.place(tool, input.world) {
                    Some(shape) => ToolAction::Placed(shape),
                    None => ToolAction::None,
                }
            }
            _ => match factory.begin_drag(tool, input.world) {
                Some(shape) => {
                    self.state = ToolState::Sizing {
                        start: input.world,
                        shape,
                    };
                    ToolAction::Preview
                }
                None => ToolAction::None,
            },
        }
    }

    pub fn pointer_move(&mut self, input: PointerInput) -> ToolAction {
        match &mut self.state {
            ToolState::Idle => ToolAction::None,
            ToolState::Panning { last } => {
                let delta = input.screen - *last;
                *last = input.screen;
                ToolAction::Pan(delta)
            }
            ToolState::Moving { last, moved, .. } => {
                let delta = input.world - *last;
                if delta == Vec2::ZERO {
                    return ToolAction::None;
                }
                *last = input.world;
                *moved = true;
                ToolAction::MoveSelection(delta)
            }
            ToolState::Marquee { start, current, .. } => {
                *current = input.world;
                ToolAction::MarqueeChanged(Rect::from_points(*start, *current))
            }
            ToolState::Stroking { stroke } => {
                stroke.add_point(input.world);
                ToolAction::Preview
            }
            ToolState::Sizing { start, shape } => {
                ShapeFactory::resize(shape, *start, input.world);
                ToolAction::Preview
            }
        }
    }

    pub fn pointer_up(&mut self, input: PointerInput) -> ToolAction {
        // Last sample before release
        if matches!(
            self.state,
            ToolState::Stroking { .. } | ToolState::Sizing { .. } | ToolState::Marquee { .. }
        ) {
            self.pointer_move(input);
        }
        match std::mem::take(&mut self.state) {
            ToolState::Marquee {
                start,
                current,
                additive,
            } => ToolAction::MarqueeFinished {
                rect: Rect::from_points(start, current),
                additive,
            },
            other => {
                self.state = other;
                self.finish()
            }
        }
    }

    /// Abandon the gesture without committing anything. A selection drag
    /// answers with the move that puts the shapes back where it started.
    pub fn cancel(&mut self) -> ToolAction {
        match std::mem::take(&mut self.state) {
            ToolState::Moving {
                start,
                last,
                moved: true,
            } => ToolAction::MoveSelection(start - last),
            _ => ToolAction::None,
        }
    }

    /// End any gesture. Pointer-up, pointer-leave and tool switches all land
    /// here, so a drag is never left half applied.
    fn finish(&mut self) -> ToolAction {
        match std::mem::take(&mut self.state) {
            ToolState::Moving { moved, .. } => ToolAction::MoveFinished { moved },
            ToolState::Stroking { stroke } => ToolAction::Commit(Shape::Freehand(stroke)),
            ToolState::Sizing { shape, .. } => {
                let bounds = shape.bounds();
                if bounds.width() < MIN_COMMIT_SIZE && bounds.height() < MIN_COMMIT_SIZE {
                    log::debug!(
                        "Discarding degenerate {:?} at ({}, {})",
                        self.current_tool,
                        bounds.x0,
                        bounds.y0
                    );
                    ToolAction::None
                } else {
                    ToolAction::Commit(shape)
                }
            }
            _ => ToolAction::None,
        }
    }
}
