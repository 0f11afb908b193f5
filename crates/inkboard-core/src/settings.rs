//! Board settings store.
//!
//! One owner mutates the settings; everyone else reads a borrowed
//! [`BoardSettings`] or listens on a channel for new values.

use crate::shapes::{
    FontDecoration, FontFamily, FontSlant, FontWeight, SerializableColor, ShapeStyle, TextAlign,
};
use crate::storage::Board;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{Receiver, Sender, channel};

/// Default grid spacing in world units.
pub const GRID_SIZE: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Size preset for one-shot shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl ShapeSize {
    /// Edge length in world units.
    pub fn extent(self) -> f64 {
        match self {
            ShapeSize::Small => 150.0,
            ShapeSize::Medium => 200.0,
            ShapeSize::Large => 250.0,
        }
    }
}

/// Everything the tools and the renderer read about the current board:
/// canvas appearance plus the style values applied to newly created shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardSettings {
    pub theme: Theme,
    pub background_color: SerializableColor,
    pub canvas_width: f64,
    pub canvas_height: f64,
    pub grid_size: f64,
    pub show_grid: bool,
    pub snap_to_grid: bool,
    /// Zoom factor, 1.0 = 100%.
    pub zoom: f64,

    pub pen_color: SerializableColor,
    pub pen_width: f64,
    pub stroke_color: SerializableColor,
    pub stroke_width: f64,
    pub fill_color: Option<SerializableColor>,
    pub shape_size: ShapeSize,
    pub sticky_color: SerializableColor,

    pub font_family: FontFamily,
    pub font_size: f64,
    pub font_weight: FontWeight,
    pub font_slant: FontSlant,
    pub font_decoration: FontDecoration,
    pub text_align: TextAlign,
    pub text_color: SerializableColor,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            background_color: SerializableColor::white(),
            canvas_width: 3000.0,
            canvas_height: 2000.0,
            grid_size: GRID_SIZE,
            show_grid: true,
            snap_to_grid: false,
            zoom: 1.0,
            pen_color: SerializableColor::black(),
            pen_width: 2.0,
            stroke_color: SerializableColor::black(),
            stroke_width: 2.0,
            fill_color: None,
            shape_size: ShapeSize::Medium,
            sticky_color: SerializableColor::new(255, 241, 118, 255),
            font_family: FontFamily::Sans,
            font_size: 20.0,
            font_weight: FontWeight::Regular,
            font_slant: FontSlant::Normal,
            font_decoration: FontDecoration::None,
            text_align: TextAlign::Left,
            text_color: SerializableColor::black(),
        }
    }
}

impl BoardSettings {
    /// Settings seeded from a stored board's appearance columns.
    pub fn for_board(board: &Board) -> Self {
        let mut settings = Self::default();
        settings.apply_board(board);
        settings
    }

    /// Copy the board-level columns (background, canvas size) over.
    pub fn apply_board(&mut self, board: &Board) {
        match SerializableColor::from_hex(&board.background_color) {
            Some(color) => self.background_color = color,
            None => log::warn!(
                "Board {} has unparseable background color {:?}",
                board.id,
                board.background_color
            ),
        }
        self.canvas_width = board.canvas_width;
        self.canvas_height = board.canvas_height;
    }

    /// Style for outlined/filled shapes created by placement tools.
    pub fn shape_style(&self) -> ShapeStyle {
        ShapeStyle {
            stroke_color: self.stroke_color,
            stroke_width: self.stroke_width,
            fill_color: self.fill_color,
            opacity: 1.0,
        }
    }

    /// Style for pen strokes.
    pub fn pen_style(&self) -> ShapeStyle {
        ShapeStyle {
            stroke_color: self.pen_color,
            stroke_width: self.pen_width,
            fill_color: None,
            opacity: 1.0,
        }
    }
}

/// Single owner of the board settings. Consumers subscribe for updates.
#[derive(Debug, Default)]
pub struct SettingsStore {
    settings: BoardSettings,
    revision: u64,
    subscribers: Vec<Sender<BoardSettings>>,
}

impl SettingsStore {
    pub fn new(settings: BoardSettings) -> Self {
        Self {
            settings,
            revision: 0,
            subscribers: Vec::new(),
        }
    }

    pub fn get(&self) -> &BoardSettings {
        &self.settings
    }

    /// Bumped on every update; cheap change detection for pollers.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Mutate the settings and publish the new value.
    pub fn update(&mut self, f: impl FnOnce(&mut BoardSettings)) {
        f(&mut self.settings);
        self.revision += 1;
        let snapshot = &self.settings;
        // Dropped receivers fall out here
        self.subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
    }

    pub fn replace(&mut self, settings: BoardSettings) {
        self.update(|s| *s = settings);
    }

    /// Receive every settings value published after this call.
    pub fn subscribe(&mut self) -> Receiver<BoardSettings> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }
}
