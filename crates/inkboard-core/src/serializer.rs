//! Conversion between live shapes and persisted board-object records.
//!
//! A record carries the full shape payload in `object_data` plus a
//! denormalized copy of its transform (position, size, rotation, scale) so
//! the storage side can query geometry without parsing payloads.

use crate::shapes::{
    Ellipse, Freehand, Group, Image, Kanban, Line, Polygon, PolygonKind, Rectangle, Shape, Sticky,
    Text, Triangle,
};
use crate::storage::{BoardId, ObjectId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("unknown object type: {0}")]
    UnknownType(String),
    #[error("object type {object_type} does not match {kind:?} payload")]
    KindMismatch {
        object_type: ObjectType,
        kind: PolygonKind,
    },
    #[error("invalid object payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Persisted type tag of a board object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectType {
    Rect,
    Ellipse,
    Triangle,
    PolygonStar,
    PolygonHex,
    PolygonDiamond,
    Line,
    Arrow,
    InkPath,
    Text,
    StickyGroup,
    Image,
    Group,
    KanbanGroup,
}

impl ObjectType {
    pub const ALL: [ObjectType; 14] = [
        ObjectType::Rect,
        ObjectType::Ellipse,
        ObjectType::Triangle,
        ObjectType::PolygonStar,
        ObjectType::PolygonHex,
        ObjectType::PolygonDiamond,
        ObjectType::Line,
        ObjectType::Arrow,
        ObjectType::InkPath,
        ObjectType::Text,
        ObjectType::StickyGroup,
        ObjectType::Image,
        ObjectType::Group,
        ObjectType::KanbanGroup,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::Rect => "rect",
            ObjectType::Ellipse => "ellipse",
            ObjectType::Triangle => "triangle",
            ObjectType::PolygonStar => "polygon-star",
            ObjectType::PolygonHex => "polygon-hex",
            ObjectType::PolygonDiamond => "polygon-diamond",
            ObjectType::Line => "line",
            ObjectType::Arrow => "arrow",
            ObjectType::InkPath => "ink-path",
            ObjectType::Text => "text",
            ObjectType::StickyGroup => "sticky-group",
            ObjectType::Image => "image",
            ObjectType::Group => "group",
            ObjectType::KanbanGroup => "kanban-group",
        }
    }

    /// Type tag for a live shape.
    pub fn of(shape: &Shape) -> Self {
        match shape {
            Shape::Rectangle(_) => ObjectType::Rect,
            Shape::Ellipse(_) => ObjectType::Ellipse,
            Shape::Triangle(_) => ObjectType::Triangle,
            Shape::Polygon(p) => match p.kind {
                PolygonKind::Star => ObjectType::PolygonStar,
                PolygonKind::Hexagon => ObjectType::PolygonHex,
                PolygonKind::Diamond => ObjectType::PolygonDiamond,
                PolygonKind::Arrow => ObjectType::Arrow,
            },
            Shape::Line(_) => ObjectType::Line,
            Shape::Freehand(_) => ObjectType::InkPath,
            Shape::Text(_) => ObjectType::Text,
            Shape::Sticky(_) => ObjectType::StickyGroup,
            Shape::Image(_) => ObjectType::Image,
            Shape::Group(_) => ObjectType::Group,
            Shape::Kanban(_) => ObjectType::KanbanGroup,
        }
    }

    fn polygon_kind(self) -> Option<PolygonKind> {
        match self {
            ObjectType::PolygonStar => Some(PolygonKind::Star),
            ObjectType::PolygonHex => Some(PolygonKind::Hexagon),
            ObjectType::PolygonDiamond => Some(PolygonKind::Diamond),
            ObjectType::Arrow => Some(PolygonKind::Arrow),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = SerializeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SerializeError::UnknownType(s.to_string()))
    }
}

/// One persisted board object.
///
/// `object_type` stays a plain string so a row with a tag this build does not
/// know still loads as a record and can be skipped on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardObjectRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub board_id: BoardId,
    pub object_type: String,
    pub object_data: serde_json::Value,
    pub position_x: f64,
    pub position_y: f64,
    pub width: f64,
    pub height: f64,
    /// Degrees.
    pub rotation: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    #[serde(default)]
    pub z_index: i64,
    #[serde(default)]
    pub created_by: Option<UserId>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl BoardObjectRecord {
    pub fn with_id(mut self, id: ObjectId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_z_index(mut self, z_index: i64) -> Self {
        self.z_index = z_index;
        self
    }
}

/// Partial update of a record. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
}

impl ObjectPatch {
    /// Patch that overwrites every mutable column with `record`'s values.
    pub fn from_record(record: &BoardObjectRecord) -> Self {
        Self {
            object_type: Some(record.object_type.clone()),
            object_data: Some(record.object_data.clone()),
            position_x: Some(record.position_x),
            position_y: Some(record.position_y),
            width: Some(record.width),
            height: Some(record.height),
            rotation: Some(record.rotation),
            scale_x: Some(record.scale_x),
            scale_y: Some(record.scale_y),
            z_index: Some(record.z_index),
        }
    }

    pub fn apply_to(&self, record: &mut BoardObjectRecord) {
        if let Some(t) = &self.object_type {
            record.object_type = t.clone();
        }
        if let Some(data) = &self.object_data {
            record.object_data = data.clone();
        }
        let columns = [
            (self.position_x, &mut record.position_x),
            (self.position_y, &mut record.position_y),
            (self.width, &mut record.width),
            (self.height, &mut record.height),
            (self.rotation, &mut record.rotation),
            (self.scale_x, &mut record.scale_x),
            (self.scale_y, &mut record.scale_y),
        ];
        for (value, column) in columns {
            if let Some(v) = value {
                *column = v;
            }
        }
        if let Some(z) = self.z_index {
            record.z_index = z;
        }
    }
}

/// A shape rebuilt from a record, with its persisted identity.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedObject {
    pub shape: Shape,
    pub object_id: Option<ObjectId>,
    pub z_index: i64,
}

/// Build the persistable record for a live shape. The record has no id; the
/// caller attaches one if the shape is already persisted.
pub fn serialize(shape: &Shape, board_id: BoardId) -> Result<BoardObjectRecord, SerializeError> {
    let object_data = match shape {
        Shape::Rectangle(s) => serde_json::to_value(s)?,
        Shape::Ellipse(s) => serde_json::to_value(s)?,
        Shape::Triangle(s) => serde_json::to_value(s)?,
        Shape::Polygon(s) => serde_json::to_value(s)?,
        Shape::Line(s) => serde_json::to_value(s)?,
        Shape::Freehand(s) => serde_json::to_value(s)?,
        Shape::Text(s) => serde_json::to_value(s)?,
        Shape::Sticky(s) => serde_json::to_value(s)?,
        Shape::Image(s) => serde_json::to_value(s)?,
        Shape::Group(s) => serde_json::to_value(s)?,
        Shape::Kanban(s) => serde_json::to_value(s)?,
    };
    let geometry = shape.geometry();
    Ok(BoardObjectRecord {
        id: None,
        board_id,
        object_type: ObjectType::of(shape).as_str().to_string(),
        object_data,
        position_x: geometry.x,
        position_y: geometry.y,
        width: geometry.width,
        height: geometry.height,
        rotation: geometry.rotation,
        scale_x: geometry.scale_x,
        scale_y: geometry.scale_y,
        z_index: 0,
        created_by: None,
        created_at: None,
        updated_at: None,
    })
}

fn payload<T: DeserializeOwned>(record: &BoardObjectRecord) -> Result<T, SerializeError> {
    Ok(T::deserialize(&record.object_data)?)
}

/// Rebuild a live shape from a record, keeping the record's identity.
pub fn deserialize(record: &BoardObjectRecord) -> Result<LoadedObject, SerializeError> {
    let object_type: ObjectType = record.object_type.parse()?;
    let shape = match object_type {
        ObjectType::Rect => Shape::Rectangle(payload::<Rectangle>(record)?),
        ObjectType::Ellipse => Shape::Ellipse(payload::<Ellipse>(record)?),
        ObjectType::Triangle => Shape::Triangle(payload::<Triangle>(record)?),
        ObjectType::PolygonStar
        | ObjectType::PolygonHex
        | ObjectType::PolygonDiamond
        | ObjectType::Arrow => {
            let polygon = payload::<Polygon>(record)?;
            if object_type.polygon_kind() != Some(polygon.kind) {
                return Err(SerializeError::KindMismatch {
                    object_type,
                    kind: polygon.kind,
                });
            }
            Shape::Polygon(polygon)
        }
        ObjectType::Line => Shape::Line(payload::<Line>(record)?),
        ObjectType::InkPath => Shape::Freehand(payload::<Freehand>(record)?),
        ObjectType::Text => Shape::Text(payload::<Text>(record)?),
        ObjectType::StickyGroup => Shape::Sticky(payload::<Sticky>(record)?),
        ObjectType::Image => Shape::Image(payload::<Image>(record)?),
        ObjectType::Group => Shape::Group(payload::<Group>(record)?),
        ObjectType::KanbanGroup => Shape::Kanban(payload::<Kanban>(record)?),
    };
    Ok(LoadedObject {
        shape,
        object_id: record.id,
        z_index: record.z_index,
    })
}

/// Deserialize a board's records back to front. Records that fail are
/// logged and skipped so one bad row never blocks the rest of the board.
pub fn load_records(records: &[BoardObjectRecord]) -> Vec<LoadedObject> {
    let mut ordered: Vec<&BoardObjectRecord> = records.iter().collect();
    ordered.sort_by_key(|r| (r.z_index, r.created_at));
    ordered
        .into_iter()
        .filter_map(|record| match deserialize(record) {
            Ok(loaded) => Some(loaded),
            Err(e) => {
                log::warn!(
                    "Skipping board object {:?} ({}): {}",
                    record.id,
                    record.object_type,
                    e
                );
                None
            }
        })
        .collect()
}
