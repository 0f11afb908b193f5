//! Canvas document engine: the live scene graph of one open board.

use crate::camera::Camera;
use crate::serializer::{self, BoardObjectRecord, LoadedObject, SerializeError};
use crate::settings::{BoardSettings, SettingsStore};
use crate::shapes::{Group, ImageImportError, Shape, ShapeId, StylePatch};
use crate::factory::ShapeFactory;
use crate::shortcuts::KeyCommand;
use crate::snap::snap_point;
use crate::storage::{BoardId, ObjectId};
use crate::tools::{PointerInput, ToolAction, ToolKind, ToolManager};
use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Offset applied to duplicated and pasted objects.
pub const DUPLICATE_OFFSET: f64 = 10.0;

/// Pick tolerance in screen pixels.
pub const HIT_TOLERANCE: f64 = 5.0;

/// A snapshot of the scene for undo/redo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanvasSnapshot {
    /// All shapes in the snapshot.
    pub shapes: HashMap<ShapeId, Shape>,
    /// Z-order of shapes (back to front).
    pub z_order: Vec<ShapeId>,
}

impl CanvasSnapshot {
    /// Carry what a reload changed (`before` to `after`) into an older
    /// snapshot. New rows are stacked on top, rows deleted elsewhere are
    /// dropped and remote edits replace the copy held here. Shapes this
    /// snapshot never had stay absent unless they are new rows.
    pub fn rebase(&mut self, before: &CanvasSnapshot, after: &CanvasSnapshot) {
        for id in &before.z_order {
            if !after.shapes.contains_key(id) {
                self.shapes.remove(id);
            }
        }
        self.z_order.retain(|id| self.shapes.contains_key(id));

        for id in &after.z_order {
            let Some(shape) = after.shapes.get(id) else {
                continue;
            };
            match before.shapes.get(id) {
                None => {
                    if self.shapes.insert(*id, shape.clone()).is_none() {
                        self.z_order.push(*id);
                    }
                }
                Some(old) if old != shape => {
                    if let Some(held) = self.shapes.get_mut(id) {
                        *held = shape.clone();
                    }
                }
                Some(_) => {}
            }
        }
    }
}

/// The scene graph: shapes, their z-order and their persisted identities.
#[derive(Debug, Clone, Default)]
pub struct CanvasDocument {
    shapes: HashMap<ShapeId, Shape>,
    /// Back to front.
    z_order: Vec<ShapeId>,
    /// Storage identity of shapes that have been persisted. Not part of
    /// snapshots; identity belongs to the row, not to an undo state.
    persisted: HashMap<ShapeId, ObjectId>,
    /// Stored stacking key per shape, strictly increasing back to front.
    /// Rows are loaded in key order, so removals leave gaps in place.
    z_keys: HashMap<ShapeId, i64>,
}

impl CanvasDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a shape on top of the z-order.
    pub fn add_shape(&mut self, shape: Shape) {
        let id = shape.id();
        if self.shapes.insert(id, shape).is_none() {
            let key = self
                .z_order
                .last()
                .and_then(|top| self.z_keys.get(top))
                .map_or(0, |k| k + 1);
            self.z_order.push(id);
            self.z_keys.insert(id, key);
        }
    }

    /// Remove a shape, returning it with its storage identity.
    pub fn remove_shape(&mut self, id: ShapeId) -> Option<(Shape, Option<ObjectId>)> {
        let shape = self.shapes.remove(&id)?;
        self.z_order.retain(|&shape_id| shape_id != id);
        self.z_keys.remove(&id);
        Some((shape, self.persisted.remove(&id)))
    }

    pub fn get_shape(&self, id: ShapeId) -> Option<&Shape> {
        self.shapes.get(&id)
    }

    pub fn get_shape_mut(&mut self, id: ShapeId) -> Option<&mut Shape> {
        self.shapes.get_mut(&id)
    }

    /// Shapes back to front.
    pub fn shapes_ordered(&self) -> impl Iterator<Item = &Shape> {
        self.z_order.iter().filter_map(|id| self.shapes.get(id))
    }

    pub fn z_order(&self) -> &[ShapeId] {
        &self.z_order
    }

    pub fn z_index_of(&self, id: ShapeId) -> Option<usize> {
        self.z_order.iter().position(|&shape_id| shape_id == id)
    }

    /// Key the shape's row is stored with.
    pub fn z_key(&self, id: ShapeId) -> Option<i64> {
        self.z_keys.get(&id).copied()
    }

    /// Give every shape a key above the one below it, keeping keys that are
    /// already in order. Returns the shapes whose key changed.
    fn normalize_z_keys(&mut self) -> Vec<ShapeId> {
        let mut floor: Option<i64> = None;
        let mut changed = Vec::new();
        for id in &self.z_order {
            let key = match (self.z_keys.get(id).copied(), floor) {
                (Some(key), Some(below)) if key > below => key,
                (Some(key), None) => key,
                (_, below) => below.map_or(0, |k| k + 1),
            };
            if self.z_keys.insert(*id, key) != Some(key) {
                changed.push(*id);
            }
            floor = Some(key);
        }
        changed
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn object_id(&self, id: ShapeId) -> Option<ObjectId> {
        self.persisted.get(&id).copied()
    }

    /// Shape currently mapped to a storage row.
    pub fn shape_for_object(&self, object_id: ObjectId) -> Option<ShapeId> {
        self.persisted
            .iter()
            .find(|(_, oid)| **oid == object_id)
            .map(|(sid, _)| *sid)
    }

    /// Attach a storage identity. Returns false if the shape is gone.
    pub fn attach_identity(&mut self, id: ShapeId, object_id: ObjectId) -> bool {
        if !self.shapes.contains_key(&id) {
            return false;
        }
        self.persisted.insert(id, object_id);
        true
    }

    /// Topmost first.
    pub fn shapes_at_point(&self, point: Point, tolerance: f64) -> Vec<ShapeId> {
        self.z_order
            .iter()
            .rev()
            .filter_map(|&id| {
                self.shapes
                    .get(&id)
                    .filter(|s| s.hit_test(point, tolerance))
                    .map(|_| id)
            })
            .collect()
    }

    /// Back to front.
    pub fn shapes_in_rect(&self, rect: Rect) -> Vec<ShapeId> {
        self.z_order
            .iter()
            .filter_map(|&id| {
                self.shapes
                    .get(&id)
                    .filter(|s| s.intersects_rect(rect))
                    .map(|_| id)
            })
            .collect()
    }

    /// Bounding box of all shapes.
    pub fn bounds(&self) -> Option<Rect> {
        self.shapes.values().map(Shape::bounds).reduce(|a, b| a.union(b))
    }

    /// Move `ids` to the top, keeping their relative order.
    pub fn bring_to_front(&mut self, ids: &[ShapeId]) {
        let (mut rest, moved): (Vec<_>, Vec<_>) =
            self.z_order.iter().copied().partition(|id| !ids.contains(id));
        rest.extend(moved);
        self.z_order = rest;
    }

    /// Move `ids` to the bottom, keeping their relative order.
    pub fn send_to_back(&mut self, ids: &[ShapeId]) {
        let (mut moved, rest): (Vec<_>, Vec<_>) =
            self.z_order.iter().copied().partition(|id| ids.contains(id));
        moved.extend(rest);
        self.z_order = moved;
    }

    /// Move each of `ids` one layer up. A shape already directly under
    /// another moved shape stays under it.
    pub fn bring_forward(&mut self, ids: &[ShapeId]) -> bool {
        let mut changed = false;
        for i in (0..self.z_order.len().saturating_sub(1)).rev() {
            if ids.contains(&self.z_order[i]) && !ids.contains(&self.z_order[i + 1]) {
                self.z_order.swap(i, i + 1);
                changed = true;
            }
        }
        changed
    }

    /// Move each of `ids` one layer down.
    pub fn send_backward(&mut self, ids: &[ShapeId]) -> bool {
        let mut changed = false;
        for i in 1..self.z_order.len() {
            if ids.contains(&self.z_order[i]) && !ids.contains(&self.z_order[i - 1]) {
                self.z_order.swap(i, i - 1);
                changed = true;
            }
        }
        changed
    }

    /// Replace `ids` with one group at the z position of the topmost member.
    /// Returns the group id and the removed members' storage identities.
    pub fn group_shapes(&mut self, ids: &[ShapeId]) -> Option<(ShapeId, Vec<(ShapeId, Option<ObjectId>)>)> {
        let members: Vec<ShapeId> = self
            .z_order
            .iter()
            .copied()
            .filter(|id| ids.contains(id))
            .collect();
        if members.len() < 2 {
            return None;
        }
        let top = self.z_order.iter().rposition(|id| members.contains(id))?;
        let insert_at = top + 1 - members.len();

        let mut shapes = Vec::with_capacity(members.len());
        let mut removed = Vec::with_capacity(members.len());
        for id in &members {
            if let Some((shape, object_id)) = self.remove_shape(*id) {
                shapes.push(shape);
                removed.push((*id, object_id));
            }
        }
        let group = Group::from_members(shapes);
        let group_id = group.id;
        self.shapes.insert(group_id, Shape::Group(group));
        self.z_order.insert(insert_at.min(self.z_order.len()), group_id);
        Some((group_id, removed))
    }

    /// Dissolve a group in place. Members come back as top-level shapes at
    /// the group's z position with their absolute positions unchanged.
    pub fn ungroup_shape(&mut self, group_id: ShapeId) -> Option<(Vec<ShapeId>, Option<ObjectId>)> {
        if !self.shapes.get(&group_id).is_some_and(Shape::is_group) {
            return None;
        }
        let z_pos = self.z_index_of(group_id)?;
        let (shape, object_id) = self.remove_shape(group_id)?;
        let Shape::Group(group) = shape else {
            return None;
        };
        let members = group.into_members();
        let member_ids: Vec<ShapeId> = members.iter().map(Shape::id).collect();
        for (i, member) in members.into_iter().enumerate() {
            let id = member.id();
            self.shapes.insert(id, member);
            self.z_order.insert(z_pos + i, id);
        }
        Some((member_ids, object_id))
    }

    pub fn snapshot(&self) -> CanvasSnapshot {
        CanvasSnapshot {
            shapes: self.shapes.clone(),
            z_order: self.z_order.clone(),
        }
    }
}

/// Scene change the persistence and history layers react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanvasEvent {
    Added(ShapeId),
    Modified(ShapeId),
    /// `object_id` is set when the shape had been persisted.
    Removed {
        id: ShapeId,
        object_id: Option<ObjectId>,
    },
}

/// What the host has to do after a pointer event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerOutcome {
    None,
    /// Image tool clicked; pick a file and call [`Canvas::insert_image`].
    ImageRequested(Point),
    /// A text object was placed and is in edit mode.
    EditText(ShapeId),
}

/// Runtime canvas state for one open board.
#[derive(Debug)]
pub struct Canvas {
    pub document: CanvasDocument,
    pub camera: Camera,
    pub tool_manager: ToolManager,
    settings: SettingsStore,
    selection: Vec<ShapeId>,
    clipboard: Vec<Shape>,
    editing: Option<ShapeId>,
    marquee: Option<Rect>,
    events: Vec<CanvasEvent>,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(BoardSettings::default())
    }
}

impl Canvas {
    pub fn new(settings: BoardSettings) -> Self {
        let camera = Camera {
            zoom: settings.zoom,
            ..Camera::default()
        };
        Self {
            document: CanvasDocument::new(),
            camera,
            tool_manager: ToolManager::new(),
            settings: SettingsStore::new(settings),
            selection: Vec::new(),
            clipboard: Vec::new(),
            editing: None,
            marquee: None,
            events: Vec::new(),
        }
    }

    pub fn settings(&self) -> &BoardSettings {
        self.settings.get()
    }

    pub fn settings_store(&mut self) -> &mut SettingsStore {
        &mut self.settings
    }

    /// Drain scene changes since the last call.
    pub fn take_events(&mut self) -> Vec<CanvasEvent> {
        std::mem::take(&mut self.events)
    }

    /// Add a shape on top and select nothing. Fires `Added` exactly once.
    pub fn add_shape(&mut self, shape: Shape) -> ShapeId {
        let id = shape.id();
        if self.document.get_shape(id).is_some() {
            log::warn!("Shape {} already on the canvas", id);
            return id;
        }
        self.document.add_shape(shape);
        self.events.push(CanvasEvent::Added(id));
        id
    }

    /// Apply a structural change to one shape.
    pub fn update_shape(&mut self, id: ShapeId, f: impl FnOnce(&mut Shape)) -> bool {
        let Some(shape) = self.document.get_shape_mut(id) else {
            return false;
        };
        f(shape);
        self.events.push(CanvasEvent::Modified(id));
        true
    }

    fn remove(&mut self, id: ShapeId) -> Option<Shape> {
        let (shape, object_id) = self.document.remove_shape(id)?;
        self.events.push(CanvasEvent::Removed { id, object_id });
        if self.editing == Some(id) {
            self.editing = None;
        }
        Some(shape)
    }

    /// Drop a shape whose row was deleted elsewhere.
    pub fn remove_external(&mut self, object_id: ObjectId) -> bool {
        let Some(id) = self.document.shape_for_object(object_id) else {
            return false;
        };
        self.document.remove_shape(id);
        self.selection.retain(|&s| s != id);
        if self.editing == Some(id) {
            self.editing = None;
        }
        self.events.push(CanvasEvent::Removed {
            id,
            object_id: None,
        });
        self.emit_reindexed();
        true
    }

    // --- Selection ---

    pub fn selection(&self) -> &[ShapeId] {
        &self.selection
    }

    pub fn selected_shapes(&self) -> impl Iterator<Item = &Shape> {
        self.selection
            .iter()
            .filter_map(|id| self.document.get_shape(*id))
    }

    /// Select a shape, clearing the previous selection.
    pub fn select(&mut self, id: ShapeId) {
        self.selection.clear();
        self.add_to_selection(id);
    }

    pub fn add_to_selection(&mut self, id: ShapeId) {
        if self.document.get_shape(id).is_some() && !self.selection.contains(&id) {
            self.selection.push(id);
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn select_all(&mut self) {
        self.selection = self.document.z_order().to_vec();
    }

    pub fn is_selected(&self, id: ShapeId) -> bool {
        self.selection.contains(&id)
    }

    /// Selection sorted back to front.
    fn selection_in_z_order(&self) -> Vec<ShapeId> {
        self.document
            .z_order()
            .iter()
            .copied()
            .filter(|id| self.selection.contains(id))
            .collect()
    }

    pub fn marquee(&self) -> Option<Rect> {
        self.marquee
    }

    // --- Tools and pointer input ---

    /// Activate a tool. A gesture in progress is finalized first.
    pub fn set_tool(&mut self, tool: ToolKind) {
        let action = self.tool_manager.set_tool(tool);
        self.apply_action(action);
        self.marquee = None;
        if tool != ToolKind::Select {
            self.exit_text_editing();
        }
    }

    fn pointer_input(&self, screen: Point, shift: bool) -> PointerInput {
        let mut world = self.camera.screen_to_world(screen);
        let tool = self.tool_manager.current_tool();
        if tool.is_drag_to_size() || tool.is_one_shot() {
            world = snap_point(world, self.settings());
        }
        PointerInput {
            screen,
            world,
            shift,
        }
    }

    pub fn pointer_down(&mut self, screen: Point, shift: bool) -> PointerOutcome {
        let input = self.pointer_input(screen, shift);
        if self.tool_manager.current_tool() == ToolKind::Select {
            self.exit_text_editing();
            let tolerance = HIT_TOLERANCE / self.camera.zoom;
            match self.document.shapes_at_point(input.world, tolerance).first() {
                Some(&hit) => {
                    if shift {
                        self.add_to_selection(hit);
                    } else if !self.is_selected(hit) {
                        self.select(hit);
                    }
                    self.tool_manager.begin_move(input.world);
                }
                None => {
                    if !shift {
                        self.clear_selection();
                    }
                    let action = self.tool_manager.begin_marquee(input.world, shift);
                    return self.apply_action(action);
                }
            }
            return PointerOutcome::None;
        }
        let action = self.tool_manager.pointer_down(input, self.settings.get());
        self.apply_action(action)
    }

    pub fn pointer_move(&mut self, screen: Point) -> PointerOutcome {
        let input = self.pointer_input(screen, false);
        let action = self.tool_manager.pointer_move(input);
        self.apply_action(action)
    }

    pub fn pointer_up(&mut self, screen: Point) -> PointerOutcome {
        let input = self.pointer_input(screen, false);
        let action = self.tool_manager.pointer_up(input);
        self.apply_action(action)
    }

    /// Pointer left the surface or was captured elsewhere. Finalizes the
    /// gesture as if it ended where it last was.
    pub fn pointer_leave(&mut self) {
        let tool = self.tool_manager.current_tool();
        let action = self.tool_manager.set_tool(tool);
        self.apply_action(action);
        self.marquee = None;
    }

    fn apply_action(&mut self, action: ToolAction) -> PointerOutcome {
        match action {
            ToolAction::None | ToolAction::Preview => {}
            ToolAction::Pan(delta) => self.camera.pan(delta),
            ToolAction::MoveSelection(delta) => {
                for id in &self.selection {
                    if let Some(shape) = self.document.get_shape_mut(*id) {
                        shape.translate(delta);
                    }
                }
            }
            ToolAction::MoveFinished { moved } => {
                if moved {
                    let ids = self.selection.clone();
                    self.events.extend(ids.into_iter().map(CanvasEvent::Modified));
                }
            }
            ToolAction::MarqueeChanged(rect) => self.marquee = Some(rect),
            ToolAction::MarqueeFinished { rect, additive } => {
                self.marquee = None;
                if !additive {
                    self.selection.clear();
                }
                for id in self.document.shapes_in_rect(rect) {
                    self.add_to_selection(id);
                }
            }
            ToolAction::Commit(shape) => {
                let stroke = matches!(shape, Shape::Freehand(_));
                let id = self.add_shape(shape);
                if !stroke {
                    self.select(id);
                }
            }
            ToolAction::Placed(shape) => {
                let editable = matches!(shape, Shape::Text(_));
                let id = self.add_shape(shape);
                self.select(id);
                if editable {
                    self.editing = Some(id);
                    return PointerOutcome::EditText(id);
                }
            }
            ToolAction::RequestImage(at) => return PointerOutcome::ImageRequested(at),
        }
        PointerOutcome::None
    }

    /// Add an image from file bytes at a world position. On failure nothing
    /// changes.
    pub fn insert_image(&mut self, at: Point, bytes: &[u8]) -> Result<ShapeId, ImageImportError> {
        let shape = ShapeFactory::new(self.settings()).image(at, bytes)?;
        let id = self.add_shape(shape);
        self.select(id);
        Ok(id)
    }

    /// Set the zoom factor around a screen anchor and record it in settings.
    pub fn zoom_to(&mut self, zoom: f64, anchor: Point) {
        self.camera.zoom_to(zoom, anchor);
        let zoom = self.camera.zoom;
        self.settings.update(|s| s.zoom = zoom);
    }

    // --- Text editing ---

    /// Enter edit mode for a text or sticky note.
    pub fn enter_text_editing(&mut self, id: ShapeId) -> bool {
        match self.document.get_shape(id) {
            Some(Shape::Text(_)) | Some(Shape::Sticky(_)) => {
                self.editing = Some(id);
                true
            }
            _ => false,
        }
    }

    pub fn editing_shape(&self) -> Option<ShapeId> {
        self.editing
    }

    /// Replace the text of the shape being edited.
    pub fn set_editing_text(&mut self, content: &str) -> bool {
        let Some(id) = self.editing else {
            return false;
        };
        let content = content.to_string();
        self.update_shape(id, |shape| match shape {
            Shape::Text(t) => t.set_content(content),
            Shape::Sticky(s) => s.text = content,
            _ => {}
        })
    }

    /// Leave edit mode. A text object left empty is removed.
    pub fn exit_text_editing(&mut self) {
        let Some(id) = self.editing.take() else {
            return;
        };
        let empty = matches!(
            self.document.get_shape(id),
            Some(Shape::Text(t)) if t.content().trim().is_empty()
        );
        if empty {
            log::debug!("Removing empty text {}", id);
            self.selection.retain(|&s| s != id);
            self.remove(id);
        }
    }

    // --- Commands ---

    /// Run a keyboard command. Undo and redo belong to the session and are
    /// ignored here. Returns whether anything changed.
    pub fn apply_command(&mut self, command: KeyCommand) -> bool {
        match command {
            KeyCommand::Undo | KeyCommand::Redo => false,
            KeyCommand::Delete => self.delete_selected(),
            KeyCommand::Copy => self.copy_selected(),
            KeyCommand::Paste => self.paste(),
            KeyCommand::Duplicate => self.duplicate_selected(),
            KeyCommand::SelectAll => {
                self.select_all();
                false
            }
            KeyCommand::Group => self.group_selected().is_some(),
            KeyCommand::Ungroup => self.ungroup_selected(),
            KeyCommand::BringToFront => self.reorder(CanvasDocument::bring_to_front),
            KeyCommand::BringForward => self.reorder(|d, ids| {
                d.bring_forward(ids);
            }),
            KeyCommand::SendBackward => self.reorder(|d, ids| {
                d.send_backward(ids);
            }),
            KeyCommand::SendToBack => self.reorder(CanvasDocument::send_to_back),
            KeyCommand::Nudge(delta) => self.nudge_selected(delta),
            KeyCommand::Cancel => {
                if self.editing.is_some() {
                    self.exit_text_editing();
                } else if !self.tool_manager.is_idle() {
                    let revert = self.tool_manager.cancel();
                    self.apply_action(revert);
                    self.marquee = None;
                } else {
                    self.clear_selection();
                }
                false
            }
        }
    }

    /// Remove every selected shape and clear the selection.
    pub fn delete_selected(&mut self) -> bool {
        if self.selection.is_empty() {
            return false;
        }
        let ids = std::mem::take(&mut self.selection);
        for id in ids {
            self.remove(id);
        }
        self.emit_reindexed();
        true
    }

    /// Copy the selection to the in-session clipboard.
    pub fn copy_selected(&mut self) -> bool {
        let ids = self.selection_in_z_order();
        if ids.is_empty() {
            return false;
        }
        self.clipboard = ids
            .iter()
            .filter_map(|id| self.document.get_shape(*id).cloned())
            .collect();
        false
    }

    /// Paste the clipboard offset from its source. The clipboard then holds
    /// the pasted copies, so repeated pastes cascade.
    pub fn paste(&mut self) -> bool {
        if self.clipboard.is_empty() {
            return false;
        }
        let sources = std::mem::take(&mut self.clipboard);
        let copies = self.insert_copies(&sources);
        self.clipboard = copies
            .iter()
            .filter_map(|id| self.document.get_shape(*id).cloned())
            .collect();
        true
    }

    /// Copy the selection in place without touching the clipboard.
    pub fn duplicate_selected(&mut self) -> bool {
        let sources: Vec<Shape> = self
            .selection_in_z_order()
            .iter()
            .filter_map(|id| self.document.get_shape(*id).cloned())
            .collect();
        if sources.is_empty() {
            return false;
        }
        self.insert_copies(&sources);
        true
    }

    fn insert_copies(&mut self, sources: &[Shape]) -> Vec<ShapeId> {
        let offset = Vec2::new(DUPLICATE_OFFSET, DUPLICATE_OFFSET);
        let mut ids = Vec::with_capacity(sources.len());
        for source in sources {
            let mut copy = source.clone();
            copy.regenerate_id();
            copy.translate(offset);
            ids.push(self.add_shape(copy));
        }
        self.selection = ids.clone();
        ids
    }

    pub fn nudge_selected(&mut self, delta: Vec2) -> bool {
        if self.selection.is_empty() {
            return false;
        }
        for id in self.selection.clone() {
            self.update_shape(id, |shape| shape.translate(delta));
        }
        true
    }

    pub fn apply_style_to_selection(&mut self, patch: &StylePatch) -> bool {
        if self.selection.is_empty() {
            return false;
        }
        for id in self.selection.clone() {
            self.update_shape(id, |shape| patch.apply(shape.style_mut()));
        }
        true
    }

    /// Group the selection (two or more shapes). The group becomes the
    /// selection.
    pub fn group_selected(&mut self) -> Option<ShapeId> {
        if self.selection.len() < 2 {
            return None;
        }
        let (group_id, removed) = self.document.group_shapes(&self.selection)?;
        for (id, object_id) in removed {
            self.events.push(CanvasEvent::Removed { id, object_id });
        }
        self.events.push(CanvasEvent::Added(group_id));
        self.emit_reindexed();
        self.select(group_id);
        Some(group_id)
    }

    /// Ungroup when exactly one group is selected. Members become the
    /// selection.
    pub fn ungroup_selected(&mut self) -> bool {
        let &[group_id] = self.selection.as_slice() else {
            return false;
        };
        let Some((members, object_id)) = self.document.ungroup_shape(group_id) else {
            return false;
        };
        self.events.push(CanvasEvent::Removed {
            id: group_id,
            object_id,
        });
        self.events
            .extend(members.iter().copied().map(CanvasEvent::Added));
        self.emit_reindexed();
        self.selection = members;
        true
    }

    fn reorder(&mut self, f: impl FnOnce(&mut CanvasDocument, &[ShapeId])) -> bool {
        if self.selection.is_empty() {
            return false;
        }
        let ids = self.selection.clone();
        f(&mut self.document, &ids);
        self.emit_reindexed() > 0
    }

    /// Re-key the z-order and emit `Modified` for shapes whose stored key
    /// moved, unless this batch already writes them.
    fn emit_reindexed(&mut self) -> usize {
        let changed = self.document.normalize_z_keys();
        for id in &changed {
            let written = self.events.iter().any(|e| {
                matches!(e, CanvasEvent::Added(other) | CanvasEvent::Modified(other) if other == id)
            });
            if !written {
                self.events.push(CanvasEvent::Modified(*id));
            }
        }
        changed.len()
    }

    // --- Snapshots and persistence ---

    pub fn snapshot(&self) -> CanvasSnapshot {
        self.document.snapshot()
    }

    /// Replace the scene with a snapshot, emitting the events that turn the
    /// current scene into it.
    pub fn restore(&mut self, snapshot: CanvasSnapshot) {
        let CanvasSnapshot { shapes, z_order } = snapshot;
        let before = self.document.z_order().to_vec();

        let gone: Vec<ShapeId> = before
            .iter()
            .copied()
            .filter(|id| !shapes.contains_key(id))
            .collect();
        for id in gone {
            self.remove(id);
        }

        let mut changed = Vec::new();
        let mut added = Vec::new();
        for (id, shape) in &shapes {
            match self.document.get_shape(*id) {
                Some(current) if current != shape => changed.push(*id),
                Some(_) => {}
                None => added.push(*id),
            }
        }

        let persisted = std::mem::take(&mut self.document.persisted);
        let z_keys = std::mem::take(&mut self.document.z_keys);
        self.document = CanvasDocument {
            persisted: persisted
                .into_iter()
                .filter(|(id, _)| !added.contains(id))
                .collect(),
            z_keys: z_keys
                .into_iter()
                .filter(|(id, _)| shapes.contains_key(id))
                .collect(),
            shapes,
            z_order,
        };

        let mut modified: HashSet<ShapeId> = changed.into_iter().collect();
        modified.extend(self.document.normalize_z_keys());

        let order = self.document.z_order().to_vec();
        for id in order {
            if added.contains(&id) {
                self.events.push(CanvasEvent::Added(id));
            } else if modified.contains(&id) {
                self.events.push(CanvasEvent::Modified(id));
            }
        }

        self.selection.retain(|id| self.document.shapes.contains_key(id));
        if self.editing.is_some_and(|id| !self.document.shapes.contains_key(&id)) {
            self.editing = None;
        }
    }

    /// Replace the scene with objects loaded from storage. Local shapes that
    /// have not been persisted yet stay on top; selection is kept where the
    /// shapes still exist. Emits no events.
    pub fn hydrate(&mut self, loaded: Vec<LoadedObject>) {
        let local: Vec<Shape> = self
            .document
            .shapes_ordered()
            .filter(|s| self.document.object_id(s.id()).is_none())
            .cloned()
            .collect();

        let mut document = CanvasDocument::new();
        for object in loaded {
            let id = object.shape.id();
            document.add_shape(object.shape);
            document.z_keys.insert(id, object.z_index);
            if let Some(object_id) = object.object_id {
                document.persisted.insert(id, object_id);
            }
        }
        for shape in local {
            document.add_shape(shape);
        }
        // Tied rows get distinct keys in memory; they reach storage with the
        // shape's next write
        document.normalize_z_keys();
        self.document = document;

        self.selection.retain(|id| self.document.shapes.contains_key(id));
        if self.editing.is_some_and(|id| !self.document.shapes.contains_key(&id)) {
            self.editing = None;
        }
    }

    /// Persistable record for a shape, carrying its identity and stacking key.
    pub fn record_for(
        &self,
        id: ShapeId,
        board_id: BoardId,
    ) -> Result<Option<BoardObjectRecord>, SerializeError> {
        let Some(shape) = self.document.get_shape(id) else {
            return Ok(None);
        };
        let mut record = serializer::serialize(shape, board_id)?;
        record.id = self.document.object_id(id);
        let z = self.document.z_key(id).unwrap_or_default();
        Ok(Some(record.with_z_index(z)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{Ellipse, Rectangle};

    fn rect(x: f64, y: f64) -> Shape {
        Shape::Rectangle(Rectangle::new(Point::new(x, y), 50.0, 40.0))
    }

    fn canvas_with(shapes: Vec<Shape>) -> (Canvas, Vec<ShapeId>) {
        let mut canvas = Canvas::default();
        let ids = shapes.into_iter().map(|s| canvas.add_shape(s)).collect();
        canvas.take_events();
        (canvas, ids)
    }

    fn origin(canvas: &Canvas, id: ShapeId) -> Point {
        canvas.document.get_shape(id).unwrap().bounds().origin()
    }

    #[test]
    fn test_add_fires_once() {
        let mut canvas = Canvas::default();
        let shape = rect(0.0, 0.0);
        let id = canvas.add_shape(shape.clone());
        canvas.add_shape(shape);
        assert_eq!(canvas.take_events(), vec![CanvasEvent::Added(id)]);
        assert_eq!(canvas.document.len(), 1);
    }

    #[test]
    fn test_delete_selected_clears_selection() {
        let (mut canvas, ids) = canvas_with(vec![rect(0.0, 0.0), rect(100.0, 0.0)]);
        canvas.document.attach_identity(ids[0], ObjectId::nil());
        canvas.select_all();
        assert!(canvas.delete_selected());
        assert!(canvas.selection().is_empty());
        assert!(canvas.document.is_empty());
        let events = canvas.take_events();
        assert!(events.contains(&CanvasEvent::Removed {
            id: ids[0],
            object_id: Some(ObjectId::nil())
        }));
        assert!(!canvas.delete_selected());
    }

    #[test]
    fn test_z_order_multi_selection() {
        let (mut canvas, ids) = canvas_with(vec![
            rect(0.0, 0.0),
            rect(0.0, 0.0),
            rect(0.0, 0.0),
            rect(0.0, 0.0),
        ]);
        let (a, b, c, d) = (ids[0], ids[1], ids[2], ids[3]);

        canvas.selection = vec![c, a];
        canvas.apply_command(KeyCommand::BringToFront);
        assert_eq!(canvas.document.z_order(), &[b, d, a, c]);

        canvas.apply_command(KeyCommand::SendToBack);
        assert_eq!(canvas.document.z_order(), &[a, c, b, d]);

        canvas.apply_command(KeyCommand::BringForward);
        assert_eq!(canvas.document.z_order(), &[b, a, c, d]);

        canvas.apply_command(KeyCommand::SendBackward);
        assert_eq!(canvas.document.z_order(), &[a, c, b, d]);

        // Reordering persists the shapes whose index changed
        let events = canvas.take_events();
        assert!(events.iter().all(|e| matches!(e, CanvasEvent::Modified(_))));
    }

    #[test]
    fn test_empty_selection_commands_are_noops() {
        let (mut canvas, ids) = canvas_with(vec![rect(0.0, 0.0), rect(10.0, 10.0)]);
        for command in [
            KeyCommand::Delete,
            KeyCommand::Duplicate,
            KeyCommand::Group,
            KeyCommand::Ungroup,
            KeyCommand::BringToFront,
            KeyCommand::SendToBack,
            KeyCommand::Nudge(Vec2::new(1.0, 0.0)),
        ] {
            assert!(!canvas.apply_command(command));
        }
        canvas.copy_selected();
        assert!(!canvas.paste());
        assert!(canvas.take_events().is_empty());
        assert_eq!(canvas.document.z_order(), &ids[..]);
    }

    #[test]
    fn test_group_then_ungroup_keeps_positions() {
        let shapes = vec![
            rect(10.0, 20.0),
            Shape::Ellipse(Ellipse::new(Point::new(200.0, 150.0), 30.0, 20.0)),
            rect(-40.0, 75.5),
        ];
        let (mut canvas, ids) = canvas_with(shapes);
        let before: Vec<Point> = ids.iter().map(|id| origin(&canvas, *id)).collect();

        canvas.select_all();
        let group = canvas.group_selected().unwrap();
        assert_eq!(canvas.document.len(), 1);
        assert_eq!(canvas.selection(), &[group]);

        assert!(canvas.ungroup_selected());
        assert_eq!(canvas.document.len(), 3);
        for (id, expected) in ids.iter().zip(before) {
            let after = origin(&canvas, *id);
            assert!((after - expected).hypot() < 1e-9);
        }
        assert_eq!(canvas.document.z_order(), &ids[..]);
    }

    #[test]
    fn test_group_needs_two() {
        let (mut canvas, ids) = canvas_with(vec![rect(0.0, 0.0), rect(10.0, 10.0)]);
        canvas.select(ids[0]);
        assert!(canvas.group_selected().is_none());
        // Ungroup needs exactly one group
        assert!(!canvas.ungroup_selected());
    }

    #[test]
    fn test_group_replaces_persisted_members() {
        let (mut canvas, ids) = canvas_with(vec![rect(0.0, 0.0), rect(10.0, 10.0)]);
        let row = ObjectId::new_v4();
        canvas.document.attach_identity(ids[0], row);
        canvas.select_all();
        let group = canvas.group_selected().unwrap();
        let events = canvas.take_events();
        assert!(events.contains(&CanvasEvent::Removed {
            id: ids[0],
            object_id: Some(row)
        }));
        assert!(events.contains(&CanvasEvent::Added(group)));
    }

    #[test]
    fn test_duplicate_offset() {
        let (mut canvas, ids) = canvas_with(vec![rect(10.0, 20.0)]);
        canvas.select(ids[0]);
        assert!(canvas.duplicate_selected());
        let copy = canvas.selection()[0];
        assert_ne!(copy, ids[0]);
        assert_eq!(origin(&canvas, copy), Point::new(20.0, 30.0));
        assert_eq!(origin(&canvas, ids[0]), Point::new(10.0, 20.0));
    }

    #[test]
    fn test_paste_offset_and_cascade() {
        let (mut canvas, ids) = canvas_with(vec![rect(10.0, 20.0)]);
        canvas.select(ids[0]);
        canvas.copy_selected();
        assert!(canvas.paste());
        let first = canvas.selection()[0];
        assert_eq!(origin(&canvas, first), Point::new(20.0, 30.0));
        assert!(canvas.paste());
        let second = canvas.selection()[0];
        assert_eq!(origin(&canvas, second), Point::new(30.0, 40.0));
        assert_eq!(canvas.document.len(), 3);
    }

    #[test]
    fn test_drag_rectangle_negative() {
        let mut canvas = Canvas::default();
        canvas.set_tool(ToolKind::Rectangle);
        canvas.pointer_down(Point::new(300.0, 200.0), false);
        canvas.pointer_move(Point::new(250.0, 180.0));
        canvas.pointer_up(Point::new(100.0, 50.0));

        let shape = canvas.document.shapes_ordered().next().unwrap();
        let bounds = shape.bounds();
        assert_eq!(bounds.origin(), Point::new(100.0, 50.0));
        assert_eq!(bounds.width(), 200.0);
        assert_eq!(bounds.height(), 150.0);
        assert_eq!(canvas.tool_manager.current_tool(), ToolKind::Rectangle);
    }

    #[test]
    fn test_zero_size_rectangle_discarded() {
        let mut canvas = Canvas::default();
        canvas.set_tool(ToolKind::Rectangle);
        canvas.pointer_down(Point::new(100.0, 100.0), false);
        canvas.pointer_up(Point::new(100.0, 100.0));
        assert!(canvas.document.is_empty());
        assert!(canvas.take_events().is_empty());
    }

    #[test]
    fn test_pointer_leave_finalizes_gesture() {
        let mut canvas = Canvas::default();
        canvas.set_tool(ToolKind::Ellipse);
        canvas.pointer_down(Point::new(0.0, 0.0), false);
        canvas.pointer_move(Point::new(80.0, 60.0));
        canvas.pointer_leave();
        assert_eq!(canvas.document.len(), 1);
        assert!(canvas.tool_manager.is_idle());
    }

    #[test]
    fn test_text_placement_reverts_to_select() {
        let mut canvas = Canvas::default();
        canvas.set_tool(ToolKind::Text);
        let outcome = canvas.pointer_down(Point::new(40.0, 40.0), false);
        let PointerOutcome::EditText(id) = outcome else {
            panic!("expected text edit, got {:?}", outcome);
        };
        assert_eq!(canvas.tool_manager.current_tool(), ToolKind::Select);
        assert!(canvas.set_editing_text("hello"));
        canvas.exit_text_editing();
        assert!(canvas.document.get_shape(id).is_some());
    }

    #[test]
    fn test_empty_text_removed_on_exit() {
        let mut canvas = Canvas::default();
        canvas.set_tool(ToolKind::Text);
        canvas.pointer_down(Point::new(40.0, 40.0), false);
        canvas.apply_command(KeyCommand::Cancel);
        assert!(canvas.document.is_empty());
    }

    #[test]
    fn test_image_tool_requests_file() {
        let mut canvas = Canvas::default();
        canvas.set_tool(ToolKind::Image);
        let outcome = canvas.pointer_down(Point::new(5.0, 6.0), false);
        assert_eq!(outcome, PointerOutcome::ImageRequested(Point::new(5.0, 6.0)));
        assert!(canvas.insert_image(Point::new(5.0, 6.0), b"not an image").is_err());
        assert!(canvas.document.is_empty());
    }

    #[test]
    fn test_select_drag_emits_one_modification() {
        let (mut canvas, ids) = canvas_with(vec![rect(0.0, 0.0)]);
        // Unfilled rectangles are picked on their outline
        canvas.pointer_down(Point::new(2.0, 20.0), false);
        assert_eq!(canvas.selection(), &[ids[0]]);
        for x in 3..37 {
            canvas.pointer_move(Point::new(x as f64, 20.0));
        }
        canvas.pointer_up(Point::new(37.0, 20.0));
        assert_eq!(canvas.take_events(), vec![CanvasEvent::Modified(ids[0])]);
        assert_eq!(origin(&canvas, ids[0]), Point::new(35.0, 0.0));
    }

    fn drag_outline(canvas: &mut Canvas) {
        canvas.pointer_down(Point::new(2.0, 20.0), false);
        canvas.pointer_move(Point::new(20.0, 20.0));
        canvas.pointer_move(Point::new(37.0, 30.0));
    }

    #[test]
    fn test_drag_ended_by_leave_or_tool_switch_is_written() {
        let (mut canvas, ids) = canvas_with(vec![rect(0.0, 0.0)]);
        drag_outline(&mut canvas);
        canvas.pointer_leave();
        assert_eq!(canvas.take_events(), vec![CanvasEvent::Modified(ids[0])]);
        assert_eq!(origin(&canvas, ids[0]), Point::new(35.0, 10.0));
        assert!(canvas.tool_manager.is_idle());

        canvas.pointer_down(Point::new(37.0, 30.0), false);
        canvas.pointer_move(Point::new(47.0, 30.0));
        canvas.set_tool(ToolKind::Rectangle);
        assert_eq!(canvas.take_events(), vec![CanvasEvent::Modified(ids[0])]);
        assert_eq!(origin(&canvas, ids[0]), Point::new(45.0, 10.0));
    }

    #[test]
    fn test_cancel_puts_dragged_shapes_back() {
        let (mut canvas, ids) = canvas_with(vec![rect(0.0, 0.0)]);
        drag_outline(&mut canvas);
        canvas.apply_command(KeyCommand::Cancel);
        assert!(canvas.take_events().is_empty());
        assert_eq!(origin(&canvas, ids[0]), Point::new(0.0, 0.0));
        assert!(canvas.tool_manager.is_idle());
    }

    #[test]
    fn test_removal_keeps_stacking_keys() {
        let (mut canvas, ids) = canvas_with(vec![rect(0.0, 0.0), rect(10.0, 10.0), rect(20.0, 20.0)]);
        canvas.selection = vec![ids[0], ids[1]];
        canvas.delete_selected();
        canvas.take_events();

        let d = canvas.add_shape(rect(30.0, 30.0));
        let board = BoardId::new_v4();
        let key = |canvas: &Canvas, id| canvas.record_for(id, board).unwrap().unwrap().z_index;
        assert_eq!(key(&canvas, ids[2]), 2);
        assert_eq!(key(&canvas, d), 3);
    }

    #[test]
    fn test_restack_rewrites_only_what_it_must() {
        let (mut canvas, ids) = canvas_with(vec![rect(0.0, 0.0), rect(10.0, 10.0), rect(20.0, 20.0)]);
        canvas.select(ids[0]);
        canvas.apply_command(KeyCommand::BringToFront);
        assert_eq!(canvas.take_events(), vec![CanvasEvent::Modified(ids[0])]);

        // Undoing the restack must re-key what now sits above it
        let board = BoardId::new_v4();
        let snapshot = CanvasSnapshot {
            shapes: canvas.snapshot().shapes,
            z_order: ids.clone(),
        };
        canvas.restore(snapshot);
        canvas.take_events();
        let keys: Vec<i64> = ids
            .iter()
            .map(|id| canvas.record_for(*id, board).unwrap().unwrap().z_index)
            .collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]), "{:?}", keys);
    }

    #[test]
    fn test_marquee_selection() {
        let (mut canvas, ids) = canvas_with(vec![rect(0.0, 0.0), rect(500.0, 500.0)]);
        canvas.pointer_down(Point::new(-10.0, -10.0), false);
        canvas.pointer_move(Point::new(100.0, 100.0));
        assert!(canvas.marquee().is_some());
        canvas.pointer_up(Point::new(100.0, 100.0));
        assert_eq!(canvas.selection(), &[ids[0]]);
        assert!(canvas.marquee().is_none());
    }

    #[test]
    fn test_nudge_and_style() {
        let (mut canvas, ids) = canvas_with(vec![rect(0.0, 0.0)]);
        canvas.select(ids[0]);
        assert!(canvas.apply_command(KeyCommand::Nudge(Vec2::new(10.0, 0.0))));
        assert_eq!(origin(&canvas, ids[0]), Point::new(10.0, 0.0));

        let patch = StylePatch {
            stroke_width: Some(7.0),
            ..Default::default()
        };
        assert!(canvas.apply_style_to_selection(&patch));
        assert_eq!(canvas.document.get_shape(ids[0]).unwrap().style().stroke_width, 7.0);
    }

    #[test]
    fn test_restore_diffs_scene() {
        let (mut canvas, ids) = canvas_with(vec![rect(0.0, 0.0), rect(10.0, 10.0)]);
        let row = ObjectId::new_v4();
        canvas.document.attach_identity(ids[0], row);
        let snapshot = canvas.snapshot();

        canvas.select(ids[0]);
        canvas.nudge_selected(Vec2::new(5.0, 0.0));
        canvas.select(ids[1]);
        canvas.delete_selected();
        let extra = canvas.add_shape(rect(90.0, 90.0));
        canvas.take_events();

        canvas.restore(snapshot);
        let events = canvas.take_events();
        assert!(events.contains(&CanvasEvent::Removed {
            id: extra,
            object_id: None
        }));
        assert!(events.contains(&CanvasEvent::Modified(ids[0])));
        assert!(events.contains(&CanvasEvent::Added(ids[1])));
        assert_eq!(canvas.document.object_id(ids[0]), Some(row));
        assert_eq!(origin(&canvas, ids[0]), Point::new(0.0, 0.0));
    }

    #[test]
    fn test_snapshot_rebase() {
        let (a, b, c) = (rect(0.0, 0.0), rect(10.0, 10.0), rect(20.0, 20.0));
        let scene = |shapes: &[&Shape]| CanvasSnapshot {
            shapes: shapes.iter().map(|s| (s.id(), (*s).clone())).collect(),
            z_order: shapes.iter().map(|s| s.id()).collect(),
        };
        let mut moved_b = b.clone();
        moved_b.translate(Vec2::new(5.0, 0.0));
        let remote = rect(40.0, 40.0);

        // Reload: `a` deleted elsewhere, `b` edited, `remote` inserted
        let before = scene(&[&a, &b, &c]);
        let after = scene(&[&moved_b, &c, &remote]);

        let mut older = scene(&[&a, &b]);
        older.rebase(&before, &after);
        assert_eq!(older, scene(&[&moved_b, &remote]));
    }

    #[test]
    fn test_hydrate_keeps_local_and_selection() {
        let (mut canvas, ids) = canvas_with(vec![rect(0.0, 0.0), rect(10.0, 10.0)]);
        let row = ObjectId::new_v4();
        canvas.document.attach_identity(ids[0], row);
        canvas.select_all();

        let mut remote = canvas.document.get_shape(ids[0]).unwrap().clone();
        remote.translate(Vec2::new(100.0, 0.0));
        let other = rect(300.0, 300.0);
        let loaded = vec![
            LoadedObject {
                shape: remote,
                object_id: Some(row),
                z_index: 0,
            },
            LoadedObject {
                shape: other,
                object_id: Some(ObjectId::new_v4()),
                z_index: 1,
            },
        ];
        canvas.hydrate(loaded);

        assert_eq!(canvas.document.len(), 3);
        assert_eq!(origin(&canvas, ids[0]), Point::new(100.0, 0.0));
        // Unpersisted local shape stays on top
        assert_eq!(canvas.document.z_order().last(), Some(&ids[1]));
        assert_eq!(canvas.selection(), &ids[..]);
        assert!(canvas.take_events().is_empty());
    }

    #[test]
    fn test_remove_external() {
        let (mut canvas, ids) = canvas_with(vec![rect(0.0, 0.0)]);
        let row = ObjectId::new_v4();
        canvas.document.attach_identity(ids[0], row);
        canvas.select(ids[0]);
        assert!(canvas.remove_external(row));
        assert!(canvas.selection().is_empty());
        assert!(!canvas.remove_external(row));
    }

    #[test]
    fn test_record_for_carries_identity_and_z() {
        let (mut canvas, ids) = canvas_with(vec![rect(0.0, 0.0), rect(10.0, 10.0)]);
        let row = ObjectId::new_v4();
        canvas.document.attach_identity(ids[1], row);
        let board = BoardId::new_v4();
        let record = canvas.record_for(ids[1], board).unwrap().unwrap();
        assert_eq!(record.id, Some(row));
        assert_eq!(record.z_index, 1);
        assert_eq!(record.board_id, board);
        assert!(canvas.record_for(ShapeId::new_v4(), board).unwrap().is_none());
    }

    #[test]
    fn test_pan_tool_moves_camera() {
        let mut canvas = Canvas::default();
        canvas.set_tool(ToolKind::Pan);
        canvas.pointer_down(Point::new(0.0, 0.0), false);
        canvas.pointer_move(Point::new(30.0, -10.0));
        canvas.pointer_up(Point::new(30.0, -10.0));
        assert_eq!(canvas.camera.offset, Vec2::new(30.0, -10.0));
        assert_eq!(canvas.camera.screen_to_world(Point::new(30.0, -10.0)), Point::ZERO);
    }
}
