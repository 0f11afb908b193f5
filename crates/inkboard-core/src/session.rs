//! One open board: canvas, history, persistence and live updates wired
//! together.
//!
//! The host calls the input methods as events arrive and [`BoardSession::tick`]
//! on a timer. Nothing here reads a clock.

use crate::canvas::{Canvas, CanvasEvent, CanvasSnapshot, PointerOutcome};
use crate::debounce::{Debouncer, Instant};
use crate::history::{History, HistoryConfig};
use crate::realtime::{ChangeFeed, Reconciler};
use crate::serializer::load_records;
use crate::settings::BoardSettings;
use crate::shapes::{ShapeId, StylePatch};
use crate::shortcuts::KeyCommand;
use crate::storage::{Board, BoardId, BoardStore, ObjectId, Role, StorageError, StorageResult, UserId};
use crate::sync::{FlushReport, Notification, PersistenceSync, SyncConfig};
use crate::tools::ToolKind;
use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const READ_ONLY_NOTICE: &str = "This board is read-only for you";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub history: HistoryConfig,
    /// Debounce for persistence; history snapshots use the same window.
    pub sync: SyncConfig,
}

pub struct BoardSession {
    board: Board,
    user_id: UserId,
    role: Role,
    store: Arc<dyn BoardStore>,
    canvas: Canvas,
    history: History,
    snapshot_due: Debouncer<()>,
    sync: PersistenceSync,
    reconciler: Reconciler,
    notifications: Vec<Notification>,
    closed: bool,
}

impl BoardSession {
    /// Load a board for `user_id` and subscribe to its changes.
    ///
    /// Fails when the board cannot be read or the user has no access to it.
    /// A feed that cannot connect only costs live updates.
    pub async fn open(
        store: Arc<dyn BoardStore>,
        feed: &dyn ChangeFeed,
        board_id: BoardId,
        user_id: UserId,
        config: SessionConfig,
    ) -> StorageResult<Self> {
        let board = store.get_board(board_id).await?;
        let role = store
            .get_collaborators(board_id)
            .await?
            .into_iter()
            .find(|c| c.user_id == user_id)
            .map(|c| c.role)
            .ok_or_else(|| {
                StorageError::PermissionDenied(format!("no access to board {}", board_id))
            })?;

        let records = store.get_objects_by_board(board_id).await?;
        let loaded = load_records(&records);
        let mut notifications = Vec::new();
        if loaded.len() < records.len() {
            notifications.push(Notification::warning(format!(
                "{} object(s) could not be loaded",
                records.len() - loaded.len()
            )));
        }

        let mut canvas = Canvas::new(BoardSettings::for_board(&board));
        canvas.hydrate(loaded);
        let mut history = History::new(config.history);
        history.initialize(canvas.snapshot());

        let reconciler = match feed.subscribe(board_id) {
            Ok(subscription) => Reconciler::new(subscription),
            Err(e) => {
                log::warn!("Live updates unavailable for board {}: {}", board_id, e);
                notifications.push(Notification::warning("Live updates are unavailable"));
                Reconciler::detached()
            }
        };

        log::info!(
            "Opened board {} ({} objects) as {:?}",
            board_id,
            canvas.document.len(),
            role
        );

        Ok(Self {
            sync: PersistenceSync::new(board_id, user_id, config.sync),
            snapshot_due: Debouncer::new(config.sync.debounce),
            board,
            user_id,
            role,
            store,
            canvas,
            history,
            reconciler,
            notifications,
            closed: false,
        })
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Writes or a snapshot still waiting for their window.
    pub fn has_pending(&self) -> bool {
        self.sync.has_pending() || !self.snapshot_due.is_empty()
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    // --- Input ---

    /// Refuse an edit up front for read-only roles.
    fn deny_edit(&mut self) -> bool {
        if self.role.can_edit() {
            return false;
        }
        self.notifications.push(Notification::info(READ_ONLY_NOTICE));
        true
    }

    /// Read-only roles may select and pan only.
    pub fn set_tool(&mut self, tool: ToolKind, now: Instant) {
        if !matches!(tool, ToolKind::Select | ToolKind::Pan) && self.deny_edit() {
            return;
        }
        self.canvas.set_tool(tool);
        self.after_change(now);
    }

    pub fn pointer_down(&mut self, screen: Point, shift: bool, now: Instant) -> PointerOutcome {
        let outcome = self.canvas.pointer_down(screen, shift);
        self.after_change(now);
        outcome
    }

    pub fn pointer_move(&mut self, screen: Point, now: Instant) -> PointerOutcome {
        let outcome = self.canvas.pointer_move(screen);
        self.after_change(now);
        outcome
    }

    pub fn pointer_up(&mut self, screen: Point, now: Instant) -> PointerOutcome {
        let outcome = self.canvas.pointer_up(screen);
        self.after_change(now);
        outcome
    }

    pub fn pointer_leave(&mut self, now: Instant) {
        self.canvas.pointer_leave();
        self.after_change(now);
    }

    /// Keyboard command. Undo and redo are handled here, the rest by the
    /// canvas.
    pub fn command(&mut self, command: KeyCommand, now: Instant) {
        match command {
            KeyCommand::Undo => {
                self.undo(now);
            }
            KeyCommand::Redo => {
                self.redo(now);
            }
            other if other.edits() && self.deny_edit() => {}
            other => {
                self.canvas.apply_command(other);
                self.after_change(now);
            }
        }
    }

    /// Resolve a DOM key event and run it.
    pub fn key(&mut self, key: &str, ctrl: bool, shift: bool, now: Instant) -> bool {
        match crate::shortcuts::resolve(key, ctrl, shift) {
            Some(command) => {
                self.command(command, now);
                true
            }
            None => false,
        }
    }

    /// Finish the image tool's file flow. A decode failure leaves the board
    /// untouched and is reported as a notification.
    pub fn insert_image(&mut self, at: Point, bytes: &[u8], now: Instant) -> Option<ShapeId> {
        if self.deny_edit() {
            return None;
        }
        match self.canvas.insert_image(at, bytes) {
            Ok(id) => {
                self.after_change(now);
                Some(id)
            }
            Err(e) => {
                log::warn!("Image import failed: {}", e);
                self.notifications
                    .push(Notification::error(format!("Could not import image: {}", e)));
                None
            }
        }
    }

    pub fn set_editing_text(&mut self, content: &str, now: Instant) {
        if self.deny_edit() {
            return;
        }
        self.canvas.set_editing_text(content);
        self.after_change(now);
    }

    pub fn exit_text_editing(&mut self, now: Instant) {
        self.canvas.exit_text_editing();
        self.after_change(now);
    }

    pub fn apply_style(&mut self, patch: &StylePatch, now: Instant) {
        if self.deny_edit() {
            return;
        }
        self.canvas.apply_style_to_selection(patch);
        self.after_change(now);
    }

    /// Change the style and tool settings new shapes are built from.
    pub fn update_settings(&mut self, f: impl FnOnce(&mut BoardSettings)) {
        self.canvas.settings_store().update(f);
    }

    /// Drop a shape whose row was deleted outside this session.
    pub fn remove_external(&mut self, object_id: ObjectId, now: Instant) {
        if self.canvas.remove_external(object_id) {
            self.after_change(now);
        }
    }

    /// Route canvas events to the synchronizer and arm the snapshot. For
    /// read-only roles the scene is put back instead; that covers drags,
    /// which cannot be refused before they happen.
    fn after_change(&mut self, now: Instant) {
        let events = self.canvas.take_events();
        if events.is_empty() {
            return;
        }
        if !self.role.can_edit() {
            if let Some(snapshot) = self.history.current().cloned() {
                self.canvas.restore(snapshot);
                self.canvas.take_events();
                // Shapes put back keep the rows they came from
                for event in &events {
                    if let CanvasEvent::Removed {
                        id,
                        object_id: Some(object_id),
                    } = *event
                    {
                        self.canvas.document.attach_identity(id, object_id);
                    }
                }
            }
            self.notifications.push(Notification::info(READ_ONLY_NOTICE));
            return;
        }
        for event in events {
            self.sync.handle(event, now, &self.canvas);
        }
        self.snapshot_due.touch((), now);
    }

    // --- History ---

    /// Record a snapshot still waiting for its window right away.
    fn settle_snapshot(&mut self) {
        if self.snapshot_due.cancel(&()) {
            self.history.save_state(self.canvas.snapshot());
        }
    }

    pub fn undo(&mut self, now: Instant) -> bool {
        if !self.role.can_edit() {
            return false;
        }
        self.settle_snapshot();
        let Some(snapshot) = self.history.undo() else {
            return false;
        };
        self.apply_snapshot(snapshot, now);
        true
    }

    pub fn redo(&mut self, now: Instant) -> bool {
        if !self.role.can_edit() {
            return false;
        }
        self.settle_snapshot();
        let Some(snapshot) = self.history.redo() else {
            return false;
        };
        self.apply_snapshot(snapshot, now);
        true
    }

    fn apply_snapshot(&mut self, snapshot: CanvasSnapshot, now: Instant) {
        // The snapshot already holds the pre-gesture positions
        self.canvas.tool_manager.cancel();
        self.canvas.restore(snapshot);
        for event in self.canvas.take_events() {
            self.sync.handle(event, now, &self.canvas);
        }
    }

    // --- Timer ---

    /// Advance time: pick up remote changes, take the due snapshot, write
    /// due changes and reload the board when it went stale.
    pub async fn tick(&mut self, now: Instant) {
        if self.closed {
            return;
        }
        self.reconciler.poll();

        if !self.snapshot_due.drain_due(now).is_empty() {
            self.history.save_state(self.canvas.snapshot());
        }

        let report = self
            .sync
            .flush(now, &mut self.canvas, self.store.as_ref())
            .await;
        self.absorb(report);

        if self.reconciler.is_stale() && self.canvas.tool_manager.is_idle() && !self.has_pending() {
            self.reload().await;
        }
    }

    /// Write everything pending now, ignoring the debounce window. For hosts
    /// that are about to navigate away.
    pub async fn save_now(&mut self) {
        if self.closed {
            return;
        }
        self.settle_snapshot();
        let report = self
            .sync
            .flush_all(&mut self.canvas, self.store.as_ref())
            .await;
        self.absorb(report);
    }

    fn absorb(&mut self, report: FlushReport) {
        for (kind, object_id) in report.written {
            self.reconciler.expect_echo(kind, object_id);
        }
        self.notifications.extend(report.notifications);
    }

    /// Replace the scene with what storage holds now. Every history entry is
    /// rebased onto the reloaded rows, so undo never deletes or reverts
    /// someone else's objects.
    pub async fn reload(&mut self) {
        match self.store.get_objects_by_board(self.board.id).await {
            Ok(records) => {
                let loaded = load_records(&records);
                log::debug!("Reloaded {} objects on board {}", loaded.len(), self.board.id);
                let before = self.canvas.snapshot();
                self.canvas.hydrate(loaded);
                let after = self.canvas.snapshot();
                self.history.rebase(|entry| entry.rebase(&before, &after));
                self.reconciler.mark_fresh();
            }
            Err(e) => {
                // Stays stale; the next tick tries again
                log::warn!("Failed to reload board {}: {}", self.board.id, e);
            }
        }
    }

    /// Stop live updates and forget unsynced writes.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.reconciler.close();
        self.sync.discard_pending();
        self.snapshot_due.clear();
        self.closed = true;
        log::info!("Closed board {}", self.board.id);
    }
}

impl Drop for BoardSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debounce::Duration;
    use crate::realtime::{ChangeFeed, FeedError, Subscription};
    use crate::serializer::serialize;
    use crate::shapes::{Rectangle, Shape};
    use crate::testing::{Fixture, block_on};
    use kurbo::Vec2;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn open(fx: &Fixture, user: UserId) -> BoardSession {
        let store: Arc<dyn BoardStore> = fx.store.clone();
        block_on(BoardSession::open(
            store,
            fx.store.as_ref(),
            fx.board.id,
            user,
            SessionConfig::default(),
        ))
        .unwrap()
    }

    fn draw_rect(session: &mut BoardSession, from: Point, to: Point, now: Instant) {
        session.set_tool(ToolKind::Rectangle, now);
        session.pointer_down(from, false, now);
        session.pointer_move(to, now);
        session.pointer_up(to, now);
    }

    fn stroke(session: &mut BoardSession, y: f64, now: Instant) {
        session.pointer_down(Point::new(0.0, y), false, now);
        for x in 1..10 {
            session.pointer_move(Point::new(x as f64 * 5.0, y), now);
        }
        session.pointer_up(Point::new(50.0, y), now);
    }

    fn rows(fx: &Fixture) -> usize {
        block_on(fx.store.get_objects_by_board(fx.board.id)).unwrap().len()
    }

    #[test]
    fn test_open_loads_objects() {
        let fx = Fixture::new();
        let shape = Shape::Rectangle(Rectangle::new(Point::new(1.0, 2.0), 3.0, 4.0));
        let record = serialize(&shape, fx.board.id).unwrap();
        block_on(fx.store.create_object(record, fx.board.id, fx.owner)).unwrap();

        let session = open(&fx, fx.owner);
        assert_eq!(session.role(), Role::Owner);
        assert_eq!(session.canvas().document.len(), 1);
        assert!(session.canvas().document.object_id(shape.id()).is_some());
        assert!(!session.history().can_undo());
    }

    #[test]
    fn test_open_without_access() {
        let fx = Fixture::new();
        let store: Arc<dyn BoardStore> = fx.store.clone();
        let result = block_on(BoardSession::open(
            store,
            fx.store.as_ref(),
            fx.board.id,
            UserId::new_v4(),
            SessionConfig::default(),
        ));
        assert!(matches!(result, Err(StorageError::PermissionDenied(_))));
    }

    #[test]
    fn test_draw_persists_after_window() {
        let fx = Fixture::new();
        let mut session = open(&fx, fx.owner);
        let t0 = Instant::now();
        draw_rect(&mut session, Point::new(10.0, 10.0), Point::new(60.0, 50.0), t0);

        block_on(session.tick(t0 + ms(500)));
        assert_eq!(rows(&fx), 0);
        block_on(session.tick(t0 + ms(1000)));
        assert_eq!(rows(&fx), 1);
        assert_eq!(session.history().len(), 2);

        // Own echo does not trigger a reload
        block_on(session.tick(t0 + ms(1100)));
        assert!(!session.reconciler.is_stale());
    }

    #[test]
    fn test_stroke_burst_is_one_snapshot() {
        let fx = Fixture::new();
        let mut session = open(&fx, fx.owner);
        session.set_tool(ToolKind::Draw, Instant::now());
        let t0 = Instant::now();
        let mut now = t0;
        for i in 0..60 {
            stroke(&mut session, i as f64 * 3.0, now);
            now += ms(16);
            block_on(session.tick(now));
        }
        assert_eq!(rows(&fx), 0);
        assert_eq!(session.history().len(), 1);

        block_on(session.tick(now + ms(1000)));
        assert_eq!(session.history().len(), 2);
        // One create per stroke, none per sampled point
        assert_eq!(rows(&fx), 60);
        assert_eq!(session.canvas().document.len(), 60);
    }

    #[test]
    fn test_undo_redo_round_trip() {
        let fx = Fixture::new();
        let mut session = open(&fx, fx.owner);
        let mut now = Instant::now();
        for i in 0..3 {
            let x = i as f64 * 100.0;
            draw_rect(&mut session, Point::new(x, 0.0), Point::new(x + 50.0, 50.0), now);
            now += ms(1000);
            block_on(session.tick(now));
        }
        assert_eq!(session.canvas().document.len(), 3);
        assert_eq!(rows(&fx), 3);

        for _ in 0..3 {
            assert!(session.undo(now));
        }
        assert!(!session.undo(now));
        assert!(session.canvas().document.is_empty());
        now += ms(1000);
        block_on(session.tick(now));
        assert_eq!(rows(&fx), 0);

        for _ in 0..3 {
            assert!(session.redo(now));
        }
        assert!(!session.redo(now));
        assert_eq!(session.canvas().document.len(), 3);
        now += ms(1000);
        block_on(session.tick(now));
        assert_eq!(rows(&fx), 3);
    }

    #[test]
    fn test_undo_settles_pending_snapshot() {
        let fx = Fixture::new();
        let mut session = open(&fx, fx.owner);
        let now = Instant::now();
        draw_rect(&mut session, Point::new(0.0, 0.0), Point::new(50.0, 50.0), now);
        // Snapshot window has not elapsed yet
        assert!(session.undo(now));
        assert!(session.canvas().document.is_empty());
        assert!(session.redo(now));
        assert_eq!(session.canvas().document.len(), 1);
    }

    #[test]
    fn test_remote_change_reloads_and_keeps_selection() {
        let fx = Fixture::new();
        let mut session = open(&fx, fx.owner);
        let t0 = Instant::now();
        draw_rect(&mut session, Point::new(0.0, 0.0), Point::new(50.0, 50.0), t0);
        block_on(session.tick(t0 + ms(1000)));
        let selected = session.canvas().selection().to_vec();
        assert_eq!(selected.len(), 1);

        // Someone else adds an object
        let other = Shape::Rectangle(Rectangle::new(Point::new(300.0, 300.0), 20.0, 20.0));
        let record = serialize(&other, fx.board.id).unwrap();
        block_on(fx.store.create_object(record, fx.board.id, UserId::new_v4())).unwrap();

        block_on(session.tick(t0 + ms(1100)));
        assert_eq!(session.canvas().document.len(), 2);
        assert_eq!(session.canvas().selection(), &selected[..]);
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn test_reload_waits_for_idle_and_pending_writes() {
        let fx = Fixture::new();
        let mut session = open(&fx, fx.owner);
        let t0 = Instant::now();
        draw_rect(&mut session, Point::new(0.0, 0.0), Point::new(50.0, 50.0), t0);

        let other = Shape::Rectangle(Rectangle::new(Point::new(300.0, 300.0), 20.0, 20.0));
        let record = serialize(&other, fx.board.id).unwrap();
        block_on(fx.store.create_object(record, fx.board.id, UserId::new_v4())).unwrap();

        // Local create still waiting: no reload yet
        block_on(session.tick(t0 + ms(100)));
        assert_eq!(session.canvas().document.len(), 1);

        block_on(session.tick(t0 + ms(1000)));
        block_on(session.tick(t0 + ms(1001)));
        assert_eq!(session.canvas().document.len(), 2);
    }

    #[test]
    fn test_viewer_cannot_mutate() {
        let fx = Fixture::new();
        let viewer = fx.user("viewer@example.com");
        block_on(fx.store.add_collaborator(fx.board.id, viewer, Role::Viewer, Some(fx.owner)))
            .unwrap();
        let shape = Shape::Rectangle(Rectangle::new(Point::new(0.0, 0.0), 50.0, 50.0));
        let record = serialize(&shape, fx.board.id).unwrap();
        block_on(fx.store.create_object(record, fx.board.id, fx.owner)).unwrap();

        let mut session = open(&fx, viewer);
        assert_eq!(session.role(), Role::Viewer);
        let now = Instant::now();

        session.set_tool(ToolKind::Rectangle, now);
        assert_eq!(session.canvas().tool_manager.current_tool(), ToolKind::Select);

        session.command(KeyCommand::SelectAll, now);
        session.command(KeyCommand::Nudge(Vec2::new(10.0, 0.0)), now);
        session.command(KeyCommand::Delete, now);
        assert_eq!(session.canvas().document.len(), 1);
        assert_eq!(
            session.canvas().document.get_shape(shape.id()).unwrap().bounds().origin(),
            Point::new(0.0, 0.0)
        );
        assert!(!session.take_notifications().is_empty());

        block_on(session.tick(now + ms(2000)));
        let rows = block_on(fx.store.get_objects_by_board(fx.board.id)).unwrap();
        assert_eq!(rows[0].position_x, 0.0);
    }

    fn remote_rect(fx: &Fixture, author: UserId, at: Point) -> Shape {
        let shape = Shape::Rectangle(Rectangle::new(at, 20.0, 20.0));
        let record = serialize(&shape, fx.board.id).unwrap();
        block_on(fx.store.create_object(record, fx.board.id, author)).unwrap();
        shape
    }

    #[test]
    fn test_drag_ended_by_leave_is_saved() {
        let fx = Fixture::new();
        let mut session = open(&fx, fx.owner);
        let t0 = Instant::now();
        draw_rect(&mut session, Point::new(0.0, 0.0), Point::new(60.0, 60.0), t0);
        block_on(session.tick(t0 + ms(1000)));
        let x = block_on(fx.store.get_objects_by_board(fx.board.id)).unwrap()[0].position_x;

        let t1 = t0 + ms(2000);
        session.set_tool(ToolKind::Select, t1);
        session.pointer_down(Point::new(2.0, 30.0), false, t1);
        session.pointer_move(Point::new(32.0, 30.0), t1);
        session.pointer_leave(t1);
        assert!(session.has_pending());

        block_on(session.tick(t1 + ms(1000)));
        let rows = block_on(fx.store.get_objects_by_board(fx.board.id)).unwrap();
        assert_eq!(rows[0].position_x, x + 30.0);
        assert_eq!(session.history().len(), 3);
    }

    #[test]
    fn test_reopen_keeps_stacking_after_deletes() {
        let fx = Fixture::new();
        let mut session = open(&fx, fx.owner);
        let mut now = Instant::now();
        for i in 0..3 {
            let x = i as f64 * 100.0;
            draw_rect(&mut session, Point::new(x, 0.0), Point::new(x + 60.0, 60.0), now);
            now += ms(1000);
            block_on(session.tick(now));
        }

        // Delete the two bottom shapes, then draw another on top
        session.set_tool(ToolKind::Select, now);
        session.pointer_down(Point::new(2.0, 30.0), false, now);
        session.pointer_up(Point::new(2.0, 30.0), now);
        session.pointer_down(Point::new(102.0, 30.0), true, now);
        session.pointer_up(Point::new(102.0, 30.0), now);
        session.command(KeyCommand::Delete, now);
        draw_rect(&mut session, Point::new(300.0, 0.0), Point::new(360.0, 60.0), now);
        now += ms(1000);
        block_on(session.tick(now));
        assert_eq!(rows(&fx), 2);

        let order = session.canvas().document.z_order().to_vec();
        let reopened = open(&fx, fx.owner);
        assert_eq!(reopened.canvas().document.z_order(), &order[..]);
    }

    #[test]
    fn test_undo_after_reload_keeps_remote_objects() {
        let fx = Fixture::new();
        let editor = fx.user("editor@example.com");
        block_on(fx.store.add_collaborator(fx.board.id, editor, Role::Editor, Some(fx.owner)))
            .unwrap();
        let mut session = open(&fx, fx.owner);
        let t0 = Instant::now();
        draw_rect(&mut session, Point::new(0.0, 0.0), Point::new(60.0, 60.0), t0);
        block_on(session.tick(t0 + ms(1000)));

        let remote = remote_rect(&fx, editor, Point::new(300.0, 300.0));
        block_on(session.tick(t0 + ms(1100)));
        assert_eq!(session.canvas().document.len(), 2);

        // Undoing the rectangle must not take the editor's object with it
        assert!(session.undo(t0 + ms(1200)));
        assert_eq!(session.canvas().document.len(), 1);
        assert!(session.canvas().document.get_shape(remote.id()).is_some());
        block_on(session.tick(t0 + ms(2200)));
        assert_eq!(rows(&fx), 1);
        let reopened = open(&fx, editor);
        assert!(reopened.canvas().document.get_shape(remote.id()).is_some());

        assert!(session.redo(t0 + ms(2300)));
        assert_eq!(session.canvas().document.len(), 2);
    }

    #[test]
    fn test_viewer_after_reload_keeps_remote_objects() {
        let fx = Fixture::new();
        let viewer = fx.user("viewer@example.com");
        block_on(fx.store.add_collaborator(fx.board.id, viewer, Role::Viewer, Some(fx.owner)))
            .unwrap();
        let mut session = open(&fx, viewer);
        let t0 = Instant::now();

        let remote = remote_rect(&fx, fx.owner, Point::new(0.0, 0.0));
        block_on(session.tick(t0));
        assert_eq!(session.canvas().document.len(), 1);

        // A drag cannot be refused up front; it is put back when it ends
        session.pointer_down(Point::new(1.0, 10.0), false, t0);
        session.pointer_move(Point::new(31.0, 10.0), t0);
        session.pointer_up(Point::new(31.0, 10.0), t0);
        session.command(KeyCommand::Nudge(Vec2::new(10.0, 0.0)), t0);
        session.command(KeyCommand::Delete, t0);

        let shape = session.canvas().document.get_shape(remote.id()).unwrap();
        assert_eq!(shape.bounds().origin(), Point::new(0.0, 0.0));
        assert_eq!(session.take_notifications().len(), 3);
        assert!(!session.has_pending());
        block_on(session.tick(t0 + ms(2000)));
        let rows = block_on(fx.store.get_objects_by_board(fx.board.id)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].position_x, 0.0);
    }

    #[test]
    fn test_save_now_skips_the_window() {
        let fx = Fixture::new();
        let mut session = open(&fx, fx.owner);
        let now = Instant::now();
        draw_rect(&mut session, Point::new(0.0, 0.0), Point::new(60.0, 60.0), now);
        block_on(session.save_now());
        assert_eq!(rows(&fx), 1);
        assert!(!session.has_pending());
        assert_eq!(session.history().len(), 2);

        // Its echo is expected like any other write
        block_on(session.tick(now + ms(10)));
        assert!(!session.reconciler.is_stale());
    }

    #[test]
    fn test_bad_image_notifies() {
        let fx = Fixture::new();
        let mut session = open(&fx, fx.owner);
        let now = Instant::now();
        assert!(session.insert_image(Point::ZERO, b"garbage", now).is_none());
        assert!(session.canvas().document.is_empty());
        assert!(!session.has_pending());
        assert_eq!(session.take_notifications().len(), 1);
    }

    struct DeadFeed;

    impl ChangeFeed for DeadFeed {
        fn subscribe(&self, _: BoardId) -> Result<Subscription, FeedError> {
            Err(FeedError::Connect("refused".into()))
        }
    }

    #[test]
    fn test_feed_failure_is_not_fatal() {
        let fx = Fixture::new();
        let store: Arc<dyn BoardStore> = fx.store.clone();
        let mut session = block_on(BoardSession::open(
            store,
            &DeadFeed,
            fx.board.id,
            fx.owner,
            SessionConfig::default(),
        ))
        .unwrap();
        assert_eq!(session.take_notifications().len(), 1);
        assert!(!session.reconciler.is_subscribed());
    }

    #[test]
    fn test_close_unsubscribes_and_drops_pending() {
        let fx = Fixture::new();
        let mut session = open(&fx, fx.owner);
        let now = Instant::now();
        draw_rect(&mut session, Point::new(0.0, 0.0), Point::new(50.0, 50.0), now);
        assert!(session.has_pending());

        session.close();
        assert!(session.is_closed());
        assert!(!session.has_pending());
        assert!(!session.reconciler.is_subscribed());
        block_on(session.tick(now + ms(5000)));
        assert_eq!(rows(&fx), 0);
    }
}
