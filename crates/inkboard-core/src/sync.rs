//! Persistence synchronizer.
//!
//! Scene changes are queued per shape and written to the [`BoardStore`] once
//! the shape has been quiet for one debounce window. Deletes skip the queue.
//! Failed writes are reported as [`Notification`]s and never roll back the
//! local edit; a shape is retried only when it is touched again.

use crate::canvas::{Canvas, CanvasEvent};
use crate::debounce::{DEFAULT_DEBOUNCE, Debouncer, Duration, Instant};
use crate::realtime::ChangeKind;
use crate::serializer::ObjectPatch;
use crate::shapes::ShapeId;
use crate::storage::{BoardId, BoardStore, ObjectId, StorageError, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period before a shape's pending write is dispatched.
    #[serde(with = "millis")]
    pub debounce: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

mod millis {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Transient user-facing message. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteKind {
    Create,
    Update,
}

/// Result of one flush.
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Writes that reached storage; their change notifications are echoes.
    pub written: Vec<(ChangeKind, ObjectId)>,
    pub notifications: Vec<Notification>,
}

#[derive(Debug)]
pub struct PersistenceSync {
    board_id: BoardId,
    author_id: UserId,
    queue: Debouncer<ShapeId>,
    kinds: HashMap<ShapeId, WriteKind>,
    deletes: Vec<ObjectId>,
}

impl PersistenceSync {
    pub fn new(board_id: BoardId, author_id: UserId, config: SyncConfig) -> Self {
        Self {
            board_id,
            author_id,
            queue: Debouncer::new(config.debounce),
            kinds: HashMap::new(),
            deletes: Vec::new(),
        }
    }

    /// Feed one canvas event into the queue.
    pub fn handle(&mut self, event: CanvasEvent, now: Instant, canvas: &Canvas) {
        match event {
            CanvasEvent::Added(id) => self.object_added(id, now, canvas),
            CanvasEvent::Modified(id) => self.object_modified(id, now),
            CanvasEvent::Removed { id, object_id } => self.object_removed(id, object_id),
        }
    }

    /// Queue a create. Shapes that already carry an identity are ignored.
    pub fn object_added(&mut self, id: ShapeId, now: Instant, canvas: &Canvas) {
        if canvas.document.object_id(id).is_some() {
            log::debug!("Shape {} already persisted, skipping create", id);
            return;
        }
        self.kinds.insert(id, WriteKind::Create);
        self.queue.touch(id, now);
    }

    /// Queue an update. A create still waiting absorbs it.
    pub fn object_modified(&mut self, id: ShapeId, now: Instant) {
        self.kinds.entry(id).or_insert(WriteKind::Update);
        self.queue.touch(id, now);
    }

    /// Drop pending writes for the shape and schedule the row's delete for
    /// the next flush, whatever the time.
    pub fn object_removed(&mut self, id: ShapeId, object_id: Option<ObjectId>) {
        self.queue.cancel(&id);
        self.kinds.remove(&id);
        if let Some(object_id) = object_id {
            self.deletes.push(object_id);
        }
    }

    /// Anything waiting to be written.
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty() || !self.deletes.is_empty()
    }

    pub fn is_pending(&self, id: ShapeId) -> bool {
        self.queue.is_pending(&id)
    }

    /// Forget every queued write. Used on close.
    pub fn discard_pending(&mut self) {
        if self.has_pending() {
            log::info!(
                "Dropping {} unsynced write(s) on board {}",
                self.queue.len() + self.deletes.len(),
                self.board_id
            );
        }
        self.queue.clear();
        self.kinds.clear();
        self.deletes.clear();
    }

    /// Dispatch deletes and every write whose window has elapsed.
    pub async fn flush(
        &mut self,
        now: Instant,
        canvas: &mut Canvas,
        store: &dyn BoardStore,
    ) -> FlushReport {
        let due = self.queue.drain_due(now);
        self.dispatch(due, canvas, store).await
    }

    /// Dispatch everything queued regardless of the debounce window.
    pub async fn flush_all(&mut self, canvas: &mut Canvas, store: &dyn BoardStore) -> FlushReport {
        let all = self.queue.flush_all();
        self.dispatch(all, canvas, store).await
    }

    async fn dispatch(
        &mut self,
        ids: Vec<ShapeId>,
        canvas: &mut Canvas,
        store: &dyn BoardStore,
    ) -> FlushReport {
        let mut report = FlushReport::default();

        for object_id in std::mem::take(&mut self.deletes) {
            match store.delete_object(object_id).await {
                Ok(()) => report.written.push((ChangeKind::Delete, object_id)),
                Err(StorageError::NotFound(_)) => {
                    log::debug!("Object {} already gone", object_id);
                }
                Err(e) => {
                    log::error!("Failed to delete object {}: {}", object_id, e);
                    report
                        .notifications
                        .push(Notification::error(format!("Could not delete object: {}", e)));
                }
            }
        }

        for id in ids {
            let kind = self.kinds.remove(&id).unwrap_or(WriteKind::Update);
            let record = match canvas.record_for(id, self.board_id) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    log::error!("Failed to serialize shape {}: {}", id, e);
                    report
                        .notifications
                        .push(Notification::error(format!("Could not save object: {}", e)));
                    continue;
                }
            };

            match (kind, record.id) {
                (_, Some(object_id)) => {
                    let patch = ObjectPatch::from_record(&record);
                    match store.update_object(object_id, patch).await {
                        Ok(()) => report.written.push((ChangeKind::Update, object_id)),
                        Err(e) => {
                            log::warn!("Failed to update object {}: {}", object_id, e);
                            report.notifications.push(Notification::error(format!(
                                "Could not save changes: {}",
                                e
                            )));
                        }
                    }
                }
                (WriteKind::Update, None) => {
                    // Earlier create failed; this touch is the retry
                    log::debug!("Shape {} has no identity yet, creating it", id);
                    self.create(id, record, canvas, store, &mut report).await;
                }
                (WriteKind::Create, None) => {
                    self.create(id, record, canvas, store, &mut report).await;
                }
            }
        }
        report
    }

    async fn create(
        &self,
        id: ShapeId,
        record: crate::serializer::BoardObjectRecord,
        canvas: &mut Canvas,
        store: &dyn BoardStore,
        report: &mut FlushReport,
    ) {
        match store.create_object(record, self.board_id, self.author_id).await {
            Ok(stored) => {
                let Some(object_id) = stored.id else {
                    log::warn!("Storage returned no id for shape {}", id);
                    return;
                };
                report.written.push((ChangeKind::Insert, object_id));
                if !canvas.document.attach_identity(id, object_id) {
                    log::debug!("Shape {} removed during create, deleting row", id);
                    if store.delete_object(object_id).await.is_ok() {
                        report.written.push((ChangeKind::Delete, object_id));
                    }
                }
            }
            Err(e) => {
                log::error!("Failed to create object for shape {}: {}", id, e);
                report
                    .notifications
                    .push(Notification::error(format!("Could not save object: {}", e)));
            }
        }
    }
}
