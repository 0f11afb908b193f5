//! In-memory board store.

use super::{
    Board, BoardId, BoardStore, BoardTemplate, BoxFuture, Collaborator, CollaboratorId, ObjectId,
    Role, StorageError, StorageResult, TemplateId, User, UserId,
};
use crate::realtime::{ChangeFeed, ChangeKind, ChangeNotification, FeedError, Subscription};
use crate::serializer::{BoardObjectRecord, ObjectPatch};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::mpsc::{Sender, channel};
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

#[derive(Default)]
struct FeedRegistry {
    next_id: u64,
    listeners: HashMap<BoardId, Vec<(u64, Sender<ChangeNotification>)>>,
}

impl FeedRegistry {
    fn publish(&mut self, change: ChangeNotification) {
        if let Some(listeners) = self.listeners.get_mut(&change.board_id) {
            // Receivers that went away are pruned on the next publish
            listeners.retain(|(_, tx)| tx.send(change).is_ok());
        }
    }
}

/// In-memory storage for tests, the reference server and ephemeral boards.
///
/// Also acts as an in-process [`ChangeFeed`]: every object write is
/// published to the board's subscribers.
#[derive(Default)]
pub struct MemoryStore {
    boards: RwLock<HashMap<BoardId, Board>>,
    objects: RwLock<HashMap<ObjectId, BoardObjectRecord>>,
    collaborators: RwLock<HashMap<CollaboratorId, Collaborator>>,
    users: RwLock<HashMap<UserId, User>>,
    templates: RwLock<HashMap<TemplateId, BoardTemplate>>,
    feeds: Arc<Mutex<FeedRegistry>>,
}

fn lock_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Other(format!("Lock error: {}", e))
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a board and record its creator as owner.
    pub fn create_board(&self, name: &str, owner: UserId) -> StorageResult<Board> {
        let now = Utc::now();
        let board = Board {
            id: Uuid::new_v4(),
            name: name.to_string(),
            owner,
            background_color: "#ffffff".to_string(),
            canvas_width: 3000.0,
            canvas_height: 2000.0,
            shared: false,
            project_id: None,
            created_at: now,
            updated_at: now,
        };
        self.insert_board(board.clone())?;
        Ok(board)
    }

    fn insert_board(&self, board: Board) -> StorageResult<()> {
        let owner = Collaborator {
            id: Uuid::new_v4(),
            board_id: board.id,
            user_id: board.owner,
            role: Role::Owner,
            invited_by: None,
            created_at: board.created_at,
        };
        self.boards.write().map_err(lock_err)?.insert(board.id, board);
        self.collaborators
            .write()
            .map_err(lock_err)?
            .insert(owner.id, owner);
        Ok(())
    }

    pub fn register_user(&self, email: &str, name: &str) -> StorageResult<User> {
        let mut users = self.users.write().map_err(lock_err)?;
        if users.values().any(|u| u.email.eq_ignore_ascii_case(email)) {
            return Err(StorageError::Conflict(format!("email {} already registered", email)));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.to_string(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    pub fn add_template(&self, template: BoardTemplate) -> StorageResult<()> {
        self.templates
            .write()
            .map_err(lock_err)?
            .insert(template.id, template);
        Ok(())
    }

    /// Role of `user_id` on a board, if they collaborate on it.
    pub fn role_of(&self, board_id: BoardId, user_id: UserId) -> StorageResult<Option<Role>> {
        let collaborators = self.collaborators.read().map_err(lock_err)?;
        Ok(collaborators
            .values()
            .find(|c| c.board_id == board_id && c.user_id == user_id)
            .map(|c| c.role))
    }

    /// Board that owns an object row.
    pub fn board_of_object(&self, id: ObjectId) -> StorageResult<BoardId> {
        let objects = self.objects.read().map_err(lock_err)?;
        objects
            .get(&id)
            .map(|r| r.board_id)
            .ok_or_else(|| StorageError::NotFound(format!("object {}", id)))
    }

    /// Board a collaborator row belongs to.
    pub fn board_of_collaborator(&self, id: CollaboratorId) -> StorageResult<BoardId> {
        let collaborators = self.collaborators.read().map_err(lock_err)?;
        collaborators
            .get(&id)
            .map(|c| c.board_id)
            .ok_or_else(|| StorageError::NotFound(format!("collaborator {}", id)))
    }

    fn publish(&self, board_id: BoardId, kind: ChangeKind, object_id: ObjectId) {
        match self.feeds.lock() {
            Ok(mut feeds) => feeds.publish(ChangeNotification {
                board_id,
                kind,
                object_id,
            }),
            Err(e) => log::error!("Change feed registry poisoned: {}", e),
        }
    }

    fn ensure_board(&self, board_id: BoardId) -> StorageResult<()> {
        let boards = self.boards.read().map_err(lock_err)?;
        if boards.contains_key(&board_id) {
            Ok(())
        } else {
            Err(StorageError::NotFound(format!("board {}", board_id)))
        }
    }
}

impl ChangeFeed for MemoryStore {
    fn subscribe(&self, board_id: BoardId) -> Result<Subscription, FeedError> {
        let (tx, rx) = channel();
        let id = {
            let mut feeds = self.feeds.lock().map_err(|_| FeedError::Closed)?;
            feeds.next_id += 1;
            let id = feeds.next_id;
            feeds.listeners.entry(board_id).or_default().push((id, tx));
            id
        };
        let registry = Arc::downgrade(&self.feeds);
        Ok(Subscription::new(board_id, rx, move || {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            if let Ok(mut feeds) = registry.lock() {
                if let Some(listeners) = feeds.listeners.get_mut(&board_id) {
                    listeners.retain(|(listener, _)| *listener != id);
                }
            }
        }))
    }
}

impl BoardStore for MemoryStore {
    fn get_board(&self, board_id: BoardId) -> BoxFuture<'_, StorageResult<Board>> {
        Box::pin(async move {
            let boards = self.boards.read().map_err(lock_err)?;
            boards
                .get(&board_id)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(format!("board {}", board_id)))
        })
    }

    fn get_objects_by_board(
        &self,
        board_id: BoardId,
    ) -> BoxFuture<'_, StorageResult<Vec<BoardObjectRecord>>> {
        Box::pin(async move {
            self.ensure_board(board_id)?;
            let objects = self.objects.read().map_err(lock_err)?;
            Ok(objects
                .values()
                .filter(|r| r.board_id == board_id)
                .cloned()
                .collect())
        })
    }

    fn create_object(
        &self,
        record: BoardObjectRecord,
        board_id: BoardId,
        author_id: UserId,
    ) -> BoxFuture<'_, StorageResult<BoardObjectRecord>> {
        Box::pin(async move {
            self.ensure_board(board_id)?;
            let now = Utc::now();
            let id = Uuid::new_v4();
            let stored = BoardObjectRecord {
                id: Some(id),
                board_id,
                created_by: Some(author_id),
                created_at: Some(now),
                updated_at: Some(now),
                ..record
            };
            self.objects
                .write()
                .map_err(lock_err)?
                .insert(id, stored.clone());
            self.publish(board_id, ChangeKind::Insert, id);
            Ok(stored)
        })
    }

    fn update_object(&self, id: ObjectId, patch: ObjectPatch) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            let board_id = {
                let mut objects = self.objects.write().map_err(lock_err)?;
                let record = objects
                    .get_mut(&id)
                    .ok_or_else(|| StorageError::NotFound(format!("object {}", id)))?;
                patch.apply_to(record);
                record.updated_at = Some(Utc::now());
                record.board_id
            };
            self.publish(board_id, ChangeKind::Update, id);
            Ok(())
        })
    }

    fn delete_object(&self, id: ObjectId) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            let removed = self.objects.write().map_err(lock_err)?.remove(&id);
            let record = removed.ok_or_else(|| StorageError::NotFound(format!("object {}", id)))?;
            self.publish(record.board_id, ChangeKind::Delete, id);
            Ok(())
        })
    }

    fn get_collaborators(
        &self,
        board_id: BoardId,
    ) -> BoxFuture<'_, StorageResult<Vec<Collaborator>>> {
        Box::pin(async move {
            let collaborators = self.collaborators.read().map_err(lock_err)?;
            let mut list: Vec<_> = collaborators
                .values()
                .filter(|c| c.board_id == board_id)
                .cloned()
                .collect();
            list.sort_by(|a, b| b.role.cmp(&a.role).then(a.created_at.cmp(&b.created_at)));
            Ok(list)
        })
    }

    fn add_collaborator(
        &self,
        board_id: BoardId,
        user_id: UserId,
        role: Role,
        invited_by: Option<UserId>,
    ) -> BoxFuture<'_, StorageResult<Collaborator>> {
        Box::pin(async move {
            self.ensure_board(board_id)?;
            let mut collaborators = self.collaborators.write().map_err(lock_err)?;
            if collaborators
                .values()
                .any(|c| c.board_id == board_id && c.user_id == user_id)
            {
                return Err(StorageError::Conflict(format!(
                    "user {} already collaborates on board {}",
                    user_id, board_id
                )));
            }
            let collaborator = Collaborator {
                id: Uuid::new_v4(),
                board_id,
                user_id,
                role,
                invited_by,
                created_at: Utc::now(),
            };
            collaborators.insert(collaborator.id, collaborator.clone());
            Ok(collaborator)
        })
    }

    fn update_collaborator_role(
        &self,
        id: CollaboratorId,
        role: Role,
    ) -> BoxFuture<'_, StorageResult<Collaborator>> {
        Box::pin(async move {
            let mut collaborators = self.collaborators.write().map_err(lock_err)?;
            let collaborator = collaborators
                .get_mut(&id)
                .ok_or_else(|| StorageError::NotFound(format!("collaborator {}", id)))?;
            collaborator.role = role;
            Ok(collaborator.clone())
        })
    }

    fn remove_collaborator(&self, id: CollaboratorId) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            let mut collaborators = self.collaborators.write().map_err(lock_err)?;
            collaborators
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| StorageError::NotFound(format!("collaborator {}", id)))
        })
    }

    fn resolve_user_by_email<'a>(
        &'a self,
        email: &'a str,
    ) -> BoxFuture<'a, StorageResult<Option<User>>> {
        Box::pin(async move {
            let users = self.users.read().map_err(lock_err)?;
            let email = email.trim();
            Ok(users
                .values()
                .find(|u| u.email.eq_ignore_ascii_case(email))
                .cloned())
        })
    }

    fn set_board_shared(&self, board_id: BoardId, shared: bool) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            let mut boards = self.boards.write().map_err(lock_err)?;
            let board = boards
                .get_mut(&board_id)
                .ok_or_else(|| StorageError::NotFound(format!("board {}", board_id)))?;
            board.shared = shared;
            board.updated_at = Utc::now();
            Ok(())
        })
    }

    fn create_board_from_template(
        &self,
        template_id: TemplateId,
        board_name: String,
        author_id: UserId,
        project_id: Option<Uuid>,
    ) -> BoxFuture<'_, StorageResult<Board>> {
        Box::pin(async move {
            let template = {
                let templates = self.templates.read().map_err(lock_err)?;
                templates
                    .get(&template_id)
                    .cloned()
                    .ok_or_else(|| StorageError::NotFound(format!("template {}", template_id)))?
            };
            let now = Utc::now();
            let board = Board {
                id: Uuid::new_v4(),
                name: board_name,
                owner: author_id,
                background_color: template.background_color,
                canvas_width: template.canvas_width,
                canvas_height: template.canvas_height,
                shared: false,
                project_id,
                created_at: now,
                updated_at: now,
            };
            self.insert_board(board.clone())?;

            let mut objects = self.objects.write().map_err(lock_err)?;
            for record in template.objects {
                let id = Uuid::new_v4();
                objects.insert(
                    id,
                    BoardObjectRecord {
                        id: Some(id),
                        board_id: board.id,
                        created_by: Some(author_id),
                        created_at: Some(now),
                        updated_at: Some(now),
                        ..record
                    },
                );
            }
            log::info!("Created board {} from template {}", board.id, template_id);
            Ok(board)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::serialize;
    use crate::shapes::{Rectangle, Shape};
    use crate::testing::block_on;
    use kurbo::Point;

    fn record(board_id: BoardId) -> BoardObjectRecord {
        let shape = Shape::Rectangle(Rectangle::new(Point::new(10.0, 20.0), 30.0, 40.0));
        serialize(&shape, board_id).unwrap()
    }

    #[test]
    fn test_create_assigns_identity() {
        let store = MemoryStore::new();
        let author = Uuid::new_v4();
        let board = store.create_board("Plan", author).unwrap();

        let created = block_on(store.create_object(record(board.id), board.id, author)).unwrap();
        assert!(created.id.is_some());
        assert_eq!(created.created_by, Some(author));

        let all = block_on(store.get_objects_by_board(board.id)).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, created.id);
    }

    #[test]
    fn test_create_on_missing_board() {
        let store = MemoryStore::new();
        let board_id = Uuid::new_v4();
        let result = block_on(store.create_object(record(board_id), board_id, Uuid::new_v4()));
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_update_and_delete() {
        let store = MemoryStore::new();
        let author = Uuid::new_v4();
        let board = store.create_board("Plan", author).unwrap();
        let created = block_on(store.create_object(record(board.id), board.id, author)).unwrap();
        let id = created.id.unwrap();

        let patch = ObjectPatch {
            position_x: Some(99.0),
            ..Default::default()
        };
        block_on(store.update_object(id, patch)).unwrap();
        let all = block_on(store.get_objects_by_board(board.id)).unwrap();
        assert_eq!(all[0].position_x, 99.0);

        block_on(store.delete_object(id)).unwrap();
        assert!(block_on(store.get_objects_by_board(board.id)).unwrap().is_empty());
        assert!(matches!(
            block_on(store.delete_object(id)),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_owner_recorded_and_duplicate_rejected() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let board = store.create_board("Plan", owner).unwrap();
        assert_eq!(store.role_of(board.id, owner).unwrap(), Some(Role::Owner));

        let guest = Uuid::new_v4();
        block_on(store.add_collaborator(board.id, guest, Role::Viewer, Some(owner))).unwrap();
        let again = block_on(store.add_collaborator(board.id, guest, Role::Editor, Some(owner)));
        assert!(matches!(again, Err(StorageError::Conflict(_))));
        assert_eq!(block_on(store.get_collaborators(board.id)).unwrap().len(), 2);
    }

    #[test]
    fn test_feed_publishes_writes() {
        let store = MemoryStore::new();
        let author = Uuid::new_v4();
        let board = store.create_board("Plan", author).unwrap();
        let mut sub = store.subscribe(board.id).unwrap();

        let created = block_on(store.create_object(record(board.id), board.id, author)).unwrap();
        let id = created.id.unwrap();
        block_on(store.delete_object(id)).unwrap();

        let kinds: Vec<_> = sub.poll().into_iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::Insert, ChangeKind::Delete]);

        sub.unsubscribe();
        block_on(store.create_object(record(board.id), board.id, author)).unwrap();
        assert!(sub.poll().is_empty());
    }

    #[test]
    fn test_template_instantiation() {
        let store = MemoryStore::new();
        let template_id = Uuid::new_v4();
        let placeholder = Uuid::nil();
        store
            .add_template(BoardTemplate {
                id: template_id,
                name: "Retro".to_string(),
                background_color: "#fafafa".to_string(),
                canvas_width: 1600.0,
                canvas_height: 900.0,
                objects: vec![record(placeholder), record(placeholder)],
            })
            .unwrap();

        let author = Uuid::new_v4();
        let board = block_on(store.create_board_from_template(
            template_id,
            "Sprint 12".to_string(),
            author,
            None,
        ))
        .unwrap();
        assert_eq!(board.background_color, "#fafafa");
        assert_eq!(store.role_of(board.id, author).unwrap(), Some(Role::Owner));

        let objects = block_on(store.get_objects_by_board(board.id)).unwrap();
        assert_eq!(objects.len(), 2);
        assert!(objects.iter().all(|o| o.board_id == board.id && o.id.is_some()));

        let missing = block_on(store.create_board_from_template(
            Uuid::new_v4(),
            "x".to_string(),
            author,
            None,
        ));
        assert!(matches!(missing, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_resolve_user_by_email() {
        let store = MemoryStore::new();
        let user = store.register_user("ada@example.com", "Ada").unwrap();
        let found = block_on(store.resolve_user_by_email("ADA@example.com")).unwrap();
        assert_eq!(found, Some(user));
        assert_eq!(block_on(store.resolve_user_by_email("nobody@example.com")).unwrap(), None);
    }
}
