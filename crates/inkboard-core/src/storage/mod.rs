//! Storage boundary: boards, board objects and collaborators.

mod memory;

pub use memory::MemoryStore;

use crate::serializer::{BoardObjectRecord, ObjectPatch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

pub type BoardId = Uuid;
pub type ObjectId = Uuid;
pub type UserId = Uuid;
pub type CollaboratorId = Uuid;
pub type TemplateId = Uuid;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for async operations (compatible with WASM).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Collaborator role, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Commenter,
    Editor,
    Owner,
}

impl Role {
    /// Position in the privilege order, viewer lowest.
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// May create, change and delete board objects.
    pub fn can_edit(self) -> bool {
        self >= Role::Editor
    }

    pub fn can_comment(self) -> bool {
        self >= Role::Commenter
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub id: BoardId,
    pub name: String,
    pub owner: UserId,
    /// CSS hex color.
    pub background_color: String,
    pub canvas_width: f64,
    pub canvas_height: f64,
    #[serde(default)]
    pub shared: bool,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
    pub id: CollaboratorId,
    pub board_id: BoardId,
    pub user_id: UserId,
    pub role: Role,
    #[serde(default)]
    pub invited_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Reusable starting point for new boards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardTemplate {
    pub id: TemplateId,
    pub name: String,
    pub background_color: String,
    pub canvas_width: f64,
    pub canvas_height: f64,
    /// Object rows copied into every board made from this template.
    #[serde(default)]
    pub objects: Vec<BoardObjectRecord>,
}

/// Backend holding boards, their objects and collaborators.
///
/// Note: On native platforms, implementations must be Send + Sync.
/// On WASM, these bounds are relaxed since it's single-threaded.
#[cfg(not(target_arch = "wasm32"))]
pub trait BoardStore: Send + Sync {
    fn get_board(&self, board_id: BoardId) -> BoxFuture<'_, StorageResult<Board>>;

    /// Every object of a board, in no particular order.
    fn get_objects_by_board(
        &self,
        board_id: BoardId,
    ) -> BoxFuture<'_, StorageResult<Vec<BoardObjectRecord>>>;

    /// Persist a new object. The returned record carries the issued id.
    fn create_object(
        &self,
        record: BoardObjectRecord,
        board_id: BoardId,
        author_id: UserId,
    ) -> BoxFuture<'_, StorageResult<BoardObjectRecord>>;

    fn update_object(&self, id: ObjectId, patch: ObjectPatch) -> BoxFuture<'_, StorageResult<()>>;

    fn delete_object(&self, id: ObjectId) -> BoxFuture<'_, StorageResult<()>>;

    fn get_collaborators(&self, board_id: BoardId)
    -> BoxFuture<'_, StorageResult<Vec<Collaborator>>>;

    fn add_collaborator(
        &self,
        board_id: BoardId,
        user_id: UserId,
        role: Role,
        invited_by: Option<UserId>,
    ) -> BoxFuture<'_, StorageResult<Collaborator>>;

    fn update_collaborator_role(
        &self,
        id: CollaboratorId,
        role: Role,
    ) -> BoxFuture<'_, StorageResult<Collaborator>>;

    fn remove_collaborator(&self, id: CollaboratorId) -> BoxFuture<'_, StorageResult<()>>;

    fn resolve_user_by_email<'a>(
        &'a self,
        email: &'a str,
    ) -> BoxFuture<'a, StorageResult<Option<User>>>;

    fn set_board_shared(&self, board_id: BoardId, shared: bool) -> BoxFuture<'_, StorageResult<()>>;

    /// Instantiate a template as a new board owned by `author_id`.
    fn create_board_from_template(
        &self,
        template_id: TemplateId,
        board_name: String,
        author_id: UserId,
        project_id: Option<Uuid>,
    ) -> BoxFuture<'_, StorageResult<Board>>;
}

/// Board backend (WASM version without Send + Sync).
#[cfg(target_arch = "wasm32")]
pub trait BoardStore {
    fn get_board(&self, board_id: BoardId) -> BoxFuture<'_, StorageResult<Board>>;

    fn get_objects_by_board(
        &self,
        board_id: BoardId,
    ) -> BoxFuture<'_, StorageResult<Vec<BoardObjectRecord>>>;

    fn create_object(
        &self,
        record: BoardObjectRecord,
        board_id: BoardId,
        author_id: UserId,
    ) -> BoxFuture<'_, StorageResult<BoardObjectRecord>>;

    fn update_object(&self, id: ObjectId, patch: ObjectPatch) -> BoxFuture<'_, StorageResult<()>>;

    fn delete_object(&self, id: ObjectId) -> BoxFuture<'_, StorageResult<()>>;

    fn get_collaborators(&self, board_id: BoardId)
    -> BoxFuture<'_, StorageResult<Vec<Collaborator>>>;

    fn add_collaborator(
        &self,
        board_id: BoardId,
        user_id: UserId,
        role: Role,
        invited_by: Option<UserId>,
    ) -> BoxFuture<'_, StorageResult<Collaborator>>;

    fn update_collaborator_role(
        &self,
        id: CollaboratorId,
        role: Role,
    ) -> BoxFuture<'_, StorageResult<Collaborator>>;

    fn remove_collaborator(&self, id: CollaboratorId) -> BoxFuture<'_, StorageResult<()>>;

    fn resolve_user_by_email<'a>(
        &'a self,
        email: &'a str,
    ) -> BoxFuture<'a, StorageResult<Option<User>>>;

    fn set_board_shared(&self, board_id: BoardId, shared: bool) -> BoxFuture<'_, StorageResult<()>>;

    fn create_board_from_template(
        &self,
        template_id: TemplateId,
        board_name: String,
        author_id: UserId,
        project_id: Option<Uuid>,
    ) -> BoxFuture<'_, StorageResult<Board>>;
}
