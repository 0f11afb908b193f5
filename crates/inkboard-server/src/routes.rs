//! HTTP/JSON surface over the board store.
//!
//! Callers identify themselves with an `x-user-id` header. Object writes need
//! an editor role on the board, collaborator management needs the owner.

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, resolve};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
};
use inkboard_core::storage::{
    Board, BoardId, BoardTemplate, Collaborator, CollaboratorId, ObjectId, TemplateId, User, UserId,
};
use inkboard_core::{
    BoardObjectRecord, BoardStore, ChangeKind, ChangeNotification, CollaborationManager,
    ObjectPatch, Role,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub const USER_HEADER: &str = "x-user-id";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/ws", get(crate::ws::ws_handler))
        .route("/users", post(register_user))
        .route("/users/lookup", get(lookup_user))
        .route("/boards", post(create_board))
        .route("/boards/{board_id}", get(get_board))
        .route(
            "/boards/{board_id}/objects",
            get(list_objects).post(create_object),
        )
        .route(
            "/objects/{object_id}",
            patch(update_object).delete(delete_object),
        )
        .route(
            "/boards/{board_id}/collaborators",
            get(list_collaborators).post(add_collaborator),
        )
        .route(
            "/boards/{board_id}/collaborators/{collaborator_id}",
            patch(update_collaborator).delete(remove_collaborator),
        )
        .route("/templates", post(add_template))
        .route("/templates/{template_id}/boards", post(create_from_template))
        .with_state(state)
}

/// Caller identity from the request headers.
pub fn caller(headers: &HeaderMap) -> ApiResult<UserId> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .ok_or(ApiError::Unauthenticated)
}

async fn index() -> &'static str {
    "Inkboard server - REST under /boards, change notifications at /ws"
}

async fn health() -> &'static str {
    "ok"
}

// --- Users ---

#[derive(Debug, Deserialize)]
pub struct RegisterUser {
    pub email: String,
    pub name: String,
}

async fn register_user(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterUser>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = state.store.register_user(body.email.trim(), &body.name)?;
    info!("Registered user {}", user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub email: String,
}

async fn lookup_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LookupQuery>,
) -> ApiResult<Json<User>> {
    caller(&headers)?;
    resolve(state.store.resolve_user_by_email(&query.email))??
        .map(Json)
        .ok_or_else(|| ApiError::Storage(inkboard_core::StorageError::NotFound(query.email)))
}

// --- Boards ---

#[derive(Debug, Deserialize)]
pub struct CreateBoard {
    pub name: String,
}

async fn create_board(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBoard>,
) -> ApiResult<(StatusCode, Json<Board>)> {
    let user = caller(&headers)?;
    let board = state.store.create_board(&body.name, user)?;
    info!("Board {} created by {}", board.id, user);
    Ok((StatusCode::CREATED, Json(board)))
}

async fn get_board(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(board_id): Path<BoardId>,
) -> ApiResult<Json<Board>> {
    state.require_role(board_id, caller(&headers)?, Role::Viewer)?;
    Ok(Json(resolve(state.store.get_board(board_id))??))
}

// --- Objects ---

async fn list_objects(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(board_id): Path<BoardId>,
) -> ApiResult<Json<Vec<BoardObjectRecord>>> {
    state.require_role(board_id, caller(&headers)?, Role::Viewer)?;
    Ok(Json(resolve(state.store.get_objects_by_board(board_id))??))
}

async fn create_object(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(board_id): Path<BoardId>,
    Json(record): Json<BoardObjectRecord>,
) -> ApiResult<(StatusCode, Json<BoardObjectRecord>)> {
    let user = caller(&headers)?;
    state.require_role(board_id, user, Role::Editor)?;
    let created = resolve(state.store.create_object(record, board_id, user))??;
    if let Some(object_id) = created.id {
        state.notify(ChangeNotification {
            board_id,
            kind: ChangeKind::Insert,
            object_id,
        });
    }
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_object(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(object_id): Path<ObjectId>,
    Json(patch): Json<ObjectPatch>,
) -> ApiResult<StatusCode> {
    let user = caller(&headers)?;
    let board_id = state.store.board_of_object(object_id)?;
    state.require_role(board_id, user, Role::Editor)?;
    resolve(state.store.update_object(object_id, patch))??;
    state.notify(ChangeNotification {
        board_id,
        kind: ChangeKind::Update,
        object_id,
    });
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_object(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(object_id): Path<ObjectId>,
) -> ApiResult<StatusCode> {
    let user = caller(&headers)?;
    let board_id = state.store.board_of_object(object_id)?;
    state.require_role(board_id, user, Role::Editor)?;
    resolve(state.store.delete_object(object_id))??;
    state.notify(ChangeNotification {
        board_id,
        kind: ChangeKind::Delete,
        object_id,
    });
    Ok(StatusCode::NO_CONTENT)
}

// --- Collaborators ---

async fn list_collaborators(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(board_id): Path<BoardId>,
) -> ApiResult<Json<Vec<Collaborator>>> {
    state.require_role(board_id, caller(&headers)?, Role::Viewer)?;
    let manager = CollaborationManager::new(state.store.as_ref());
    Ok(Json(resolve(manager.list(board_id))??))
}

/// Invite by user id or by email address.
#[derive(Debug, Deserialize)]
pub struct AddCollaborator {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
}

async fn add_collaborator(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(board_id): Path<BoardId>,
    Json(body): Json<AddCollaborator>,
) -> ApiResult<(StatusCode, Json<Collaborator>)> {
    let user = caller(&headers)?;
    state.require_role(board_id, user, Role::Owner)?;
    let manager = CollaborationManager::new(state.store.as_ref());
    let collaborator = match (body.user_id, body.email) {
        (Some(user_id), _) => resolve(manager.add(board_id, user_id, body.role, Some(user)))??,
        (None, Some(email)) => {
            resolve(manager.invite_by_email(board_id, &email, body.role, Some(user)))??
        }
        (None, None) => {
            return Err(ApiError::BadRequest(
                "either user_id or email is required".to_string(),
            ));
        }
    };
    Ok((StatusCode::CREATED, Json(collaborator)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRole {
    pub role: Role,
}

async fn update_collaborator(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((board_id, collaborator_id)): Path<(BoardId, CollaboratorId)>,
    Json(body): Json<UpdateRole>,
) -> ApiResult<Json<Collaborator>> {
    state.require_role(board_id, caller(&headers)?, Role::Owner)?;
    let manager = CollaborationManager::new(state.store.as_ref());
    Ok(Json(resolve(manager.update_role(board_id, collaborator_id, body.role))??))
}

async fn remove_collaborator(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((board_id, collaborator_id)): Path<(BoardId, CollaboratorId)>,
) -> ApiResult<StatusCode> {
    state.require_role(board_id, caller(&headers)?, Role::Owner)?;
    let manager = CollaborationManager::new(state.store.as_ref());
    resolve(manager.remove(board_id, collaborator_id))??;
    Ok(StatusCode::NO_CONTENT)
}

// --- Templates ---

async fn add_template(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(template): Json<BoardTemplate>,
) -> ApiResult<StatusCode> {
    caller(&headers)?;
    state.store.add_template(template)?;
    Ok(StatusCode::CREATED)
}

#[derive(Debug, Deserialize)]
pub struct FromTemplate {
    pub name: String,
    #[serde(default)]
    pub project_id: Option<Uuid>,
}

async fn create_from_template(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(template_id): Path<TemplateId>,
    Json(body): Json<FromTemplate>,
) -> ApiResult<(StatusCode, Json<Board>)> {
    let user = caller(&headers)?;
    let board = resolve(state.store.create_board_from_template(
        template_id,
        body.name,
        user,
        body.project_id,
    ))??;
    info!("Board {} created from template {}", board.id, template_id);
    Ok((StatusCode::CREATED, Json(board)))
}
