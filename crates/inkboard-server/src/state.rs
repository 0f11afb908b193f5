//! Shared server state: the board store and one broadcast room per board.

use crate::error::{ApiError, ApiResult};
use dashmap::DashMap;
use futures_util::FutureExt;
use inkboard_core::storage::{BoardId, UserId};
use inkboard_core::{ChangeNotification, MemoryStore, Role, StorageError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;

pub struct AppState {
    pub store: Arc<MemoryStore>,
    /// Change notifications per board
    rooms: DashMap<BoardId, broadcast::Sender<ChangeNotification>>,
    channel_capacity: usize,
}

impl AppState {
    pub fn new(store: Arc<MemoryStore>, channel_capacity: usize) -> Self {
        Self {
            store,
            rooms: DashMap::new(),
            channel_capacity,
        }
    }

    /// Join a board's room, creating it on first use.
    pub fn subscribe(&self, board_id: BoardId) -> broadcast::Receiver<ChangeNotification> {
        self.rooms
            .entry(board_id)
            .or_insert_with(|| broadcast::channel(self.channel_capacity).0)
            .subscribe()
    }

    /// Drop a board's room once nobody listens to it.
    pub fn release(&self, board_id: BoardId) {
        self.rooms
            .remove_if(&board_id, |_, tx| tx.receiver_count() == 0);
    }

    /// Push a change to everyone subscribed to its board.
    pub fn notify(&self, change: ChangeNotification) {
        if let Some(room) = self.rooms.get(&change.board_id) {
            // No receivers left is fine
            let _ = room.send(change);
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Fail unless `user_id` holds at least `min` on the board.
    pub fn require_role(&self, board_id: BoardId, user_id: UserId, min: Role) -> ApiResult<Role> {
        match self.store.role_of(board_id, user_id)? {
            Some(role) if role >= min => Ok(role),
            Some(role) => Err(ApiError::Forbidden(format!(
                "{:?} role cannot do this on board {}",
                role, board_id
            ))),
            None => Err(ApiError::Forbidden(format!("no access to board {}", board_id))),
        }
    }
}

/// Drive a store future to completion without yielding.
///
/// Store futures are not `Send`, so handlers never hold one across an
/// `.await`. The memory store answers on the first poll.
pub fn resolve<F: Future>(fut: F) -> ApiResult<F::Output> {
    fut.now_or_never().ok_or_else(|| {
        ApiError::Storage(StorageError::Unavailable(
            "storage call did not complete".to_string(),
        ))
    })
}
