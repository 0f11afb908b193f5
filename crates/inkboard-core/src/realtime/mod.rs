//! Remote change notifications and the reconciler that turns them into
//! board reloads.
//!
//! Reconciliation is coarse: any remote insert, update or delete marks the
//! whole board stale and the session reloads every object.

pub mod protocol;

#[cfg(not(target_arch = "wasm32"))]
mod ws;

#[cfg(not(target_arch = "wasm32"))]
pub use ws::WsChangeFeed;

use crate::storage::{BoardId, ObjectId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, TryRecvError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid feed url: {0}")]
    InvalidUrl(String),
    #[error("feed connection failed: {0}")]
    Connect(String),
    #[error("feed closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One row-level change on a board's object set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub board_id: BoardId,
    pub kind: ChangeKind,
    pub object_id: ObjectId,
}

type CancelFn = Box<dyn FnOnce() + Send>;

/// Live subscription to one board's changes. Dropping it unsubscribes.
pub struct Subscription {
    board_id: BoardId,
    rx: Receiver<ChangeNotification>,
    cancel: Option<CancelFn>,
    closed: bool,
}

impl Subscription {
    /// `cancel` runs exactly once, on `unsubscribe` or drop.
    pub fn new(
        board_id: BoardId,
        rx: Receiver<ChangeNotification>,
        cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            board_id,
            rx,
            cancel: Some(Box::new(cancel)),
            closed: false,
        }
    }

    pub fn board_id(&self) -> BoardId {
        self.board_id
    }

    /// Drain everything delivered so far without blocking.
    pub fn poll(&mut self) -> Vec<ChangeNotification> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(n) => out.push(n),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.closed {
                        log::warn!("Change feed for board {} disconnected", self.board_id);
                        self.closed = true;
                    }
                    break;
                }
            }
        }
        out
    }

    /// True once the sending side went away.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
            log::debug!("Unsubscribed from board {}", self.board_id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("board_id", &self.board_id)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Source of change notifications.
pub trait ChangeFeed {
    fn subscribe(&self, board_id: BoardId) -> Result<Subscription, FeedError>;
}

/// Polls an announced echo is waited for before it is forgotten.
pub const ECHO_WINDOW_POLLS: u32 = 50;

#[derive(Debug, Clone, Copy)]
struct ExpectedEcho {
    count: u32,
    polls_left: u32,
}

/// Tracks whether the local copy of a board is out of date.
///
/// Echoes of this client's own writes are announced with [`Self::expect_echo`]
/// and swallowed instead of triggering a reload. An echo that does not show
/// up within [`ECHO_WINDOW_POLLS`] polls is dropped, so a lost notification
/// cannot hide a later remote change to the same object.
#[derive(Debug)]
pub struct Reconciler {
    subscription: Option<Subscription>,
    stale: bool,
    expected: HashMap<(ChangeKind, ObjectId), ExpectedEcho>,
}

impl Reconciler {
    pub fn new(subscription: Subscription) -> Self {
        Self {
            subscription: Some(subscription),
            stale: false,
            expected: HashMap::new(),
        }
    }

    /// Reconciler with no feed; never goes stale.
    pub fn detached() -> Self {
        Self {
            subscription: None,
            stale: false,
            expected: HashMap::new(),
        }
    }

    /// Mark a change this client is about to cause.
    pub fn expect_echo(&mut self, kind: ChangeKind, object_id: ObjectId) {
        if self.subscription.is_none() {
            return;
        }
        let echo = self.expected.entry((kind, object_id)).or_insert(ExpectedEcho {
            count: 0,
            polls_left: ECHO_WINDOW_POLLS,
        });
        echo.count += 1;
        echo.polls_left = ECHO_WINDOW_POLLS;
    }

    /// Pull pending notifications. Returns whether the board is now stale.
    pub fn poll(&mut self) -> bool {
        let Some(subscription) = self.subscription.as_mut() else {
            return self.stale;
        };
        let board_id = subscription.board_id();
        for change in subscription.poll() {
            if change.board_id != board_id {
                continue;
            }
            let key = (change.kind, change.object_id);
            if let Some(echo) = self.expected.get_mut(&key) {
                echo.count -= 1;
                if echo.count == 0 {
                    self.expected.remove(&key);
                }
                continue;
            }
            log::debug!(
                "Remote {:?} of object {} on board {}",
                change.kind,
                change.object_id,
                board_id
            );
            self.stale = true;
        }
        self.expected.retain(|_, echo| {
            echo.polls_left -= 1;
            echo.polls_left > 0
        });
        self.stale
    }

    /// Echoes announced and not yet seen.
    pub fn pending_echoes(&self) -> usize {
        self.expected.values().map(|echo| echo.count as usize).sum()
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Call after the board was reloaded.
    pub fn mark_fresh(&mut self) {
        self.stale = false;
    }

    /// Tear down the subscription.
    pub fn close(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.expected.clear();
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::channel;
    use uuid::Uuid;

    fn change(board_id: BoardId, kind: ChangeKind, object_id: ObjectId) -> ChangeNotification {
        ChangeNotification {
            board_id,
            kind,
            object_id,
        }
    }

    #[test]
    fn test_cancel_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let (_tx, rx) = channel();
        let mut sub = Subscription::new(Uuid::new_v4(), rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();
        sub.unsubscribe();
        drop(sub);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remote_change_marks_stale() {
        let board = Uuid::new_v4();
        let (tx, rx) = channel();
        let mut reconciler = Reconciler::new(Subscription::new(board, rx, || {}));
        assert!(!reconciler.poll());
        tx.send(change(board, ChangeKind::Update, Uuid::new_v4())).unwrap();
        assert!(reconciler.poll());
        reconciler.mark_fresh();
        assert!(!reconciler.is_stale());
    }

    #[test]
    fn test_own_echo_is_swallowed() {
        let board = Uuid::new_v4();
        let object = Uuid::new_v4();
        let (tx, rx) = channel();
        let mut reconciler = Reconciler::new(Subscription::new(board, rx, || {}));
        reconciler.expect_echo(ChangeKind::Update, object);
        tx.send(change(board, ChangeKind::Update, object)).unwrap();
        assert!(!reconciler.poll());
        // Second update of the same object is someone else's
        tx.send(change(board, ChangeKind::Update, object)).unwrap();
        assert!(reconciler.poll());
    }

    #[test]
    fn test_lost_echo_expires() {
        let board = Uuid::new_v4();
        let object = Uuid::new_v4();
        let (tx, rx) = channel();
        let mut reconciler = Reconciler::new(Subscription::new(board, rx, || {}));
        reconciler.expect_echo(ChangeKind::Update, object);
        for _ in 0..ECHO_WINDOW_POLLS {
            assert!(!reconciler.poll());
        }
        assert_eq!(reconciler.pending_echoes(), 0);

        // The echo never came; this update is someone else's
        tx.send(change(board, ChangeKind::Update, object)).unwrap();
        assert!(reconciler.poll());
    }

    #[test]
    fn test_detached_expects_nothing() {
        let mut reconciler = Reconciler::detached();
        reconciler.expect_echo(ChangeKind::Insert, Uuid::new_v4());
        assert_eq!(reconciler.pending_echoes(), 0);
        assert!(!reconciler.poll());
    }

    #[test]
    fn test_other_boards_ignored_and_close() {
        let board = Uuid::new_v4();
        let (tx, rx) = channel();
        let mut reconciler = Reconciler::new(Subscription::new(board, rx, || {}));
        tx.send(change(Uuid::new_v4(), ChangeKind::Insert, Uuid::new_v4()))
            .unwrap();
        assert!(!reconciler.poll());
        reconciler.close();
        assert!(!reconciler.is_subscribed());
        assert!(!reconciler.poll());
    }
}
