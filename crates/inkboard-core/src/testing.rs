//! Shared test helpers.

use crate::storage::{Board, MemoryStore, UserId};
use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Drive a future to completion on the current thread.
///
/// Storage futures in tests never wait on I/O, so spinning on a no-op waker
/// is enough.
pub fn block_on<F: Future>(fut: F) -> F::Output {
    let mut fut = pin!(fut);
    let mut cx = Context::from_waker(Waker::noop());
    loop {
        if let Poll::Ready(out) = fut.as_mut().poll(&mut cx) {
            return out;
        }
        std::thread::yield_now();
    }
}

/// A memory store holding one board and its owner.
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub board: Board,
    pub owner: UserId,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let owner = store.register_user("owner@example.com", "Owner").unwrap().id;
        let board = store.create_board("Test board", owner).unwrap();
        Self {
            store,
            board,
            owner,
        }
    }

    /// Register a user who is not yet a collaborator.
    pub fn user(&self, email: &str) -> UserId {
        self.store.register_user(email, email).unwrap().id
    }
}
