//! Keyed debounce queue.
//!
//! Every `touch` pushes a key's deadline out by one window. Callers pass the
//! current time in, so the queue never reads a clock itself.

use std::collections::HashMap;
use std::hash::Hash;

#[cfg(not(target_arch = "wasm32"))]
pub use std::time::{Duration, Instant};

#[cfg(target_arch = "wasm32")]
pub use web_time::{Duration, Instant};

/// Default quiet period before a debounced action fires.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct Debouncer<K> {
    window: Duration,
    deadlines: HashMap<K, Instant>,
}

impl<K: Eq + Hash + Clone> Debouncer<K> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadlines: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// (Re)arm `key` to fire one window after `now`.
    pub fn touch(&mut self, key: K, now: Instant) {
        self.deadlines.insert(key, now + self.window);
    }

    /// Forget `key`. Returns whether it was pending.
    pub fn cancel(&mut self, key: &K) -> bool {
        self.deadlines.remove(key).is_some()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.deadlines.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    /// Remove and return every key whose deadline has passed, oldest first.
    pub fn drain_due(&mut self, now: Instant) -> Vec<K> {
        let mut due: Vec<(K, Instant)> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(k, d)| (k.clone(), *d))
            .collect();
        due.sort_by_key(|(_, d)| *d);
        for (key, _) in &due {
            self.deadlines.remove(key);
        }
        due.into_iter().map(|(k, _)| k).collect()
    }

    /// Remove and return every pending key regardless of deadline.
    pub fn flush_all(&mut self) -> Vec<K> {
        let mut all: Vec<(K, Instant)> = self.deadlines.drain().collect();
        all.sort_by_key(|(_, d)| *d);
        all.into_iter().map(|(k, _)| k).collect()
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
    }
}
