//! Bounded undo/redo history over whole-scene snapshots.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::canvas::CanvasSnapshot;

/// Default number of snapshots kept.
pub const DEFAULT_MAX_HISTORY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of snapshots kept, the current one included.
    pub max_depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_HISTORY,
        }
    }
}

/// Snapshot stack with a cursor.
///
/// `entries[current]` is the state the scene is in. Everything after it is the
/// redo tail, everything before it can be undone to. `current` is `None` only
/// before the first snapshot was taken.
#[derive(Debug, Clone)]
pub struct History<S = CanvasSnapshot> {
    entries: VecDeque<S>,
    current: Option<usize>,
    max_depth: usize,
}

impl<S: Clone> Default for History<S> {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl<S: Clone> History<S> {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            entries: VecDeque::new(),
            current: None,
            max_depth: config.max_depth.max(1),
        }
    }

    /// Drop all history and start from `scene`.
    pub fn initialize(&mut self, scene: S) {
        self.entries.clear();
        self.entries.push_back(scene);
        self.current = Some(0);
    }

    /// Record `scene` as the newest state. Any redo tail is discarded.
    pub fn save_state(&mut self, scene: S) {
        let keep = self.current.map_or(0, |c| c + 1);
        self.entries.truncate(keep);
        self.entries.push_back(scene);
        while self.entries.len() > self.max_depth {
            self.entries.pop_front();
        }
        self.current = Some(self.entries.len() - 1);
    }

    /// Step back one snapshot and return it, or `None` at the oldest entry.
    pub fn undo(&mut self) -> Option<S> {
        let current = self.current?;
        if current == 0 {
            return None;
        }
        self.current = Some(current - 1);
        self.entries.get(current - 1).cloned()
    }

    /// Step forward one snapshot and return it, or `None` at the newest entry.
    pub fn redo(&mut self) -> Option<S> {
        let next = self.current? + 1;
        let snapshot = self.entries.get(next).cloned()?;
        self.current = Some(next);
        Some(snapshot)
    }

    pub fn can_undo(&self) -> bool {
        self.current.is_some_and(|c| c > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.current.is_some_and(|c| c + 1 < self.entries.len())
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite every stored snapshot in place, e.g. to carry in changes
    /// that arrived from storage. The cursor does not move.
    pub fn rebase(&mut self, mut f: impl FnMut(&mut S)) {
        self.entries.iter_mut().for_each(|entry| f(entry));
    }

    /// The snapshot the cursor points at.
    pub fn current(&self) -> Option<&S> {
        self.current.and_then(|c| self.entries.get(c))
    }
}
