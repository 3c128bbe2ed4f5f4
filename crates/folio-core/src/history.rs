//! Bounded undo/redo history of document snapshots.
//!
//! ## Learning: Snapshots vs Inverse Edits
//!
//! Instead of storing edits and their inverses, the history keeps whole
//! values. Undo and redo just move a pointer, and every entry is an owned
//! copy, so mutating the live state can never corrupt history.
//!
//! ```text
//! entries:  [s0] [s1] [s2] [s3]
//!                      ^ pointer      undo -> s1, redo -> s3
//! ```

use std::collections::VecDeque;

/// Default number of entries kept behind the pointer.
pub const DEFAULT_MAX_PAST: usize = 50;

/// A linear history with a movable pointer.
#[derive(Debug, Clone)]
pub struct HistoryStack<T> {
    entries: VecDeque<T>,
    pointer: usize,
    max_past: usize,
}

impl<T: Clone> HistoryStack<T> {
    /// Creates a history whose only entry is `initial`.
    ///
    /// `max_past` is clamped to at least 1.
    pub fn new(initial: T, max_past: usize) -> Self {
        let mut entries = VecDeque::new();
        entries.push_back(initial);
        Self {
            entries,
            pointer: 0,
            max_past: max_past.max(1),
        }
    }

    /// Records a new current snapshot.
    ///
    /// Redo entries are discarded first; afterwards the oldest entries are
    /// dropped until at most `max_past` remain behind the pointer.
    pub fn push(&mut self, snapshot: T) {
        self.entries.truncate(self.pointer + 1);
        self.entries.push_back(snapshot);
        self.pointer = self.entries.len() - 1;
        self.trim();
        tracing::debug!(entries = self.entries.len(), "History push");
    }

    fn trim(&mut self) {
        while self.pointer > self.max_past {
            self.entries.pop_front();
            self.pointer -= 1;
        }
    }

    /// Steps back, returning the new current snapshot.
    pub fn undo(&mut self) -> Option<&T> {
        if self.pointer == 0 {
            return None;
        }
        self.pointer -= 1;
        self.entries.get(self.pointer)
    }

    /// Steps forward, returning the new current snapshot.
    pub fn redo(&mut self) -> Option<&T> {
        if self.pointer + 1 >= self.entries.len() {
            return None;
        }
        self.pointer += 1;
        self.entries.get(self.pointer)
    }

    pub fn can_undo(&self) -> bool {
        self.pointer > 0
    }

    pub fn can_redo(&self) -> bool {
        self.pointer + 1 < self.entries.len()
    }

    /// The snapshot at the pointer.
    pub fn current(&self) -> &T {
        // The pointer is always kept inside the deque.
        &self.entries[self.pointer]
    }

    /// Number of entries retained behind the pointer at most.
    pub fn max_past(&self) -> usize {
        self.max_past
    }

    /// Changes the bound, dropping the oldest entries if it shrank.
    pub fn set_max_past(&mut self, max_past: usize) {
        self.max_past = max_past.max(1);
        self.trim();
    }

    /// Total entries, including the current one and redo entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: the current entry exists from construction on.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops all entries except the current one.
    pub fn reset(&mut self, current: T) {
        self.entries.clear();
        self.entries.push_back(current);
        self.pointer = 0;
    }
}
