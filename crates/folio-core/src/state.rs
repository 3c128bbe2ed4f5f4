//! Document state and its store.
//!
//! `DocumentState` is the value that history snapshots and persistence
//! collaborators see. The store owns the one live copy and notifies
//! subscribers on every change, one notification per call.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::listener::{ListenerList, Subscription, invoke_isolated};

/// An image positioned freely over the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatingImage {
    pub id: String,
    pub src: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Everything needed to rebuild the document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentState {
    /// Serialized document markup
    pub content: String,
    pub is_editing: bool,
    /// Floating images, in z-order
    #[serde(default)]
    pub floating_images: Vec<FloatingImage>,
}

impl DocumentState {
    /// Creates an editable state with the given content.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_editing: true,
            floating_images: Vec::new(),
        }
    }
}

/// Shallow patch for [`DocumentStateStore::partial_update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub content: Option<String>,
    pub is_editing: Option<bool>,
    pub floating_images: Option<Vec<FloatingImage>>,
}

impl StatePatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    fn apply(self, state: &mut DocumentState) {
        if let Some(content) = self.content {
            state.content = content;
        }
        if let Some(is_editing) = self.is_editing {
            state.is_editing = is_editing;
        }
        if let Some(images) = self.floating_images {
            state.floating_images = images;
        }
    }
}

type StateListener = dyn Fn(&DocumentState, &DocumentState) -> anyhow::Result<()>;

/// Holds the current [`DocumentState`].
pub struct DocumentStateStore {
    state: DocumentState,
    listeners: ListenerList<StateListener>,
}

impl DocumentStateStore {
    pub fn new(initial: DocumentState) -> Self {
        Self {
            state: initial,
            listeners: ListenerList::new(),
        }
    }

    /// Returns a copy of the current state.
    pub fn get_state(&self) -> DocumentState {
        self.state.clone()
    }

    /// Borrows the current state without copying.
    pub fn state(&self) -> &DocumentState {
        &self.state
    }

    /// Replaces the whole state.
    pub fn set_state(&mut self, state: DocumentState) {
        let old = std::mem::replace(&mut self.state, state);
        self.notify(&old);
    }

    /// Merges `patch` into the current state.
    pub fn partial_update(&mut self, patch: StatePatch) {
        let old = self.state.clone();
        patch.apply(&mut self.state);
        self.notify(&old);
    }

    /// Registers a listener called with `(new, old)` after every change.
    pub fn subscribe(
        &self,
        listener: impl Fn(&DocumentState, &DocumentState) -> anyhow::Result<()> + 'static,
    ) -> Subscription {
        self.listeners.add(Rc::new(listener))
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }

    fn notify(&self, old: &DocumentState) {
        for (id, listener) in self.listeners.snapshot() {
            if !self.listeners.contains(id) {
                continue;
            }
            invoke_isolated("state", || listener(&self.state, old));
        }
    }
}

impl Default for DocumentStateStore {
    fn default() -> Self {
        Self::new(DocumentState::default())
    }
}
