//! # Folio Core
//!
//! Editing engine: commands, state, history, events and configuration.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         Engine                            │
//! │  ┌─────────────────┐ ┌──────────────┐ ┌───────────────┐  │
//! │  │ CommandRegistry │ │ ConfigManager│ │ EventBus /    │  │
//! │  │   <Document>    │ │              │ │ EventStream   │  │
//! │  └────────┬────────┘ └──────────────┘ └───────────────┘  │
//! │           │ execute                                      │
//! │  ┌────────┴────────┐ snapshot ┌───────────────────────┐  │
//! │  │    Document     │ ───────► │ DocumentStateStore    │  │
//! │  │ tree+selection  │ ◄─────── │ HistoryStack          │  │
//! │  └─────────────────┘ restore  └───────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Learning: Module Organization
//!
//! Rust modules map to files:
//! - `mod foo;` looks for `foo.rs` or `foo/mod.rs`
//! - `pub use` re-exports items for cleaner public APIs

mod builtins;
pub mod command;
pub mod config;
pub mod document;
pub mod editor;
pub mod event;
pub mod history;
mod listener;
pub mod state;

pub use command::{Command, CommandRegistry};
pub use config::{Config, ConfigError, ConfigManager, ConfigPatch};
pub use document::{Document, EditLimits, TableEdit};
pub use editor::Engine;
pub use event::{BatchEvent, EngineEvent, EventBus, EventHandler, EventStream, Handler};
pub use history::HistoryStack;
pub use listener::Subscription;
pub use state::{DocumentState, DocumentStateStore, FloatingImage, StatePatch};

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Command already registered: {0}")]
    DuplicateCommand(String),

    #[error("Command '{name}' failed: {source}")]
    CommandFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("No table at the selection")]
    NoTable,

    #[error("Floating image not found: {0}")]
    ImageNotFound(String),

    #[error("Image rejected: {0}")]
    ImageRejected(String),

    #[error("Document error: {0}")]
    Document(#[from] folio_document::DocumentError),

    #[error("Table error: {0}")]
    Table(#[from] folio_document::TableError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}
