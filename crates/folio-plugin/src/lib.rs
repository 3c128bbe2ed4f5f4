//! # Folio Plugin System
//!
//! Plugins extend the engine with commands and event listeners, and take
//! part in a small lifecycle managed by [`PluginHost`]:
//!
//! ```text
//! (absent) ──register──► Registered ──activate──► Active
//!    ▲                      │  ▲                     │
//!    └──────unregister──────┘  └─────deactivate──────┘
//! ```
//!
//! `unregister` on an active plugin deactivates it first.
//!
//! ## Learning: Trait Objects for Plugins
//!
//! By defining a trait, we can:
//! - Hold different plugin implementations uniformly (`Box<dyn Plugin>`)
//! - Give optional hooks default bodies, so simple plugins stay small
//! - Keep the engine unaware of any concrete plugin type
//!
//! ## Extensions
//!
//! What a plugin adds is declared as a closed enum, [`Extension`], and
//! validated before `install` runs. Everything registered on a plugin's
//! behalf, declared or added from a hook through [`PluginApi`], is
//! tracked and removed again when the plugin goes away.

mod api;
mod host;

pub use api::PluginApi;
pub use host::{PluginHost, PluginInstance, PluginState};

use folio_core::{Command, Document, Handler};
use serde_json::Value;

/// Bus event emitted with the plugin name after registration.
pub const PLUGIN_LOAD: &str = "plugin-load";
/// Bus event emitted with the plugin name after unregistration.
pub const PLUGIN_UNLOAD: &str = "plugin-unload";
/// Bus event emitted with the plugin name after activation.
pub const PLUGIN_ACTIVATE: &str = "plugin-activate";
/// Bus event emitted with the plugin name after deactivation.
pub const PLUGIN_DEACTIVATE: &str = "plugin-deactivate";

/// Result type for plugin operations
pub type PluginResult<T> = Result<T, PluginError>;

/// Plugin system errors.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Plugin already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Plugin '{plugin}' requires plugin '{dependency}'")]
    MissingDependency { plugin: String, dependency: String },

    #[error("Plugin '{plugin}' is {state}, expected {expected}")]
    InvalidState {
        plugin: String,
        state: PluginState,
        expected: PluginState,
    },

    #[error("Plugin not active: {0}")]
    NotActive(String),

    #[error("Plugin '{plugin}' declares command '{command}' which already exists")]
    DuplicateCommand { plugin: String, command: String },

    #[error("Plugin '{plugin}' has an invalid extension: {reason}")]
    InvalidExtension { plugin: String, reason: String },

    #[error("Plugin '{plugin}' failed in {hook}: {source}")]
    Hook {
        plugin: String,
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Something a plugin adds to the engine.
pub enum Extension {
    /// A command registered under its own name
    Command(Command<Document>),
    /// A bus listener for one event
    EventListener { event: String, handler: Handler },
}

impl Extension {
    /// Declares a command extension.
    pub fn command(command: Command<Document>) -> Self {
        Self::Command(command)
    }

    /// Declares an event listener extension.
    pub fn listener(event: impl Into<String>, handler: Handler) -> Self {
        Self::EventListener {
            event: event.into(),
            handler,
        }
    }
}

impl std::fmt::Debug for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Command(command) => f.debug_tuple("Command").field(&command.name()).finish(),
            Self::EventListener { event, .. } => f
                .debug_struct("EventListener")
                .field("event", event)
                .finish(),
        }
    }
}

/// A plugin.
///
/// Only `name`, `version` and `install` are required. Hooks are
/// synchronous: a hook that needs I/O finishes it before returning, so
/// the host never starts a transition while another is in flight.
pub trait Plugin {
    /// Unique name.
    fn name(&self) -> &str;

    /// Version string.
    fn version(&self) -> &str;

    /// Plugins that must be registered first.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Plugins this one works with; a missing one only logs a warning.
    fn peer_dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Called once on registration, with the plugin's config.
    fn install(&mut self, api: &mut PluginApi<'_>, config: &Value) -> anyhow::Result<()>;

    /// Called once on unregistration. Errors are logged, never returned.
    fn uninstall(&mut self, _api: &mut PluginApi<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn activate(&mut self, _api: &mut PluginApi<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn deactivate(&mut self, _api: &mut PluginApi<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Commands and listeners registered along with the plugin.
    fn extends(&self) -> Vec<Extension> {
        Vec::new()
    }
}
