//! The surface plugins use to reach the engine.

use folio_core::{
    Command, Config, CoreError, CoreResult, Document, DocumentState, Engine, EventBus, Handler,
    Subscription,
};
use serde_json::Value;

use crate::{PluginError, PluginResult};

/// Everything registered on behalf of one plugin.
#[derive(Debug, Default)]
pub(crate) struct Registrations {
    pub(crate) commands: Vec<String>,
    pub(crate) listeners: Vec<Subscription>,
}

impl Registrations {
    /// Removes every tracked command and listener from the engine.
    pub(crate) fn release(&mut self, engine: &mut Engine) {
        for name in self.commands.drain(..) {
            engine.unregister_command(&name);
        }
        for subscription in self.listeners.drain(..) {
            subscription.unsubscribe();
        }
    }
}

/// Handed to plugin hooks.
///
/// Commands and listeners registered here belong to the plugin and are
/// removed when it is unregistered.
pub struct PluginApi<'a> {
    plugin: &'a str,
    engine: &'a mut Engine,
    registrations: &'a mut Registrations,
}

impl<'a> PluginApi<'a> {
    pub(crate) fn new(
        plugin: &'a str,
        engine: &'a mut Engine,
        registrations: &'a mut Registrations,
    ) -> Self {
        Self {
            plugin,
            engine,
            registrations,
        }
    }

    /// Name of the plugin this API belongs to.
    pub fn plugin_name(&self) -> &str {
        self.plugin
    }

    /// Registers a command owned by the plugin.
    pub fn register_command(&mut self, command: Command<Document>) -> PluginResult<()> {
        let name = command.name().to_string();
        self.engine
            .register_command(command)
            .map_err(|err| match err {
                CoreError::DuplicateCommand(command) => PluginError::DuplicateCommand {
                    plugin: self.plugin.to_string(),
                    command,
                },
                other => PluginError::Hook {
                    plugin: self.plugin.to_string(),
                    hook: "register_command",
                    source: other.into(),
                },
            })?;
        self.registrations.commands.push(name);
        Ok(())
    }

    /// Subscribes a bus listener owned by the plugin.
    pub fn on(&mut self, event: &str, handler: Handler) {
        let subscription = self.engine.bus().on(event, handler);
        self.registrations.listeners.push(subscription);
    }

    /// Subscribes a one-shot bus listener owned by the plugin.
    pub fn once(&mut self, event: &str, handler: Handler) {
        let subscription = self.engine.bus().once(event, handler);
        self.registrations.listeners.push(subscription);
    }

    /// Emits a bus event.
    pub fn emit(&self, event: &str, args: &[Value]) {
        self.engine.bus().emit(event, args);
    }

    /// A handle to the bus, e.g. for handlers that emit follow-up events.
    pub fn bus(&self) -> EventBus {
        self.engine.bus().clone()
    }

    /// Runs a command through the engine, with history.
    pub fn execute(&mut self, name: &str, args: &[Value]) -> CoreResult<bool> {
        self.engine.execute(name, args)
    }

    pub fn state(&self) -> DocumentState {
        self.engine.state()
    }

    pub fn config(&self) -> &Config {
        self.engine.config()
    }

    pub fn document(&self) -> &Document {
        self.engine.document()
    }

    /// Number of commands the plugin currently owns.
    pub fn command_count(&self) -> usize {
        self.registrations.commands.len()
    }
}
