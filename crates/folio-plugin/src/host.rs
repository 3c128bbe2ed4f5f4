//! Plugin lifecycle management.

use std::collections::{HashMap, HashSet};
use std::fmt;

use folio_core::{CoreResult, EngineEvent, Engine};
use serde_json::{Value, json};

use crate::api::{PluginApi, Registrations};
use crate::{
    Extension, PLUGIN_ACTIVATE, PLUGIN_DEACTIVATE, PLUGIN_LOAD, PLUGIN_UNLOAD, Plugin, PluginError,
    PluginResult,
};

/// Lifecycle state of a registered plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginState {
    /// Installed, extensions registered, not active
    Registered,
    /// Activated
    Active,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registered => write!(f, "registered"),
            Self::Active => write!(f, "active"),
        }
    }
}

/// A registered plugin with its config and state.
pub struct PluginInstance {
    plugin: Box<dyn Plugin>,
    config: Value,
    state: PluginState,
    registrations: Registrations,
}

impl PluginInstance {
    pub fn plugin(&self) -> &dyn Plugin {
        self.plugin.as_ref()
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    /// Names of the commands registered on the plugin's behalf.
    pub fn commands(&self) -> &[String] {
        &self.registrations.commands
    }

    /// Number of bus listeners registered on the plugin's behalf.
    pub fn listener_count(&self) -> usize {
        self.registrations.listeners.len()
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("name", &self.plugin.name())
            .field("version", &self.plugin.version())
            .field("state", &self.state)
            .field("commands", &self.registrations.commands)
            .finish()
    }
}

/// Owns the engine and the plugins extending it.
pub struct PluginHost {
    /// The engine plugins extend
    engine: Engine,

    /// Registered plugins by name
    plugins: HashMap<String, PluginInstance>,

    /// Registration order
    order: Vec<String>,
}

impl PluginHost {
    /// Creates a host around an engine.
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            plugins: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Runs a command, including plugin-provided ones.
    pub fn execute(&mut self, name: &str, args: &[Value]) -> CoreResult<bool> {
        self.engine.execute(name, args)
    }

    // ==================== Lifecycle ====================

    /// Registers and installs a plugin.
    ///
    /// Fails without calling `install` if the name is taken, a required
    /// dependency is missing or an extension is invalid. If `install`
    /// fails, everything it registered is removed again.
    pub fn register(
        &mut self,
        mut plugin: Box<dyn Plugin>,
        config: Option<Value>,
    ) -> PluginResult<()> {
        let name = plugin.name().to_string();
        if name.is_empty() {
            return Err(PluginError::InvalidExtension {
                plugin: name,
                reason: "plugin name is empty".to_string(),
            });
        }
        if self.plugins.contains_key(&name) {
            return Err(PluginError::AlreadyRegistered(name));
        }
        for dependency in plugin.dependencies() {
            if !self.plugins.contains_key(&dependency) {
                return Err(PluginError::MissingDependency {
                    plugin: name,
                    dependency,
                });
            }
        }
        for peer in plugin.peer_dependencies() {
            if !self.plugins.contains_key(&peer) {
                tracing::warn!(plugin = %name, peer = %peer, "Peer dependency not registered");
            }
        }
        let extensions = plugin.extends();
        self.validate_extensions(&name, &extensions)?;

        let config = config.unwrap_or(Value::Null);
        let mut registrations = Registrations::default();
        let installed = {
            let mut api = PluginApi::new(&name, &mut self.engine, &mut registrations);
            plugin
                .install(&mut api, &config)
                .map_err(|source| PluginError::Hook {
                    plugin: name.clone(),
                    hook: "install",
                    source,
                })
                .and_then(|()| Self::register_extensions(&mut api, extensions))
        };
        if let Err(err) = installed {
            registrations.release(&mut self.engine);
            tracing::warn!(plugin = %name, error = %err, "Plugin registration rolled back");
            return Err(err);
        }

        tracing::info!(plugin = %name, version = plugin.version(), "Registered plugin");
        self.plugins.insert(
            name.clone(),
            PluginInstance {
                plugin,
                config,
                state: PluginState::Registered,
                registrations,
            },
        );
        self.order.push(name.clone());
        self.announce(PLUGIN_LOAD, EngineEvent::PluginLoaded(name.clone()), &name);
        Ok(())
    }

    fn validate_extensions(&self, plugin: &str, extensions: &[Extension]) -> PluginResult<()> {
        let invalid = |reason: String| PluginError::InvalidExtension {
            plugin: plugin.to_string(),
            reason,
        };
        let mut declared = HashSet::new();
        for extension in extensions {
            match extension {
                Extension::Command(command) => {
                    let command = command.name();
                    if command.is_empty() {
                        return Err(invalid("command name is empty".to_string()));
                    }
                    if !declared.insert(command) {
                        return Err(invalid(format!("command '{command}' declared twice")));
                    }
                    if self.engine.has_command(command) {
                        return Err(PluginError::DuplicateCommand {
                            plugin: plugin.to_string(),
                            command: command.to_string(),
                        });
                    }
                }
                Extension::EventListener { event, .. } => {
                    if event.is_empty() {
                        return Err(invalid("listener event is empty".to_string()));
                    }
                }
            }
        }
        Ok(())
    }

    fn register_extensions(
        api: &mut PluginApi<'_>,
        extensions: Vec<Extension>,
    ) -> PluginResult<()> {
        for extension in extensions {
            match extension {
                Extension::Command(command) => api.register_command(command)?,
                Extension::EventListener { event, handler } => api.on(&event, handler),
            }
        }
        Ok(())
    }

    /// Uninstalls a plugin and removes its extensions.
    ///
    /// An active plugin is deactivated first; a failing `deactivate`
    /// aborts the call and leaves the plugin registered.
    pub fn unregister(&mut self, name: &str) -> PluginResult<()> {
        let state = self.plugin_state(name).ok_or_else(|| PluginError::NotFound(name.to_string()))?;
        if state == PluginState::Active {
            self.deactivate(name)?;
        }
        let Some(mut instance) = self.plugins.remove(name) else {
            return Err(PluginError::NotFound(name.to_string()));
        };

        {
            let mut api = PluginApi::new(name, &mut self.engine, &mut instance.registrations);
            if let Err(err) = instance.plugin.uninstall(&mut api) {
                tracing::error!(plugin = name, error = %err, "Plugin uninstall failed");
            }
        }
        instance.registrations.release(&mut self.engine);
        self.order.retain(|entry| entry != name);

        tracing::info!(plugin = name, "Unregistered plugin");
        self.announce(PLUGIN_UNLOAD, EngineEvent::PluginUnloaded(name.to_string()), name);
        Ok(())
    }

    /// Activates a registered plugin.
    pub fn activate(&mut self, name: &str) -> PluginResult<()> {
        let instance = self
            .plugins
            .get_mut(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
        if instance.state != PluginState::Registered {
            return Err(PluginError::InvalidState {
                plugin: name.to_string(),
                state: instance.state,
                expected: PluginState::Registered,
            });
        }

        let mut api = PluginApi::new(name, &mut self.engine, &mut instance.registrations);
        instance
            .plugin
            .activate(&mut api)
            .map_err(|source| PluginError::Hook {
                plugin: name.to_string(),
                hook: "activate",
                source,
            })?;
        instance.state = PluginState::Active;

        tracing::info!(plugin = name, "Activated plugin");
        self.announce(PLUGIN_ACTIVATE, EngineEvent::PluginActivated(name.to_string()), name);
        Ok(())
    }

    /// Deactivates an active plugin.
    pub fn deactivate(&mut self, name: &str) -> PluginResult<()> {
        let instance = self
            .plugins
            .get_mut(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
        if instance.state != PluginState::Active {
            return Err(PluginError::NotActive(name.to_string()));
        }

        let mut api = PluginApi::new(name, &mut self.engine, &mut instance.registrations);
        instance
            .plugin
            .deactivate(&mut api)
            .map_err(|source| PluginError::Hook {
                plugin: name.to_string(),
                hook: "deactivate",
                source,
            })?;
        instance.state = PluginState::Registered;

        tracing::info!(plugin = name, "Deactivated plugin");
        self.announce(
            PLUGIN_DEACTIVATE,
            EngineEvent::PluginDeactivated(name.to_string()),
            name,
        );
        Ok(())
    }

    fn announce(&self, event: &str, typed: EngineEvent, name: &str) {
        self.engine.bus().emit(event, &[json!(name)]);
        self.engine.events().emit(typed);
    }

    // ==================== Queries ====================

    pub fn get_plugin(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins.get(name).map(PluginInstance::plugin)
    }

    /// All plugins in registration order.
    pub fn all_plugins(&self) -> Vec<&dyn Plugin> {
        self.order
            .iter()
            .filter_map(|name| self.get_plugin(name))
            .collect()
    }

    /// Plugin names in registration order.
    pub fn plugin_names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn is_plugin_active(&self, name: &str) -> bool {
        self.plugin_state(name) == Some(PluginState::Active)
    }

    pub fn plugin_state(&self, name: &str) -> Option<PluginState> {
        self.plugins.get(name).map(PluginInstance::state)
    }

    pub fn plugin_instance(&self, name: &str) -> Option<&PluginInstance> {
        self.plugins.get(name)
    }
}

impl Default for PluginHost {
    fn default() -> Self {
        Self::new(Engine::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::{Command, Document, Handler};
    use std::cell::RefCell;
    use std::rc::Rc;

    type CallLog = Rc<RefCell<Vec<String>>>;

    /// Records every hook call; hooks can be told to fail.
    struct MockPlugin {
        name: String,
        dependencies: Vec<String>,
        peers: Vec<String>,
        log: CallLog,
        fail_install: bool,
        fail_activate: bool,
        fail_uninstall: bool,
        extensions: RefCell<Vec<Extension>>,
    }

    impl MockPlugin {
        fn new(name: &str, log: &CallLog) -> Self {
            Self {
                name: name.to_string(),
                dependencies: Vec::new(),
                peers: Vec::new(),
                log: Rc::clone(log),
                fail_install: false,
                fail_activate: false,
                fail_uninstall: false,
                extensions: RefCell::new(Vec::new()),
            }
        }

        fn record(&self, hook: &str) {
            self.log.borrow_mut().push(format!("{}:{hook}", self.name));
        }
    }

    impl Plugin for MockPlugin {
        fn name(&self) -> &str {
            &self.name
        }

        fn version(&self) -> &str {
            "1.0.0"
        }

        fn dependencies(&self) -> Vec<String> {
            self.dependencies.clone()
        }

        fn peer_dependencies(&self) -> Vec<String> {
            self.peers.clone()
        }

        fn install(&mut self, api: &mut PluginApi<'_>, config: &Value) -> anyhow::Result<()> {
            self.record("install");
            if let Some(command) = config.get("command").and_then(Value::as_str) {
                api.register_command(Command::new(command, |_: &mut Document, _: &[Value]| {
                    Ok(())
                }))?;
            }
            if self.fail_install {
                anyhow::bail!("install failed");
            }
            Ok(())
        }

        fn uninstall(&mut self, _api: &mut PluginApi<'_>) -> anyhow::Result<()> {
            self.record("uninstall");
            if self.fail_uninstall {
                anyhow::bail!("uninstall failed");
            }
            Ok(())
        }

        fn activate(&mut self, _api: &mut PluginApi<'_>) -> anyhow::Result<()> {
            self.record("activate");
            if self.fail_activate {
                anyhow::bail!("activate failed");
            }
            Ok(())
        }

        fn deactivate(&mut self, _api: &mut PluginApi<'_>) -> anyhow::Result<()> {
            self.record("deactivate");
            Ok(())
        }

        fn extends(&self) -> Vec<Extension> {
            self.extensions.take()
        }
    }

    fn log() -> CallLog {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn test_missing_dependency_skips_install() {
        let calls = log();
        let mut plugin = MockPlugin::new("child", &calls);
        plugin.dependencies = vec!["missing".to_string()];

        let mut host = PluginHost::default();
        let result = host.register(Box::new(plugin), None);

        assert!(matches!(
            result,
            Err(PluginError::MissingDependency { ref dependency, .. }) if dependency == "missing"
        ));
        assert!(calls.borrow().is_empty());
        assert!(!host.has_plugin("child"));
    }

    #[test]
    fn test_missing_peer_only_warns() {
        let calls = log();
        let mut plugin = MockPlugin::new("p", &calls);
        plugin.peers = vec!["other".to_string()];

        let mut host = PluginHost::default();
        host.register(Box::new(plugin), None).unwrap();
        assert_eq!(host.plugin_state("p"), Some(PluginState::Registered));
    }

    #[test]
    fn test_activate_twice_and_deactivate_inactive() {
        let calls = log();
        let mut host = PluginHost::default();
        host.register(Box::new(MockPlugin::new("p", &calls)), None)
            .unwrap();

        assert!(matches!(host.deactivate("p"), Err(PluginError::NotActive(_))));

        host.activate("p").unwrap();
        assert!(host.is_plugin_active("p"));
        assert!(matches!(
            host.activate("p"),
            Err(PluginError::InvalidState {
                state: PluginState::Active,
                expected: PluginState::Registered,
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_plugin_not_found() {
        let mut host = PluginHost::default();
        assert!(matches!(host.activate("x"), Err(PluginError::NotFound(_))));
        assert!(matches!(host.deactivate("x"), Err(PluginError::NotFound(_))));
        assert!(matches!(host.unregister("x"), Err(PluginError::NotFound(_))));
    }

    #[test]
    fn test_duplicate_registration() {
        let calls = log();
        let mut host = PluginHost::default();
        host.register(Box::new(MockPlugin::new("p", &calls)), None)
            .unwrap();
        assert!(matches!(
            host.register(Box::new(MockPlugin::new("p", &calls)), None),
            Err(PluginError::AlreadyRegistered(_))
        ));
        assert_eq!(*calls.borrow(), vec!["p:install"]);
    }

    #[test]
    fn test_failed_install_rolls_back() {
        let calls = log();
        let mut plugin = MockPlugin::new("p", &calls);
        plugin.fail_install = true;

        let mut host = PluginHost::default();
        let result = host.register(Box::new(plugin), Some(json!({ "command": "fromInstall" })));

        assert!(matches!(result, Err(PluginError::Hook { hook: "install", .. })));
        assert!(!host.has_plugin("p"));
        assert!(!host.engine().has_command("fromInstall"));
    }

    #[test]
    fn test_failed_activate_keeps_registered() {
        let calls = log();
        let mut plugin = MockPlugin::new("p", &calls);
        plugin.fail_activate = true;

        let mut host = PluginHost::default();
        host.register(Box::new(plugin), None).unwrap();
        assert!(host.activate("p").is_err());
        assert_eq!(host.plugin_state("p"), Some(PluginState::Registered));
    }

    #[test]
    fn test_unregister_active_deactivates_and_cleans_up() {
        let calls = log();
        let plugin = MockPlugin::new("p", &calls);
        let fired = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&fired);
        plugin.extensions.replace(vec![
            Extension::command(Command::new("shout", |doc: &mut Document, _: &[Value]| {
                doc.insert_text("!")?;
                Ok(())
            })),
            Extension::listener(
                "ping",
                Handler::new(move |_| {
                    *counter.borrow_mut() += 1;
                    Ok(())
                }),
            ),
        ]);

        let mut host = PluginHost::default();
        host.register(Box::new(plugin), Some(json!({ "command": "fromInstall" })))
            .unwrap();
        host.activate("p").unwrap();

        let instance = host.plugin_instance("p").unwrap();
        assert_eq!(instance.commands(), ["fromInstall", "shout"]);
        assert_eq!(instance.listener_count(), 1);
        assert!(host.execute("shout", &[]).unwrap());
        host.engine().bus().emit("ping", &[]);
        assert_eq!(*fired.borrow(), 1);

        host.unregister("p").unwrap();
        assert_eq!(*calls.borrow(), vec!["p:install", "p:activate", "p:deactivate", "p:uninstall"]);
        assert!(!host.engine().has_command("shout"));
        assert!(!host.engine().has_command("fromInstall"));
        host.engine().bus().emit("ping", &[]);
        assert_eq!(*fired.borrow(), 1);
    }

    #[test]
    fn test_uninstall_errors_are_swallowed() {
        let calls = log();
        let mut plugin = MockPlugin::new("p", &calls);
        plugin.fail_uninstall = true;

        let mut host = PluginHost::default();
        host.register(Box::new(plugin), None).unwrap();
        host.unregister("p").unwrap();
        assert!(!host.has_plugin("p"));
    }

    #[test]
    fn test_extension_conflicts_rejected_before_install() {
        let calls = log();
        let plugin = MockPlugin::new("p", &calls);
        plugin.extensions.replace(vec![Extension::command(Command::new(
            "insertText",
            |_: &mut Document, _: &[Value]| Ok(()),
        ))]);

        let mut host = PluginHost::default();
        assert!(matches!(
            host.register(Box::new(plugin), None),
            Err(PluginError::DuplicateCommand { ref command, .. }) if command == "insertText"
        ));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_registration_order_and_events() {
        let calls = log();
        let mut host = PluginHost::default();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for event in [PLUGIN_LOAD, PLUGIN_ACTIVATE, PLUGIN_UNLOAD] {
            let sink = Rc::clone(&seen);
            host.engine().bus().on(
                event,
                Handler::new(move |args| {
                    let name = args.first().and_then(Value::as_str).unwrap_or_default();
                    sink.borrow_mut().push(format!("{event}:{name}"));
                    Ok(())
                }),
            );
        }
        let mut receiver = host.engine().subscribe();

        host.register(Box::new(MockPlugin::new("b", &calls)), None)
            .unwrap();
        let mut dependent = MockPlugin::new("a", &calls);
        dependent.dependencies = vec!["b".to_string()];
        host.register(Box::new(dependent), None).unwrap();
        host.activate("a").unwrap();
        host.unregister("b").unwrap();

        assert_eq!(host.plugin_names(), vec!["a"]);
        assert_eq!(
            *seen.borrow(),
            vec!["plugin-load:b", "plugin-load:a", "plugin-activate:a", "plugin-unload:b"]
        );
        assert_eq!(
            receiver.try_recv().unwrap(),
            EngineEvent::PluginLoaded("b".to_string())
        );
        let names: Vec<&str> = host.all_plugins().into_iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["a"]);
    }
}
