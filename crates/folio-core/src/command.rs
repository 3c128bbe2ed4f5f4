//! Command system for document operations.
//!
//! ## Learning: The Command Pattern
//!
//! Commands encapsulate actions as named values:
//! - UI affordances query them (`has`, `query_state`, `query_value`)
//!   without knowing what they do
//! - Plugins add new ones at runtime
//! - The engine wraps every execution with snapshotting and history
//!
//! ## Generic Targets
//!
//! `CommandRegistry<T>` is generic over the value commands operate on. The
//! engine uses `CommandRegistry<Document>`; tests can use anything.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::{CoreError, CoreResult};

type ExecuteFn<T> = Box<dyn Fn(&mut T, &[Value]) -> anyhow::Result<()>>;
type QueryStateFn<T> = Box<dyn Fn(&T) -> bool>;
type QueryValueFn<T> = Box<dyn Fn(&T) -> String>;

/// A named operation over a target of type `T`.
pub struct Command<T> {
    name: String,
    execute: ExecuteFn<T>,
    query_state: Option<QueryStateFn<T>>,
    query_value: Option<QueryValueFn<T>>,
}

impl<T> Command<T> {
    /// Creates a command from its execute function.
    pub fn new(
        name: impl Into<String>,
        execute: impl Fn(&mut T, &[Value]) -> anyhow::Result<()> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            execute: Box::new(execute),
            query_state: None,
            query_value: None,
        }
    }

    /// Adds a boolean state query (e.g. "is bold active").
    pub fn with_query_state(mut self, query: impl Fn(&T) -> bool + 'static) -> Self {
        self.query_state = Some(Box::new(query));
        self
    }

    /// Adds a value query (e.g. "current font name").
    pub fn with_query_value(mut self, query: impl Fn(&T) -> String + 'static) -> Self {
        self.query_value = Some(Box::new(query));
        self
    }

    /// Returns the command's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> fmt::Debug for Command<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("query_state", &self.query_state.is_some())
            .field("query_value", &self.query_value.is_some())
            .finish()
    }
}

/// Registry of commands keyed by unique name.
pub struct CommandRegistry<T> {
    commands: HashMap<String, Command<T>>,
}

impl<T> CommandRegistry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// Registers a command; names are unique within the registry.
    pub fn register(&mut self, command: Command<T>) -> CoreResult<()> {
        if self.commands.contains_key(command.name()) {
            return Err(CoreError::DuplicateCommand(command.name));
        }
        tracing::debug!(command = command.name(), "Registered command");
        self.commands.insert(command.name.clone(), command);
        Ok(())
    }

    /// Removes a command, returning it if it existed.
    pub fn unregister(&mut self, name: &str) -> Option<Command<T>> {
        self.commands.remove(name)
    }

    /// Returns true if a command with this name exists.
    pub fn has(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Runs a command against `target`.
    ///
    /// Unknown names are a no-op and return `Ok(false)`; UI callers are
    /// expected to check [`has`](Self::has) first.
    pub fn execute(&self, name: &str, target: &mut T, args: &[Value]) -> CoreResult<bool> {
        let Some(command) = self.commands.get(name) else {
            tracing::warn!(command = name, "Ignoring unknown command");
            return Ok(false);
        };
        (command.execute)(target, args).map_err(|source| CoreError::CommandFailed {
            name: name.to_string(),
            source,
        })?;
        tracing::debug!(command = name, "Executed command");
        Ok(true)
    }

    /// Evaluates a command's state query; `false` if unknown or absent.
    pub fn query_state(&self, name: &str, target: &T) -> bool {
        self.commands
            .get(name)
            .and_then(|c| c.query_state.as_ref())
            .is_some_and(|query| query(target))
    }

    /// Evaluates a command's value query; empty if unknown or absent.
    pub fn query_value(&self, name: &str, target: &T) -> String {
        self.commands
            .get(name)
            .and_then(|c| c.query_value.as_ref())
            .map(|query| query(target))
            .unwrap_or_default()
    }

    /// Returns all registered names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if no command is registered.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl<T> Default for CommandRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn counter_registry() -> CommandRegistry<i64> {
        let mut registry = CommandRegistry::new();
        registry
            .register(
                Command::new("add", |n: &mut i64, args: &[Value]| {
                    *n += args.first().and_then(Value::as_i64).unwrap_or(1);
                    Ok(())
                })
                .with_query_state(|n: &i64| *n > 0)
                .with_query_value(|n: &i64| n.to_string()),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_execute_with_args() {
        let registry = counter_registry();
        let mut value = 0;
        assert!(registry.execute("add", &mut value, &[json!(5)]).unwrap());
        assert!(registry.execute("add", &mut value, &[]).unwrap());
        assert_eq!(value, 6);
        assert!(registry.query_state("add", &value));
        assert_eq!(registry.query_value("add", &value), "6");
    }

    #[test]
    fn test_unknown_command_defaults() {
        let registry = counter_registry();
        let mut value = 0;
        assert!(!registry.execute("missing", &mut value, &[]).unwrap());
        assert_eq!(value, 0);
        assert!(!registry.query_state("missing", &value));
        assert_eq!(registry.query_value("missing", &value), "");
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut registry = counter_registry();
        let result = registry.register(Command::new("add", |_: &mut i64, _: &[Value]| Ok(())));
        assert!(matches!(result, Err(CoreError::DuplicateCommand(name)) if name == "add"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failing_command_reports_name() {
        let mut registry = CommandRegistry::new();
        registry
            .register(Command::new("fail", |_: &mut (), _: &[Value]| {
                anyhow::bail!("nope")
            }))
            .unwrap();
        let err = registry.execute("fail", &mut (), &[]).unwrap_err();
        assert!(matches!(err, CoreError::CommandFailed { ref name, .. } if name == "fail"));
    }

    #[test]
    fn test_unregister() {
        let mut registry = counter_registry();
        assert!(registry.unregister("add").is_some());
        assert!(!registry.has("add"));
        assert!(registry.list().is_empty());
    }
}
