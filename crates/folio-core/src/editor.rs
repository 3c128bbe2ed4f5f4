//! Main engine orchestration.
//!
//! ## Learning: The Facade Pattern
//!
//! `Engine` acts as a facade over the document, the command registry, the
//! state store, the history and the event channels. Every successful
//! command goes through the same path:
//!
//! ```text
//! execute ─► command body ─► snapshot ─► history.push ─► store.set_state
//!                                                     └─► "content-change"
//! ```

use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::builtins::register_builtins;
use crate::command::{Command, CommandRegistry};
use crate::config::{Config, ConfigManager, ConfigPatch};
use crate::document::{Document, EditLimits};
use crate::event::{EngineEvent, EventBus, EventStream};
use crate::history::HistoryStack;
use crate::state::{DocumentState, DocumentStateStore};
use crate::CoreResult;

/// Bus event emitted with the new content after a change.
pub const CONTENT_CHANGE: &str = "content-change";
/// Bus event emitted with the command name after it ran.
pub const COMMAND_EXECUTED: &str = "command-executed";
/// Bus event emitted after an undo.
pub const UNDO: &str = "undo";
/// Bus event emitted after a redo.
pub const REDO: &str = "redo";

/// The editing engine for one document.
///
/// ## Thread Safety
///
/// `Engine` is owned by a single thread. The bus and the listeners use
/// `Rc`, so the type is deliberately `!Send`; other threads observe it
/// through [`Engine::subscribe`].
pub struct Engine {
    /// The live document
    document: Document,

    /// Current state, as seen by persistence and subscribers
    store: DocumentStateStore,

    /// Undo/redo snapshots
    history: HistoryStack<DocumentState>,

    /// Commands by name
    commands: CommandRegistry<Document>,

    /// Synchronous, name-keyed notifications
    bus: EventBus,

    /// Typed notifications for async observers
    events: EventStream,

    /// Active configuration
    config: ConfigManager,
}

impl Engine {
    /// Creates an engine over `content` with the default configuration.
    pub fn new(content: &str) -> Self {
        Self::build(content, ConfigManager::default())
    }

    /// Creates an engine with a custom configuration.
    pub fn with_config(content: &str, config: Config) -> CoreResult<Self> {
        Ok(Self::build(content, ConfigManager::new(config)?))
    }

    fn build(content: &str, config: ConfigManager) -> Self {
        let limits = EditLimits::from(config.get());
        let document = Document::from_state(&DocumentState::new(content), limits);
        let initial = document.snapshot();

        let mut commands = CommandRegistry::new();
        if let Err(err) = register_builtins(&mut commands) {
            tracing::error!(error = %err, "Failed to register built-in commands");
        }

        Self {
            document,
            store: DocumentStateStore::new(initial.clone()),
            history: HistoryStack::new(initial, config.get().history.max_size),
            commands,
            bus: EventBus::new(),
            events: EventStream::new(),
            config,
        }
    }

    // ==================== Commands ====================

    /// Runs a command and records the result.
    ///
    /// Returns `Ok(false)` for unknown names. A failing command leaves the
    /// document as it was before the call.
    pub fn execute(&mut self, name: &str, args: &[Value]) -> CoreResult<bool> {
        match self.commands.execute(name, &mut self.document, args) {
            Ok(false) => return Ok(false),
            Ok(true) => {}
            Err(err) => {
                let state = self.store.get_state();
                self.document.restore(&state);
                return Err(err);
            }
        }
        self.commit();
        self.bus.emit(COMMAND_EXECUTED, &[json!(name)]);
        self.events.emit(EngineEvent::CommandExecuted(name.to_string()));
        Ok(true)
    }

    /// Records the document's current state if it differs from the last one.
    ///
    /// Returns true if a new history entry was pushed.
    pub fn commit(&mut self) -> bool {
        let snapshot = self.document.snapshot();
        if &snapshot == self.history.current() {
            return false;
        }
        self.history.push(snapshot.clone());
        self.store.set_state(snapshot);
        self.notify_content_change();
        self.events.emit(EngineEvent::ContentChanged);
        true
    }

    fn notify_content_change(&self) {
        self.bus
            .emit(CONTENT_CHANGE, &[json!(self.store.state().content)]);
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.commands.has(name)
    }

    pub fn query_state(&self, name: &str) -> bool {
        self.commands.query_state(name, &self.document)
    }

    pub fn query_value(&self, name: &str) -> String {
        self.commands.query_value(name, &self.document)
    }

    /// Registered command names, sorted.
    pub fn command_names(&self) -> Vec<String> {
        self.commands.list().into_iter().map(String::from).collect()
    }

    pub fn register_command(&mut self, command: Command<Document>) -> CoreResult<()> {
        self.commands.register(command)
    }

    /// Removes a command; returns true if it existed.
    pub fn unregister_command(&mut self, name: &str) -> bool {
        self.commands.unregister(name).is_some()
    }

    // ==================== History ====================

    /// Steps back one snapshot. Returns false at the oldest entry.
    pub fn undo(&mut self) -> bool {
        let Some(state) = self.history.undo().cloned() else {
            return false;
        };
        self.replace_live_state(state);
        self.bus.emit(UNDO, &[]);
        self.events.emit(EngineEvent::Undo);
        true
    }

    /// Steps forward one snapshot. Returns false at the newest entry.
    pub fn redo(&mut self) -> bool {
        let Some(state) = self.history.redo().cloned() else {
            return false;
        };
        self.replace_live_state(state);
        self.bus.emit(REDO, &[]);
        self.events.emit(EngineEvent::Redo);
        true
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history(&self) -> &HistoryStack<DocumentState> {
        &self.history
    }

    fn replace_live_state(&mut self, state: DocumentState) {
        self.document.restore(&state);
        self.store.set_state(state);
        self.notify_content_change();
    }

    // ==================== State ====================

    /// Returns a copy of the current state.
    pub fn state(&self) -> DocumentState {
        self.store.get_state()
    }

    /// Replaces the document from outside, e.g. after loading from storage.
    pub fn set_state(&mut self, state: DocumentState) {
        self.document.restore(&state);
        self.history.push(state.clone());
        self.store.set_state(state);
        self.notify_content_change();
        self.events.emit(EngineEvent::StateReplaced);
    }

    /// The state store, for subscribing to changes.
    pub fn store(&self) -> &DocumentStateStore {
        &self.store
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Mutable access for selection changes and direct edits.
    ///
    /// Edits made here are recorded by the next [`commit`](Self::commit).
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    // ==================== Configuration ====================

    pub fn config(&self) -> &Config {
        self.config.get()
    }

    /// The config manager, for subscribing to changes.
    pub fn config_manager(&self) -> &ConfigManager {
        &self.config
    }

    /// Validates and applies a config patch atomically.
    pub fn update_config(&mut self, patch: &ConfigPatch) -> CoreResult<()> {
        self.config.update(patch)?;
        self.apply_config();
        Ok(())
    }

    /// Replaces the whole config after validating it.
    pub fn replace_config(&mut self, config: Config) -> CoreResult<()> {
        self.config.replace(config)?;
        self.apply_config();
        Ok(())
    }

    fn apply_config(&mut self) {
        let config = self.config.get();
        self.history.set_max_past(config.history.max_size);
        self.document.set_limits(EditLimits::from(config));
        self.events.emit(EngineEvent::ConfigChanged);
    }

    // ==================== Events ====================

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn events(&self) -> &EventStream {
        &self.events
    }

    /// Subscribes to typed engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Handler;
    use crate::CoreError;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_execute_records_history() {
        let mut engine = Engine::new("<p>Hello</p>");
        engine.document_mut().select_offsets(5, 5);
        assert!(engine.execute("insertText", &[json!(" world")]).unwrap());
        assert_eq!(engine.state().content, "<p>Hello world</p>");
        assert!(engine.can_undo());

        assert!(engine.undo());
        assert_eq!(engine.state().content, "<p>Hello</p>");
        assert!(engine.redo());
        assert_eq!(engine.state().content, "<p>Hello world</p>");
        assert!(!engine.redo());
    }

    #[test]
    fn test_unknown_command_is_noop() {
        let mut engine = Engine::new("<p>x</p>");
        assert!(!engine.execute("doesNotExist", &[]).unwrap());
        assert!(!engine.can_undo());
    }

    #[test]
    fn test_failed_command_restores_document() {
        let mut engine = Engine::new("<p>x</p>");
        engine
            .register_command(Command::new("halfway", |doc: &mut Document, _: &[Value]| {
                doc.set_content("<p>changed</p>");
                anyhow::bail!("gave up")
            }))
            .unwrap();
        let err = engine.execute("halfway", &[]).unwrap_err();
        assert!(matches!(err, CoreError::CommandFailed { .. }));
        assert_eq!(engine.document().content(), "<p>x</p>");
        assert!(!engine.can_undo());
    }

    #[test]
    fn test_selection_only_commands_do_not_push_history() {
        let mut engine = Engine::new("<p>abc</p>");
        assert!(engine.execute("selectAll", &[]).unwrap());
        assert!(!engine.can_undo());
        assert_eq!(engine.query_value("selectAll"), "abc");
    }

    #[test]
    fn test_bus_notifications() {
        let mut engine = Engine::new("");
        let seen = Rc::new(RefCell::new(Vec::new()));
        for event in [CONTENT_CHANGE, COMMAND_EXECUTED, UNDO] {
            let sink = Rc::clone(&seen);
            engine.bus().on(
                event,
                Handler::new(move |args| {
                    sink.borrow_mut().push(format!("{event}:{}", args.len()));
                    Ok(())
                }),
            );
        }

        engine.execute("insertText", &[json!("a")]).unwrap();
        engine.undo();

        assert_eq!(
            *seen.borrow(),
            vec!["content-change:1", "command-executed:1", "content-change:1", "undo:0"]
        );
    }

    #[test]
    fn test_event_stream() {
        let mut engine = Engine::new("");
        let mut receiver = engine.subscribe();
        engine.execute("insertText", &[json!("a")]).unwrap();
        engine.undo();

        assert_eq!(receiver.try_recv().unwrap(), EngineEvent::ContentChanged);
        assert_eq!(
            receiver.try_recv().unwrap(),
            EngineEvent::CommandExecuted("insertText".to_string())
        );
        assert_eq!(receiver.try_recv().unwrap(), EngineEvent::Undo);
    }

    #[test]
    fn test_store_subscribers_see_changes() {
        let mut engine = Engine::new("");
        let contents = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&contents);
        let _sub = engine.store().subscribe(move |new, _old| {
            sink.borrow_mut().push(new.content.clone());
            Ok(())
        });
        engine.execute("setContent", &[json!("<p>a</p>")]).unwrap();
        engine.undo();
        assert_eq!(*contents.borrow(), vec!["<p>a</p>", ""]);
    }

    #[test]
    fn test_history_size_follows_config() {
        let mut engine = Engine::new("");
        for i in 0..10 {
            engine.execute("insertText", &[json!(i.to_string())]).unwrap();
        }
        engine
            .update_config(&ConfigPatch {
                history_max_size: Some(3),
                ..ConfigPatch::default()
            })
            .unwrap();
        let mut undos = 0;
        while engine.undo() {
            undos += 1;
        }
        assert_eq!(undos, 3);
        assert_eq!(engine.document().text(), "0123456");
    }

    #[test]
    fn test_invalid_config_update_changes_nothing() {
        let mut engine = Engine::new("");
        let result = engine.update_config(&ConfigPatch {
            table_max_rows: Some(10),
            history_max_size: Some(-1),
            ..ConfigPatch::default()
        });
        assert!(matches!(result, Err(CoreError::Config(_))));
        assert_eq!(engine.config(), &Config::default());
    }

    #[test]
    fn test_set_state_replaces_document() {
        let mut engine = Engine::new("<p>a</p>");
        let mut state = DocumentState::new("<p>loaded</p>");
        state.is_editing = false;
        engine.set_state(state.clone());
        assert_eq!(engine.state(), state);
        assert!(!engine.document().is_editing());
        assert!(engine.undo());
        assert_eq!(engine.document().content(), "<p>a</p>");
    }

    #[test]
    fn test_table_commands_through_engine() {
        let mut engine = Engine::new("<p>x</p>");
        engine
            .execute("insertTable", &[json!(2), json!(2)])
            .unwrap();
        engine.execute("insertColumnEnd", &[]).unwrap();
        assert_eq!(engine.query_value("insertTable"), "2x3");

        engine
            .update_config(&ConfigPatch {
                table_max_cols: Some(3),
                ..ConfigPatch::default()
            })
            .unwrap();
        assert!(engine.execute("insertColumnEnd", &[]).is_err());
        assert_eq!(engine.query_value("insertTable"), "2x3");
    }
    #[test]
    fn test_huge_colspan_from_markup_is_bounded() {
        let html = "<table><tr><td>a</td>\
                    <td colspan=\"18446744073709551615\">b</td></tr></table>";
        let engine = Engine::new(html);
        assert_eq!(engine.query_value("insertTable"), "1x1001");

        let mut engine = Engine::new("<table><tr><td colspan=\"5000000\">a</td></tr></table>");
        let before = engine.document().content();
        assert!(engine.execute("insertRowEnd", &[]).is_err());
        assert_eq!(engine.document().content(), before);
        assert!(!engine.undo());
    }

    #[test]
    fn test_deeply_nested_content_loads() {
        let depth = 100_000;
        let html = format!("{}x{}", "<b>".repeat(depth), "</b>".repeat(depth));
        let engine = Engine::new(&html);
        assert_eq!(engine.document().text(), "x");
        assert_eq!(engine.state().content, html);
    }
}
