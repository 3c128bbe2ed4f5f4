//! Event system for engine notifications.
//!
//! Two complementary channels:
//!
//! - [`EventBus`]: synchronous, name-keyed publish/subscribe. Handlers run
//!   inside `emit`, in registration order, with failures isolated. This is
//!   what plugins and commands hook into.
//! - [`EventStream`]: typed [`EngineEvent`]s on a `tokio::sync::broadcast`
//!   channel for async observers (UI, persistence) that should never run
//!   inside the engine's call stack.
//!
//! ## Learning: Observer Pattern in Rust
//!
//! Callbacks that may re-enter the bus (subscribe or emit from inside a
//! handler) rule out holding a `RefCell` borrow across the call. `emit`
//! therefore copies the handler list first and re-checks registration
//! before each call.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;
use tokio::sync::broadcast;

use crate::listener::{Subscription, invoke_isolated};

/// Result returned by event handlers.
pub type HandlerResult = anyhow::Result<()>;

/// A shareable event handler.
///
/// Handlers compare by identity, which is what [`EventBus::off`] uses.
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn(&[Value]) -> HandlerResult>);

impl Handler {
    /// Wraps a closure.
    pub fn new(f: impl Fn(&[Value]) -> HandlerResult + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Invokes the handler directly.
    pub fn call(&self, args: &[Value]) -> HandlerResult {
        (self.0)(args)
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// One entry of [`EventBus::emit_batch`].
#[derive(Debug, Clone)]
pub struct BatchEvent {
    pub event: String,
    pub args: Vec<Value>,
}

impl BatchEvent {
    pub fn new(event: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            event: event.into(),
            args,
        }
    }
}

struct Listener {
    id: u64,
    handler: Handler,
    once: bool,
}

#[derive(Default)]
struct BusInner {
    listeners: HashMap<String, Vec<Listener>>,
    next_id: u64,
}

impl BusInner {
    fn remove(&mut self, event: &str, id: u64) {
        if let Some(list) = self.listeners.get_mut(event) {
            list.retain(|l| l.id != id);
            if list.is_empty() {
                self.listeners.remove(event);
            }
        }
    }
}

/// Name-keyed synchronous event bus.
///
/// Cloning yields another handle to the same bus, so handlers can capture
/// a clone to emit follow-up events.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<RefCell<BusInner>>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a handler; it fires on every emit until unsubscribed.
    pub fn on(&self, event: &str, handler: Handler) -> Subscription {
        self.add(event, handler, false)
    }

    /// Subscribes a handler that removes itself after its first invocation.
    pub fn once(&self, event: &str, handler: Handler) -> Subscription {
        self.add(event, handler, true)
    }

    fn add(&self, event: &str, handler: Handler, once: bool) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            inner.next_id += 1;
            let id = inner.next_id;
            inner
                .listeners
                .entry(event.to_string())
                .or_default()
                .push(Listener { id, handler, once });
            id
        };
        let weak: Weak<RefCell<BusInner>> = Rc::downgrade(&self.inner);
        let event = event.to_string();
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().remove(&event, id);
            }
        })
    }

    /// Removes every registration of `handler` for `event`.
    pub fn off(&self, event: &str, handler: &Handler) {
        let mut inner = self.inner.borrow_mut();
        let ids: Vec<u64> = inner
            .listeners
            .get(event)
            .map(|list| {
                list.iter()
                    .filter(|l| &l.handler == handler)
                    .map(|l| l.id)
                    .collect()
            })
            .unwrap_or_default();
        for id in ids {
            inner.remove(event, id);
        }
    }

    fn is_registered(&self, event: &str, id: u64) -> bool {
        self.inner
            .borrow()
            .listeners
            .get(event)
            .is_some_and(|list| list.iter().any(|l| l.id == id))
    }

    /// Calls every handler of `event` with `args`.
    ///
    /// Handlers run in registration order. A failing or panicking handler
    /// is logged and the rest still run. Emitting with no handlers is a
    /// no-op.
    pub fn emit(&self, event: &str, args: &[Value]) {
        let snapshot: Vec<(u64, Handler, bool)> = match self.inner.borrow().listeners.get(event) {
            Some(list) => list
                .iter()
                .map(|l| (l.id, l.handler.clone(), l.once))
                .collect(),
            None => return,
        };
        tracing::trace!(event, handlers = snapshot.len(), "Emitting event");

        for (id, handler, once) in snapshot {
            // An earlier handler may have unsubscribed this one.
            if !self.is_registered(event, id) {
                continue;
            }
            invoke_isolated(event, || handler.call(args));
            if once {
                self.inner.borrow_mut().remove(event, id);
            }
        }
    }

    /// Emits several events in order.
    pub fn emit_batch(&self, events: &[BatchEvent]) {
        for entry in events {
            self.emit(&entry.event, &entry.args);
        }
    }

    /// Removes all handlers of one event.
    pub fn remove_all_listeners(&self, event: &str) {
        self.inner.borrow_mut().listeners.remove(event);
    }

    /// Removes every handler of every event.
    pub fn clear(&self) {
        self.inner.borrow_mut().listeners.clear();
    }

    /// Number of handlers registered for an event.
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner
            .borrow()
            .listeners
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Names of events that currently have handlers, sorted.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.borrow().listeners.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Events published to async observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Document content (or any state field) changed through a command
    ContentChanged,
    /// State was replaced wholesale from outside (persistence load)
    StateReplaced,
    /// A command ran
    CommandExecuted(String),
    /// History moved back
    Undo,
    /// History moved forward
    Redo,
    /// Configuration was updated
    ConfigChanged,

    // Plugin lifecycle
    PluginLoaded(String),
    PluginUnloaded(String),
    PluginActivated(String),
    PluginDeactivated(String),
}

/// Broadcast channel of [`EngineEvent`]s.
///
/// ## Design
///
/// - Multiple subscribers (UI, persistence, plugins running elsewhere)
/// - Lagged receivers don't block the engine
/// - Sending with no receivers is not an error
#[derive(Clone)]
pub struct EventStream {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventStream {
    /// Creates a stream buffering up to 256 events per receiver.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    /// Publishes an event.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }

    /// Returns a receiver for all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper for consuming an [`EventStream`] asynchronously.
///
/// ```ignore
/// let mut handler = EventHandler::new(engine.subscribe());
/// tokio::spawn(async move {
///     while let Some(event) = handler.next().await {
///         if event == EngineEvent::ContentChanged {
///             // persist
///         }
///     }
/// });
/// ```
pub struct EventHandler {
    receiver: broadcast::Receiver<EngineEvent>,
}

impl EventHandler {
    pub fn new(receiver: broadcast::Receiver<EngineEvent>) -> Self {
        Self { receiver }
    }

    /// Waits for the next event; `None` once the stream is closed.
    pub async fn next(&mut self) -> Option<EngineEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Event handler lagged, missed {} events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::{Cell, RefCell};

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&'static str) -> Handler) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let make = move |tag: &'static str| {
            let sink = sink.clone();
            Handler::new(move |_args| {
                sink.borrow_mut().push(tag.to_string());
                Ok(())
            })
        };
        (log, make)
    }

    #[test]
    fn test_handlers_fire_in_registration_order() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        bus.on("e", make("a"));
        bus.on("e", make("b"));
        bus.once("e", make("c"));
        bus.emit("e", &[]);
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_failing_handler_is_isolated() {
        let bus = EventBus::new();
        let received = Rc::new(RefCell::new(None));
        let once_calls = Rc::new(Cell::new(0));

        bus.on("e", Handler::new(|_args| anyhow::bail!("handler failure")));
        let sink = received.clone();
        bus.on(
            "e",
            Handler::new(move |args| {
                *sink.borrow_mut() = args.first().cloned();
                Ok(())
            }),
        );
        let counter = once_calls.clone();
        bus.once(
            "e",
            Handler::new(move |_args| {
                counter.set(counter.get() + 1);
                Ok(())
            }),
        );

        bus.emit("e", &[json!("x")]);
        assert_eq!(*received.borrow(), Some(json!("x")));
        assert_eq!(once_calls.get(), 1);

        bus.emit("e", &[]);
        assert_eq!(once_calls.get(), 1);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        bus.on("e", Handler::new(|_args| panic!("handler panic")));
        bus.on("e", make("after"));
        bus.emit("e", &[]);
        assert_eq!(*log.borrow(), vec!["after"]);
    }

    #[test]
    fn test_emit_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.emit("nobody-listens", &[json!(1)]);
        assert_eq!(bus.listener_count("nobody-listens"), 0);
    }

    #[test]
    fn test_subscription_and_off() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let a = make("a");
        let sub = bus.on("e", make("b"));
        bus.on("e", a.clone());
        assert_eq!(bus.listener_count("e"), 2);

        sub.unsubscribe();
        bus.off("e", &a);
        bus.emit("e", &[]);
        assert!(log.borrow().is_empty());
        assert!(bus.event_names().is_empty());
    }

    #[test]
    fn test_handler_can_unsubscribe_later_handler() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        let victim = make("victim");
        let bus_handle = bus.clone();
        let target = victim.clone();
        bus.on(
            "e",
            Handler::new(move |_args| {
                bus_handle.off("e", &target);
                Ok(())
            }),
        );
        bus.on("e", victim);
        bus.emit("e", &[]);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_batch_and_bulk_removal() {
        let bus = EventBus::new();
        let (log, make) = recorder();
        bus.on("a", make("a"));
        bus.on("b", make("b"));
        bus.emit_batch(&[BatchEvent::new("b", vec![]), BatchEvent::new("a", vec![])]);
        assert_eq!(*log.borrow(), vec!["b", "a"]);
        assert_eq!(bus.event_names(), vec!["a", "b"]);

        bus.remove_all_listeners("a");
        assert_eq!(bus.listener_count("a"), 0);
        bus.clear();
        assert!(bus.event_names().is_empty());
    }

    #[tokio::test]
    async fn test_event_stream() {
        let stream = EventStream::new();
        let mut rx = stream.subscribe();
        stream.emit(EngineEvent::ConfigChanged);
        assert_eq!(rx.recv().await.unwrap(), EngineEvent::ConfigChanged);
    }

    #[tokio::test]
    async fn test_event_handler_next() {
        let stream = EventStream::new();
        let mut handler = EventHandler::new(stream.subscribe());
        stream.emit(EngineEvent::Undo);
        assert_eq!(handler.next().await, Some(EngineEvent::Undo));
    }
}
