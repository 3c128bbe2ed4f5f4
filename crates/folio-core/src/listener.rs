//! Listener bookkeeping shared by the store, the config manager and the bus.
//!
//! ## Learning: Disposal Handles
//!
//! Every subscription returns a [`Subscription`]. It holds a `Weak`
//! reference back to the listener list, so it never keeps the owner alive
//! and unsubscribing after the owner is gone is harmless. Dropping the
//! handle does *not* unsubscribe; disposal is always explicit.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

/// Explicit disposal handle for a registered listener.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Removes the listener. Safe to call after the owner was dropped.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

struct Entries<F: ?Sized> {
    items: Vec<(u64, Rc<F>)>,
    next_id: u64,
}

/// Ordered listener list with id-based removal.
pub(crate) struct ListenerList<F: ?Sized> {
    inner: Rc<RefCell<Entries<F>>>,
}

impl<F: ?Sized + 'static> ListenerList<F> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Entries {
                items: Vec::new(),
                next_id: 0,
            })),
        }
    }

    pub(crate) fn add(&self, listener: Rc<F>) -> Subscription {
        let id = {
            let mut entries = self.inner.borrow_mut();
            entries.next_id += 1;
            let id = entries.next_id;
            entries.items.push((id, listener));
            id
        };
        let weak: Weak<RefCell<Entries<F>>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().items.retain(|(entry, _)| *entry != id);
            }
        })
    }

    /// Copies the current listeners so they can be invoked without a borrow held.
    pub(crate) fn snapshot(&self) -> Vec<(u64, Rc<F>)> {
        self.inner.borrow().items.clone()
    }

    pub(crate) fn contains(&self, id: u64) -> bool {
        self.inner.borrow().items.iter().any(|(entry, _)| *entry == id)
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.borrow().items.len()
    }
}

/// Runs a listener, logging (and swallowing) errors and panics.
///
/// Returns true if the listener completed successfully.
pub(crate) fn invoke_isolated(what: &str, f: impl FnOnce() -> anyhow::Result<()>) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            tracing::error!(listener = what, error = %err, "Listener failed");
            false
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(listener = what, panic = %message, "Listener panicked");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_unsubscribe_removes_only_that_listener() {
        let list: ListenerList<dyn Fn() -> u32> = ListenerList::new();
        let first = list.add(Rc::new(|| 1));
        let _second = list.add(Rc::new(|| 2));
        assert_eq!(list.len(), 2);

        first.unsubscribe();
        let remaining: Vec<u32> = list.snapshot().iter().map(|(_, f)| f()).collect();
        assert_eq!(remaining, vec![2]);
    }

    #[test]
    fn test_unsubscribe_after_owner_dropped() {
        let list: ListenerList<dyn Fn()> = ListenerList::new();
        let sub = list.add(Rc::new(|| {}));
        drop(list);
        sub.unsubscribe();
    }

    #[test]
    fn test_invoke_isolated_catches_errors_and_panics() {
        let ran = Cell::new(false);
        assert!(invoke_isolated("ok", || {
            ran.set(true);
            Ok(())
        }));
        assert!(ran.get());
        assert!(!invoke_isolated("err", || anyhow::bail!("boom")));
        assert!(!invoke_isolated("panic", || panic!("boom")));
    }
}
