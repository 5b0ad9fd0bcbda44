#![forbid(unsafe_code)]

//! Named-event dispatch with listener identity.
//!
//! [`EventTarget<E>`] is a shared listener table keyed by event name. Adding
//! the same [`Listener`] twice under one name is a single registration, and
//! removing an absent listener does nothing. Dispatch runs over a snapshot in
//! registration order, so listeners may add or remove listeners (or dispatch
//! again) while being invoked.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::id::ListenerId;

/// Anything that can be dispatched through an [`EventTarget`].
pub trait Event {
    /// Name listeners are registered under.
    fn name(&self) -> &str;
}

struct ListenerInner<E> {
    id: ListenerId,
    callback: Box<dyn Fn(&E)>,
}

/// An event callback handle. Clones share identity.
pub struct Listener<E> {
    inner: Rc<ListenerInner<E>>,
}

impl<E> Listener<E> {
    /// Wrap an event callback.
    pub fn new(callback: impl Fn(&E) + 'static) -> Self {
        Self {
            inner: Rc::new(ListenerInner {
                id: ListenerId::next(),
                callback: Box::new(callback),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.inner.id
    }

    fn call(&self, event: &E) {
        (self.inner.callback)(event);
    }
}

impl<E> Clone for Listener<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E> fmt::Debug for Listener<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("id", &self.inner.id).finish()
    }
}

/// Shared listener table. Cloning creates another handle to the same table.
pub struct EventTarget<E> {
    listeners: Rc<RefCell<HashMap<String, Vec<Listener<E>>>>>,
}

impl<E> Clone for EventTarget<E> {
    fn clone(&self) -> Self {
        Self {
            listeners: Rc::clone(&self.listeners),
        }
    }
}

impl<E> Default for EventTarget<E> {
    fn default() -> Self {
        Self {
            listeners: Rc::new(RefCell::new(HashMap::new())),
        }
    }
}

impl<E> fmt::Debug for EventTarget<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.borrow();
        let mut names: Vec<(&str, usize)> = listeners
            .iter()
            .map(|(name, list)| (name.as_str(), list.len()))
            .collect();
        names.sort_unstable();
        f.debug_struct("EventTarget")
            .field("listeners", &names)
            .finish()
    }
}

impl<E: Event> EventTarget<E> {
    /// Create an empty target.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for events named `name`.
    ///
    /// Returns `false` if it was already registered under that name.
    pub fn add_event_listener(&self, name: &str, listener: &Listener<E>) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let list = listeners.entry(name.to_owned()).or_default();
        if list.iter().any(|l| l.inner.id == listener.inner.id) {
            return false;
        }
        list.push(listener.clone());
        trace!(event = name, listener = %listener.inner.id, "listener added");
        true
    }

    /// Unregister `listener` from `name`. Returns whether anything was removed.
    pub fn remove_event_listener(&self, name: &str, listener: &Listener<E>) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let Some(list) = listeners.get_mut(name) else {
            return false;
        };
        let before = list.len();
        list.retain(|l| l.inner.id != listener.inner.id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(name);
        }
        removed
    }

    /// Invoke every listener registered under `event.name()`.
    ///
    /// Returns how many listeners ran.
    pub fn dispatch_event(&self, event: &E) -> usize {
        let snapshot: Vec<Listener<E>> = self
            .listeners
            .borrow()
            .get(event.name())
            .cloned()
            .unwrap_or_default();
        trace!(event = event.name(), listeners = snapshot.len(), "dispatch");
        for listener in &snapshot {
            listener.call(event);
        }
        snapshot.len()
    }

    /// Number of listeners registered under `name`.
    #[must_use]
    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.borrow().get(name).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    struct Ping(&'static str);

    impl Event for Ping {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn counting() -> (Rc<Cell<u32>>, Listener<Ping>) {
        let hits = Rc::new(Cell::new(0u32));
        let hits_clone = Rc::clone(&hits);
        let listener = Listener::new(move |_: &Ping| hits_clone.set(hits_clone.get() + 1));
        (hits, listener)
    }

    #[test]
    fn dispatch_reaches_named_listeners_only() {
        let target = EventTarget::new();
        let (a_hits, a) = counting();
        let (b_hits, b) = counting();
        target.add_event_listener("a", &a);
        target.add_event_listener("b", &b);

        assert_eq!(target.dispatch_event(&Ping("a")), 1);
        assert_eq!(a_hits.get(), 1);
        assert_eq!(b_hits.get(), 0);
        assert_eq!(target.dispatch_event(&Ping("missing")), 0);
    }

    #[test]
    fn add_is_idempotent_per_name() {
        let target = EventTarget::new();
        let (hits, l) = counting();
        assert!(target.add_event_listener("a", &l));
        assert!(!target.add_event_listener("a", &l.clone()));
        assert_eq!(target.listener_count("a"), 1);

        target.dispatch_event(&Ping("a"));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn remove_absent_is_noop() {
        let target: EventTarget<Ping> = EventTarget::new();
        let (_, l) = counting();
        assert!(!target.remove_event_listener("a", &l));
        target.add_event_listener("a", &l);
        assert!(target.remove_event_listener("a", &l));
        assert_eq!(target.listener_count("a"), 0);
    }

    #[test]
    fn listener_removed_during_dispatch_still_sees_current_event() {
        let target = EventTarget::new();
        let (hits, second) = counting();
        let target_clone = target.clone();
        let second_clone = second.clone();
        let first = Listener::new(move |_: &Ping| {
            target_clone.remove_event_listener("a", &second_clone);
        });
        target.add_event_listener("a", &first);
        target.add_event_listener("a", &second);

        target.dispatch_event(&Ping("a"));
        assert_eq!(hits.get(), 1);
        target.dispatch_event(&Ping("a"));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn clone_shares_listeners() {
        let target = EventTarget::new();
        let (hits, l) = counting();
        target.clone().add_event_listener("a", &l);
        target.dispatch_event(&Ping("a"));
        assert_eq!(hits.get(), 1);
        assert!(format!("{target:?}").contains("EventTarget"));
    }
}
