#![forbid(unsafe_code)]

//! Named state container that republishes atom transitions as events.
//!
//! # Design
//!
//! A [`Container<S>`] owns one [`Atom<S>`] for its whole life; `set_state`
//! mutates that atom in place and never replaces it. At construction the
//! container installs a watcher on the atom that dispatches a `changed`
//! [`StateEvent`] for every successful transition, then dispatches a
//! `created` event before returning.
//!
//! Readers further down a call tree reach the atom through the container's
//! [`Consumer`]. The [`Producer`] side always supplies the atom handle
//! itself, so a consumer that read the atom once sees later values by
//! reading it again.
//!
//! ```text
//! set_state ──► Atom::swap / Atom::reset ──► watchers
//!                                              └─► EventTarget::dispatch_event("canvas-state:changed")
//! ```
//!
//! # Event names
//!
//! | Kind | Default name | Detail |
//! |------|--------------|--------|
//! | [`EventKind::Created`] | `canvas-state:initialized` | `{ state: Atom<S> }` |
//! | [`EventKind::Changed`] | `canvas-state:changed` | `{ state, previous_state }` |

use std::fmt;

use tracing::debug;

use crate::atom::{Atom, Watcher, make_atom};
use crate::context::{Consumer, Producer, ProvideGuard, create_context};
use crate::error::Result;
use crate::event::{Event, EventTarget, Listener};

/// Default event namespace.
pub const DEFAULT_NAMESPACE: &str = "canvas-state";

/// The two events a container emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Once, during construction.
    Created,
    /// Once per successful transition.
    Changed,
}

/// Event names used by a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventNames {
    pub created: String,
    pub changed: String,
}

impl Default for EventNames {
    fn default() -> Self {
        Self::with_namespace(DEFAULT_NAMESPACE)
    }
}

impl EventNames {
    /// `"{namespace}:initialized"` and `"{namespace}:changed"`.
    #[must_use]
    pub fn with_namespace(namespace: &str) -> Self {
        Self {
            created: format!("{namespace}:initialized"),
            changed: format!("{namespace}:changed"),
        }
    }

    /// Name for `kind`.
    #[must_use]
    pub fn name(&self, kind: EventKind) -> &str {
        match kind {
            EventKind::Created => &self.created,
            EventKind::Changed => &self.changed,
        }
    }
}

/// Payload of a [`StateEvent`].
pub enum EventDetail<S> {
    Created { state: Atom<S> },
    Changed { state: S, previous_state: S },
}

impl<S: fmt::Debug> fmt::Debug for EventDetail<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created { state } => f.debug_struct("Created").field("state", state).finish(),
            Self::Changed {
                state,
                previous_state,
            } => f
                .debug_struct("Changed")
                .field("state", state)
                .field("previous_state", previous_state)
                .finish(),
        }
    }
}

/// An event dispatched by a [`Container`].
#[derive(Debug)]
pub struct StateEvent<S> {
    name: String,
    container: String,
    detail: EventDetail<S>,
}

impl<S> StateEvent<S> {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self.detail {
            EventDetail::Created { .. } => EventKind::Created,
            EventDetail::Changed { .. } => EventKind::Changed,
        }
    }

    /// Name of the container that dispatched the event.
    #[must_use]
    pub fn container(&self) -> &str {
        &self.container
    }

    #[must_use]
    pub fn detail(&self) -> &EventDetail<S> {
        &self.detail
    }
}

impl<S> Event for StateEvent<S> {
    fn name(&self) -> &str {
        &self.name
    }
}

/// How `set_state` moves to the next state.
///
/// A plain `S` converts to [`StateUpdate::Replace`], so a state that is
/// itself a function is replaced wholesale and never applied as an updater.
pub enum StateUpdate<S> {
    /// Delegates to [`Atom::reset`].
    Replace(S),
    /// Delegates to [`Atom::swap`].
    Apply(Box<dyn FnOnce(&S) -> S>),
}

impl<S> StateUpdate<S> {
    /// Updater form.
    pub fn apply(f: impl FnOnce(&S) -> S + 'static) -> Self {
        Self::Apply(Box::new(f))
    }
}

impl<S> From<S> for StateUpdate<S> {
    fn from(next: S) -> Self {
        Self::Replace(next)
    }
}

impl<S> fmt::Debug for StateUpdate<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace(_) => f.write_str("Replace(..)"),
            Self::Apply(_) => f.write_str("Apply(..)"),
        }
    }
}

/// Builder for [`Container`]. Listeners attached here observe the `created`
/// event, which fires before construction returns.
pub struct ContainerBuilder<S> {
    name: String,
    initial_state: S,
    validator: Option<Box<dyn Fn(&S, &S) -> bool>>,
    names: EventNames,
    target: Option<EventTarget<StateEvent<S>>>,
    listeners: Vec<(EventKind, Listener<StateEvent<S>>)>,
}

impl<S: Clone + 'static> ContainerBuilder<S> {
    #[must_use]
    pub fn new(name: impl Into<String>, initial_state: S) -> Self {
        Self {
            name: name.into(),
            initial_state,
            validator: None,
            names: EventNames::default(),
            target: None,
            listeners: Vec::new(),
        }
    }

    /// Guard the atom with `validator(next, previous)`.
    #[must_use]
    pub fn validator(mut self, validator: impl Fn(&S, &S) -> bool + 'static) -> Self {
        self.validator = Some(Box::new(validator));
        self
    }

    /// Override the event names.
    #[must_use]
    pub fn event_names(mut self, names: EventNames) -> Self {
        self.names = names;
        self
    }

    /// Dispatch on a shared target instead of a private one.
    #[must_use]
    pub fn event_target(mut self, target: EventTarget<StateEvent<S>>) -> Self {
        self.target = Some(target);
        self
    }

    /// Attach a listener before construction.
    #[must_use]
    pub fn listener(mut self, kind: EventKind, listener: Listener<StateEvent<S>>) -> Self {
        self.listeners.push((kind, listener));
        self
    }

    /// Construct the container and dispatch its `created` event.
    #[must_use]
    pub fn build(self) -> Container<S> {
        let events = self.target.unwrap_or_default();
        for (kind, listener) in &self.listeners {
            events.add_event_listener(self.names.name(*kind), listener);
        }

        let state = make_atom(self.initial_state, self.validator);
        let (producer, consumer) = create_context(state.clone());

        let on_change = {
            let events = events.clone();
            let event_name = self.names.changed.clone();
            let container = self.name.clone();
            Watcher::new(move |next: &S, previous: &S, _atom: &Atom<S>| {
                events.dispatch_event(&StateEvent {
                    name: event_name.clone(),
                    container: container.clone(),
                    detail: EventDetail::Changed {
                        state: next.clone(),
                        previous_state: previous.clone(),
                    },
                });
            })
        };
        state.watch(&on_change);

        let container = Container {
            name: self.name,
            state,
            events,
            names: self.names,
            producer,
            consumer,
            on_change,
        };

        let listeners = container.events.dispatch_event(&StateEvent {
            name: container.names.created.clone(),
            container: container.name.clone(),
            detail: EventDetail::Created {
                state: container.state.clone(),
            },
        });
        debug!(
            container = %container.name,
            atom = %container.state.id(),
            listeners,
            "container created"
        );
        container
    }
}

/// A named wrapper around one [`Atom`].
///
/// The name is an opaque label; any string, empty included, is accepted.
pub struct Container<S> {
    name: String,
    state: Atom<S>,
    events: EventTarget<StateEvent<S>>,
    names: EventNames,
    producer: Producer<Atom<S>>,
    consumer: Consumer<Atom<S>>,
    on_change: Watcher<S>,
}

impl<S: fmt::Debug> fmt::Debug for Container<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

impl<S: Clone + 'static> Container<S> {
    /// Create a container over `initial_state`.
    #[must_use]
    pub fn new(name: impl Into<String>, initial_state: S) -> Self {
        ContainerBuilder::new(name, initial_state).build()
    }

    /// Create a container over `S::default()`.
    #[must_use]
    pub fn with_default(name: impl Into<String>) -> Self
    where
        S: Default,
    {
        Self::new(name, S::default())
    }

    /// Start a builder.
    #[must_use]
    pub fn builder(name: impl Into<String>, initial_state: S) -> ContainerBuilder<S> {
        ContainerBuilder::new(name, initial_state)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wrapped atom. It is never replaced.
    #[must_use]
    pub fn state(&self) -> &Atom<S> {
        &self.state
    }

    /// Current state.
    #[must_use]
    pub fn get_state(&self) -> S {
        self.state.get()
    }

    /// Move to the next state and return it.
    ///
    /// `Apply` runs through [`Atom::swap`], `Replace` through [`Atom::reset`].
    /// The `changed` event has been dispatched by the time this returns.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidStateTransition`](crate::Error::InvalidStateTransition)
    /// if the atom rejects the value.
    pub fn set_state(&self, next: impl Into<StateUpdate<S>>) -> Result<S> {
        match next.into() {
            StateUpdate::Apply(f) => self.state.swap(f)?,
            StateUpdate::Replace(value) => self.state.reset(value)?,
        };
        Ok(self.get_state())
    }

    /// Shorthand for `set_state(StateUpdate::apply(f))`.
    ///
    /// # Errors
    ///
    /// See [`Container::set_state`].
    pub fn update_state(&self, f: impl FnOnce(&S) -> S + 'static) -> Result<S> {
        self.set_state(StateUpdate::apply(f))
    }

    /// Listen for `kind` events from this container.
    pub fn add_event_listener(&self, kind: EventKind, listener: &Listener<StateEvent<S>>) -> bool {
        self.events
            .add_event_listener(self.names.name(kind), listener)
    }

    pub fn remove_event_listener(
        &self,
        kind: EventKind,
        listener: &Listener<StateEvent<S>>,
    ) -> bool {
        self.events
            .remove_event_listener(self.names.name(kind), listener)
    }

    /// Target this container dispatches on.
    #[must_use]
    pub fn event_target(&self) -> &EventTarget<StateEvent<S>> {
        &self.events
    }

    #[must_use]
    pub fn event_names(&self) -> &EventNames {
        &self.names
    }

    #[must_use]
    pub fn producer(&self) -> &Producer<Atom<S>> {
        &self.producer
    }

    #[must_use]
    pub fn consumer(&self) -> &Consumer<Atom<S>> {
        &self.consumer
    }

    /// Make this container's atom the nearest provided value.
    #[must_use = "the atom is only provided while the guard is alive"]
    pub fn provide(&self) -> ProvideGuard {
        self.producer.provide(self.state.clone())
    }

    /// Watcher the container installed on its atom.
    #[must_use]
    pub fn change_watcher(&self) -> &Watcher<S> {
        &self.on_change
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    type Doc = BTreeMap<&'static str, i32>;

    fn doc(pairs: &[(&'static str, i32)]) -> Doc {
        pairs.iter().copied().collect()
    }

    fn recorder<S: Clone + 'static>() -> (Rc<RefCell<Vec<(S, S)>>>, Listener<StateEvent<S>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = Rc::clone(&log);
        let listener = Listener::new(move |event: &StateEvent<S>| {
            if let EventDetail::Changed {
                state,
                previous_state,
            } = event.detail()
            {
                log_clone
                    .borrow_mut()
                    .push((state.clone(), previous_state.clone()));
            }
        });
        (log, listener)
    }

    #[test]
    fn get_state_returns_initial() {
        let c = Container::new("c", doc(&[("a", 1)]));
        assert_eq!(c.name(), "c");
        assert_eq!(c.get_state(), doc(&[("a", 1)]));
    }

    #[test]
    fn default_state() {
        let c: Container<Doc> = Container::with_default("empty");
        assert!(c.get_state().is_empty());
    }

    #[test]
    fn empty_name_is_accepted() {
        let c = Container::new("", 0);
        assert_eq!(c.name(), "");
    }

    #[test]
    fn set_state_emits_one_changed_event() {
        let c = Container::new("c", doc(&[("a", 1)]));
        let (log, listener) = recorder();
        c.add_event_listener(EventKind::Changed, &listener);

        let next = c.set_state(doc(&[("a", 2)])).unwrap();
        assert_eq!(next, doc(&[("a", 2)]));
        assert_eq!(
            *log.borrow(),
            vec![(doc(&[("a", 2)]), doc(&[("a", 1)]))]
        );
    }

    #[test]
    fn update_state_applies_function() {
        let c = Container::new("counter", 1);
        assert_eq!(c.update_state(|n| n + 1).unwrap(), 2);
        assert_eq!(c.set_state(StateUpdate::apply(|n: &i32| n * 5)).unwrap(), 10);
        assert_eq!(c.set_state(3).unwrap(), 3);
    }

    #[test]
    fn function_state_is_replaced_not_applied() {
        type Op = Rc<dyn Fn(i32) -> i32>;
        let double: Op = Rc::new(|n: i32| n * 2);
        let triple: Op = Rc::new(|n: i32| n * 3);

        let c = Container::new("op", double);
        c.set_state(Rc::clone(&triple)).unwrap();
        let current = c.get_state();
        assert!(Rc::ptr_eq(&current, &triple));
        assert_eq!(current(2), 6);
    }

    #[test]
    fn created_event_fires_during_construction() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let listener = Listener::new(move |event: &StateEvent<i32>| {
            if let EventDetail::Created { state } = event.detail() {
                seen_clone
                    .borrow_mut()
                    .push((event.name().to_owned(), event.container().to_owned(), state.get()));
            }
        });

        let c = Container::builder("c", 4)
            .listener(EventKind::Created, listener)
            .build();
        assert_eq!(
            *seen.borrow(),
            vec![("canvas-state:initialized".to_owned(), "c".to_owned(), 4)]
        );
        drop(c);
    }

    #[test]
    fn created_detail_is_the_live_atom() {
        let slot: Rc<RefCell<Option<Atom<i32>>>> = Rc::new(RefCell::new(None));
        let slot_clone = Rc::clone(&slot);
        let listener = Listener::new(move |event: &StateEvent<i32>| {
            if let EventDetail::Created { state } = event.detail() {
                *slot_clone.borrow_mut() = Some(state.clone());
            }
        });
        let c = Container::builder("c", 0)
            .listener(EventKind::Created, listener)
            .build();
        c.set_state(9).unwrap();

        let captured = slot.borrow_mut().take().unwrap();
        assert!(captured.ptr_eq(c.state()));
        assert_eq!(captured.get(), 9);
    }

    #[test]
    fn custom_namespace() {
        let names = EventNames::with_namespace("editor");
        assert_eq!(names.name(EventKind::Changed), "editor:changed");

        let target = EventTarget::new();
        let (log, listener) = recorder::<i32>();
        target.add_event_listener("editor:changed", &listener);

        let c = Container::builder("c", 0)
            .event_names(names)
            .event_target(target.clone())
            .build();
        c.set_state(1).unwrap();
        assert_eq!(*log.borrow(), vec![(1, 0)]);
        assert_eq!(target.listener_count("canvas-state:changed"), 0);
    }

    #[test]
    fn rejected_update_emits_nothing() {
        let (log, listener) = recorder::<i32>();
        let c = Container::builder("c", 0)
            .validator(|next: &i32, _: &i32| *next >= 0)
            .listener(EventKind::Changed, listener)
            .build();

        let err = c.set_state(-1).unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { atom, .. } if atom == c.state().id()));
        assert_eq!(c.get_state(), 0);
        assert!(log.borrow().is_empty());

        c.update_state(|n| n + 1).unwrap();
        assert_eq!(*log.borrow(), vec![(1, 0)]);
    }

    #[test]
    fn remove_listener_stops_events() {
        let c = Container::new("c", 0);
        let (log, listener) = recorder::<i32>();
        assert!(c.add_event_listener(EventKind::Changed, &listener));
        c.set_state(1).unwrap();
        assert!(c.remove_event_listener(EventKind::Changed, &listener));
        c.set_state(2).unwrap();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn consumer_reads_live_atom() {
        let c = Container::new("c", 1);
        let consumer = c.consumer().clone();

        let atom = {
            let _guard = c.provide();
            consumer.read()
        };
        assert!(atom.ptr_eq(c.state()));

        c.set_state(2).unwrap();
        assert_eq!(atom.get(), 2);
    }

    #[test]
    fn consumer_default_is_the_atom() {
        let c = Container::new("c", 5);
        assert!(!c.consumer().is_provided());
        assert!(c.consumer().read().ptr_eq(c.state()));
    }

    #[test]
    fn nearest_producer_wins() {
        let outer = Container::new("outer", 1);
        let inner_atom = Atom::new(2);
        let consumer = outer.consumer().clone();

        let _outer_guard = outer.provide();
        outer.producer().scope(inner_atom.clone(), || {
            assert_eq!(consumer.read().get(), 2);
        });
        assert_eq!(consumer.read().get(), 1);
    }

    #[test]
    fn container_installs_one_watcher() {
        let c = Container::new("c", 0);
        assert_eq!(c.state().watcher_count(), 1);
        assert!(c.change_watcher().id().is_some());
    }
}
