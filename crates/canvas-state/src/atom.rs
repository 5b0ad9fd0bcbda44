#![forbid(unsafe_code)]

//! Validated value cell with change and abandonment notification.
//!
//! # Design
//!
//! [`Atom<T>`] wraps a value of type `T` in shared, reference-counted
//! storage. Cloning an atom hands out another handle to the **same** cell.
//! Every transition ([`Atom::swap`], [`Atom::reset`]) runs the validator
//! against the candidate and the current value, stores the candidate, and
//! then notifies every registered [`Watcher`] with `(next, previous, atom)`.
//!
//! A second, independent set of [`UnreferencedWatcher`]s fires when an
//! [`Atom::unwatch`] call removes the last ordinary watcher. Owners use it to
//! notice that every consumer has let go of an atom.
//!
//! # Invariants
//!
//! 1. `validator(next, previous)` held for every stored transition. A rejected
//!    candidate leaves the value and both watcher sets untouched and runs no
//!    watcher.
//! 2. The ordinary watcher set is `None` until the first `watch`, and collapses
//!    back to `None` when an `unwatch` empties it. Unreferenced watchers fire
//!    only on that `Some -> None` edge.
//! 3. Registering the same handle twice is one subscription.
//! 4. Watchers run in first-registration order over a snapshot taken before
//!    the first callback. No interior borrow is held while callbacks run.
//!
//! # Failure Modes
//!
//! - **Re-entrant transition**: a watcher calling `swap`/`reset` on the same
//!   atom is legal. The nested transition notifies fully before the outer
//!   loop resumes, and the outer loop still delivers its own `(next, previous)`
//!   pair to the remaining watchers.
//! - **Panicking watcher**: the panic propagates out of the transition and the
//!   remaining watchers are skipped. The new value is already stored, so the
//!   atom stays consistent and usable once the panic is caught.
//! - **Re-entrant validator**: validators must not mutate the atom they guard;
//!   doing so panics (`RefCell` borrow rules).
//! - **Watcher leak**: watcher handles are held until removed.

use std::any::Any;
use std::cell::{OnceCell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace, trace_span};

use crate::error::{Error, Result};
use crate::id::{AtomId, WatcherId};

type ValidatorFn<T> = dyn Fn(&T, &T) -> bool;
type WatchFn<T> = dyn Fn(&T, &T, &Atom<T>);
type UnreferencedFn<T> = dyn Fn(&Atom<T>);

/// Shared body of a callback handle. The id is assigned lazily, the first
/// time the handle is registered with any atom.
struct Handle<F: ?Sized> {
    id: OnceCell<WatcherId>,
    callback: Box<F>,
}

impl<F: ?Sized> Handle<F> {
    fn id(&self) -> WatcherId {
        *self.id.get_or_init(WatcherId::next)
    }
}

/// `None` means "no watchers", never an empty map.
type WatcherSet<F> = Option<BTreeMap<WatcherId, Rc<Handle<F>>>>;

fn add_watcher<F: ?Sized>(set: &mut WatcherSet<F>, handle: &Rc<Handle<F>>) -> bool {
    set.get_or_insert_with(BTreeMap::new)
        .insert(handle.id(), Rc::clone(handle))
        .is_none()
}

fn remove_watcher<F: ?Sized>(set: &mut WatcherSet<F>, handle: &Rc<Handle<F>>) -> bool {
    // A handle that was never registered anywhere has no id yet.
    let (Some(map), Some(id)) = (set.as_mut(), handle.id.get()) else {
        return false;
    };
    if map.remove(id).is_none() {
        return false;
    }
    if map.is_empty() {
        *set = None;
    }
    true
}

fn snapshot<F: ?Sized>(set: &WatcherSet<F>) -> Vec<Rc<Handle<F>>> {
    set.as_ref()
        .map(|map| map.values().cloned().collect())
        .unwrap_or_default()
}

fn count<F: ?Sized>(set: &WatcherSet<F>) -> usize {
    set.as_ref().map_or(0, BTreeMap::len)
}

/// A change callback: `(next, previous, atom)`.
///
/// Cloning a `Watcher` yields the same subscription identity, so
/// `atom.watch(&w); atom.watch(&w.clone());` registers once.
pub struct Watcher<T> {
    handle: Rc<Handle<WatchFn<T>>>,
}

impl<T> Watcher<T> {
    /// Wrap a change callback.
    pub fn new(callback: impl Fn(&T, &T, &Atom<T>) + 'static) -> Self {
        Self {
            handle: Rc::new(Handle {
                id: OnceCell::new(),
                callback: Box::new(callback),
            }),
        }
    }

    /// Id assigned at first registration, if any.
    #[must_use]
    pub fn id(&self) -> Option<WatcherId> {
        self.handle.id.get().copied()
    }

    /// Whether both handles are the same subscription.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.handle, &other.handle)
    }
}

impl<T> Clone for Watcher<T> {
    fn clone(&self) -> Self {
        Self {
            handle: Rc::clone(&self.handle),
        }
    }
}

impl<T> fmt::Debug for Watcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher").field("id", &self.id()).finish()
    }
}

/// Callback fired when an atom loses its last ordinary watcher.
pub struct UnreferencedWatcher<T> {
    handle: Rc<Handle<UnreferencedFn<T>>>,
}

impl<T> UnreferencedWatcher<T> {
    /// Wrap an abandonment callback.
    pub fn new(callback: impl Fn(&Atom<T>) + 'static) -> Self {
        Self {
            handle: Rc::new(Handle {
                id: OnceCell::new(),
                callback: Box::new(callback),
            }),
        }
    }

    /// Id assigned at first registration, if any.
    #[must_use]
    pub fn id(&self) -> Option<WatcherId> {
        self.handle.id.get().copied()
    }
}

impl<T> Clone for UnreferencedWatcher<T> {
    fn clone(&self) -> Self {
        Self {
            handle: Rc::clone(&self.handle),
        }
    }
}

impl<T> fmt::Debug for UnreferencedWatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnreferencedWatcher")
            .field("id", &self.id())
            .finish()
    }
}

/// Shared interior for [`Atom<T>`].
struct AtomInner<T> {
    id: AtomId,
    value: RefCell<T>,
    /// Fixed at construction.
    validator: Box<ValidatorFn<T>>,
    watchers: RefCell<WatcherSet<WatchFn<T>>>,
    unreferenced: RefCell<WatcherSet<UnreferencedFn<T>>>,
}

/// A shared, validated value cell.
///
/// # Example
///
/// ```
/// use canvas_state::atom::{Atom, Watcher};
///
/// let count = Atom::with_validator(0, |next: &i32, _prev: &i32| *next >= 0);
/// let log = Watcher::new(|next: &i32, prev: &i32, _atom: &Atom<i32>| {
///     println!("count changed from {prev} to {next}");
/// });
/// count.watch(&log);
///
/// count.swap(|n| n + 1).unwrap();
/// assert_eq!(count.get(), 1);
/// assert!(count.reset(-1).is_err());
/// assert_eq!(count.get(), 1);
/// ```
pub struct Atom<T> {
    inner: Rc<AtomInner<T>>,
}

impl<T> Clone for Atom<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Atom<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Atom")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("watcher_count", &count(&*self.inner.watchers.borrow()))
            .field(
                "unreferenced_watcher_count",
                &count(&*self.inner.unreferenced.borrow()),
            )
            .finish()
    }
}

impl<T: fmt::Display> fmt::Display for Atom<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atom<{}>", self.inner.value.borrow())
    }
}

fn always_valid<T>(_next: &T, _previous: &T) -> bool {
    true
}

impl<T: Clone + 'static> Atom<T> {
    /// Create an atom that accepts every value.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::from_validator(value, Box::new(always_valid::<T>))
    }

    /// Create an atom guarded by `validator(next, previous)`.
    ///
    /// The initial value is stored as given; only later transitions are
    /// checked.
    #[must_use]
    pub fn with_validator(value: T, validator: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self::from_validator(value, Box::new(validator))
    }

    fn from_validator(value: T, validator: Box<ValidatorFn<T>>) -> Self {
        Self {
            inner: Rc::new(AtomInner {
                id: AtomId::next(),
                value: RefCell::new(value),
                validator,
                watchers: RefCell::new(None),
                unreferenced: RefCell::new(None),
            }),
        }
    }

    /// Process-unique id of this cell.
    #[must_use]
    pub fn id(&self) -> AtomId {
        self.inner.id
    }

    /// Get a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Access the current value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Run the validator against `candidate` and the current value without
    /// changing anything.
    #[must_use]
    pub fn is_valid_value(&self, candidate: &T) -> bool {
        let current = self.inner.value.borrow();
        (self.inner.validator)(candidate, &current)
    }

    /// Transition to `f(current)`.
    ///
    /// `f` receives a snapshot, so it may itself read or write this atom.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidStateTransition`] if the validator rejects the result.
    pub fn swap(&self, f: impl FnOnce(&T) -> T) -> Result<&Self> {
        let current = self.get();
        self.transition(f(&current))
    }

    /// Transition directly to `next`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidStateTransition`] if the validator rejects `next`.
    pub fn reset(&self, next: T) -> Result<&Self> {
        self.transition(next)
    }

    fn transition(&self, next: T) -> Result<&Self> {
        if !self.is_valid_value(&next) {
            return Err(Error::InvalidStateTransition {
                atom: self.inner.id,
                type_name: std::any::type_name::<T>(),
            });
        }

        let watchers = snapshot(&*self.inner.watchers.borrow());
        if watchers.is_empty() {
            drop(self.inner.value.replace(next));
            return Ok(self);
        }

        let previous = self.inner.value.replace(next.clone());
        let _span = trace_span!(
            "atom_transition",
            atom = %self.inner.id,
            watchers = watchers.len()
        )
        .entered();
        for watcher in &watchers {
            (watcher.callback)(&next, &previous, self);
        }
        Ok(self)
    }

    /// Register a change callback. Idempotent per handle.
    pub fn watch(&self, watcher: &Watcher<T>) -> &Self {
        let mut set = self.inner.watchers.borrow_mut();
        let added = add_watcher(&mut *set, &watcher.handle);
        trace!(
            atom = %self.inner.id,
            watcher = %watcher.handle.id(),
            added,
            watchers = count(&*set),
            "watch"
        );
        self
    }

    /// Unregister a change callback. Unknown handles are ignored.
    ///
    /// If this call removes the last watcher, every unreferenced watcher
    /// runs with this atom.
    pub fn unwatch(&self, watcher: &Watcher<T>) -> &Self {
        let (was_referenced, now_unreferenced) = {
            let mut set = self.inner.watchers.borrow_mut();
            let was_referenced = set.is_some();
            let removed = remove_watcher(&mut *set, &watcher.handle);
            trace!(
                atom = %self.inner.id,
                removed,
                watchers = count(&*set),
                "unwatch"
            );
            (was_referenced, set.is_none())
        };

        if was_referenced && now_unreferenced {
            let callbacks = snapshot(&*self.inner.unreferenced.borrow());
            debug!(
                atom = %self.inner.id,
                callbacks = callbacks.len(),
                "atom unreferenced"
            );
            for callback in &callbacks {
                (callback.callback)(self);
            }
        }
        self
    }

    /// Register a callback for the "last watcher removed" edge.
    pub fn watch_unreferenced(&self, watcher: &UnreferencedWatcher<T>) -> &Self {
        add_watcher(&mut *self.inner.unreferenced.borrow_mut(), &watcher.handle);
        self
    }

    /// Unregister an unreferenced callback. Unknown handles are ignored.
    pub fn unwatch_unreferenced(&self, watcher: &UnreferencedWatcher<T>) -> &Self {
        remove_watcher(&mut *self.inner.unreferenced.borrow_mut(), &watcher.handle);
        self
    }

    /// Number of ordinary watchers.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        count(&*self.inner.watchers.borrow())
    }

    /// Number of unreferenced watchers.
    #[must_use]
    pub fn unreferenced_watcher_count(&self) -> usize {
        count(&*self.inner.unreferenced.borrow())
    }

    /// Whether both handles refer to the same cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

// ---------------------------------------------------------------------------
// Free-function surface
// ---------------------------------------------------------------------------

/// Create an atom with an optional validator.
///
/// A validator is any `Fn(&next, &previous) -> bool`; the compiler rejects
/// anything else, so construction cannot fail.
pub fn make_atom<T: Clone + 'static>(
    initial: T,
    validator: Option<Box<dyn Fn(&T, &T) -> bool>>,
) -> Atom<T> {
    match validator {
        Some(validator) => Atom::from_validator(initial, validator),
        None => Atom::new(initial),
    }
}

pub use self::make_atom as atom;

/// Current value of `atom`.
#[must_use]
pub fn deref<T: Clone + 'static>(atom: &Atom<T>) -> T {
    atom.get()
}

/// True only for [`Atom<T>`] handles.
#[must_use]
pub fn is_atom<T: 'static>(thing: &dyn Any) -> bool {
    thing.is::<Atom<T>>()
}

/// See [`Atom::is_valid_value`].
#[must_use]
pub fn is_valid_value<T: Clone + 'static>(atom: &Atom<T>, candidate: &T) -> bool {
    atom.is_valid_value(candidate)
}

/// See [`Atom::swap`].
///
/// # Errors
///
/// [`Error::InvalidStateTransition`] if the validator rejects the result.
pub fn swap<T: Clone + 'static>(atom: &Atom<T>, f: impl FnOnce(&T) -> T) -> Result<&Atom<T>> {
    atom.swap(f)
}

/// See [`Atom::reset`].
///
/// # Errors
///
/// [`Error::InvalidStateTransition`] if the validator rejects `next`.
pub fn reset<T: Clone + 'static>(atom: &Atom<T>, next: T) -> Result<&Atom<T>> {
    atom.reset(next)
}

/// See [`Atom::watch`].
pub fn watch<'a, T: Clone + 'static>(atom: &'a Atom<T>, watcher: &Watcher<T>) -> &'a Atom<T> {
    atom.watch(watcher)
}

/// See [`Atom::unwatch`].
pub fn unwatch<'a, T: Clone + 'static>(atom: &'a Atom<T>, watcher: &Watcher<T>) -> &'a Atom<T> {
    atom.unwatch(watcher)
}

/// See [`Atom::watch_unreferenced`].
pub fn watch_unreferenced<'a, T: Clone + 'static>(
    atom: &'a Atom<T>,
    watcher: &UnreferencedWatcher<T>,
) -> &'a Atom<T> {
    atom.watch_unreferenced(watcher)
}

/// See [`Atom::unwatch_unreferenced`].
pub fn unwatch_unreferenced<'a, T: Clone + 'static>(
    atom: &'a Atom<T>,
    watcher: &UnreferencedWatcher<T>,
) -> &'a Atom<T> {
    atom.unwatch_unreferenced(watcher)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
