#![forbid(unsafe_code)]

//! Validated reactive state cells and the containers that publish them.
//!
//! # Role
//! `canvas-state` is the state layer for canvas views. Views read and write
//! a [`Container`] through `get_state`/`set_state` and listen for its
//! `created`/`changed` events; they never touch atom internals.
//!
//! # Primary pieces
//! - **[`Atom`]**: a shared value cell with a validator, change watchers, and
//!   "unreferenced" watchers that fire when the last watcher leaves.
//! - **[`Container`]**: a named wrapper around one atom that turns each
//!   transition into a [`StateEvent`] and hands the atom to nested readers
//!   through a [`Producer`]/[`Consumer`] pair.
//! - **[`EventTarget`]**: named listener tables with identity-based
//!   registration.
//! - **[`Registry`]**: name-keyed lookup for shared containers.
//!
//! # Execution model
//! Everything is single-threaded and synchronous. Handles are `Rc`-based,
//! transitions apply in call order, and every notification a transition
//! triggers has finished by the time the call returns.
//!
//! # Example
//!
//! ```
//! use canvas_state::{Container, EventDetail, EventKind, Listener, StateEvent};
//!
//! let container = Container::new("toolbar", 0u32);
//! let listener = Listener::new(|event: &StateEvent<u32>| {
//!     if let EventDetail::Changed { state, previous_state } = event.detail() {
//!         println!("{previous_state} -> {state}");
//!     }
//! });
//! container.add_event_listener(EventKind::Changed, &listener);
//!
//! container.update_state(|n| n + 1).unwrap();
//! assert_eq!(container.get_state(), 1);
//! ```

pub mod atom;
pub mod container;
pub mod context;
pub mod error;
pub mod event;
pub mod id;
pub mod registry;

pub use atom::{Atom, UnreferencedWatcher, Watcher};
pub use container::{
    Container, ContainerBuilder, EventDetail, EventKind, EventNames, StateEvent, StateUpdate,
};
pub use context::{Consumer, Producer, ProvideGuard, create_context};
pub use error::{Error, Result};
pub use event::{Event, EventTarget, Listener};
pub use id::{AtomId, ContextId, IdGenerator, ListenerId, WatcherId};
pub use registry::{Registration, Registry};
