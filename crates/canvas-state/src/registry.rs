#![forbid(unsafe_code)]

//! Named registry of shared values, usually `Rc<Container<_>>`.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Empty name | `register("", ..)` | `Err(InvalidArgument)` |
//! | Duplicate | name already present | `Err(AlreadyRegistered)`, entry kept |
//! | Missing | `resolve`/`unregister` of unknown name | `Err(NotRegistered)` |

use std::collections::HashMap;

use tracing::debug;

use crate::error::{Error, Result};

/// A name paired with its registered value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration<V> {
    pub name: String,
    pub value: V,
}

/// Name-keyed registry preserving registration order.
#[derive(Debug, Clone)]
pub struct Registry<V> {
    entries: HashMap<String, V>,
    order: Vec<String>,
}

impl<V> Default for Registry<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<V: Clone> Registry<V> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` under `name`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for an empty name,
    /// [`Error::AlreadyRegistered`] if the name is taken.
    pub fn register(&mut self, name: impl Into<String>, value: V) -> Result<Registration<V>> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidArgument(
                "registry name must not be empty".into(),
            ));
        }
        if self.entries.contains_key(&name) {
            return Err(Error::AlreadyRegistered(name));
        }
        self.entries.insert(name.clone(), value.clone());
        self.order.push(name.clone());
        debug!(name = %name, entries = self.order.len(), "registered");
        Ok(Registration { name, value })
    }

    /// Look up `name`.
    ///
    /// # Errors
    ///
    /// [`Error::NotRegistered`] if nothing is registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<Registration<V>> {
        self.entries
            .get(name)
            .map(|value| Registration {
                name: name.to_owned(),
                value: value.clone(),
            })
            .ok_or_else(|| Error::NotRegistered(name.to_owned()))
    }

    /// Borrow the value under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&V> {
        self.entries.get(name)
    }

    /// Remove `name`, returning what was registered.
    ///
    /// # Errors
    ///
    /// [`Error::NotRegistered`] if nothing is registered under `name`.
    pub fn unregister(&mut self, name: &str) -> Result<Registration<V>> {
        let value = self
            .entries
            .remove(name)
            .ok_or_else(|| Error::NotRegistered(name.to_owned()))?;
        self.order.retain(|n| n != name);
        debug!(name, entries = self.order.len(), "unregistered");
        Ok(Registration {
            name: name.to_owned(),
            value,
        })
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}
