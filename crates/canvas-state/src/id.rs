#![forbid(unsafe_code)]

//! Process-wide unique identifiers.
//!
//! Every id kind owns one static [`IdGenerator`]. Ids start at 1, increase
//! monotonically, and are never reused for the lifetime of the process, so
//! no reset or teardown exists.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic id source tagged with a display prefix.
#[derive(Debug)]
pub struct IdGenerator {
    prefix: &'static str,
    last: AtomicU64,
}

impl IdGenerator {
    /// Create a generator whose first id will be 1.
    #[must_use]
    pub const fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            last: AtomicU64::new(0),
        }
    }

    /// Allocate the next raw id.
    pub fn next_raw(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Allocate the next id rendered as `"{prefix}-{n}"`.
    pub fn next_label(&self) -> String {
        format!("{}-{}", self.prefix, self.next_raw())
    }

    /// Prefix used when rendering ids from this generator.
    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        self.prefix
    }
}

macro_rules! define_id {
    ($(#[$meta:meta])* $vis:vis $name:ident, $prefix:literal, $source:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        $vis struct $name(u64);

        static $source: IdGenerator = IdGenerator::new($prefix);

        impl $name {
            #[allow(dead_code)]
            pub(crate) fn next() -> Self {
                Self($source.next_raw())
            }

            /// Raw numeric value.
            #[must_use]
            #[allow(dead_code)]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $source.prefix(), self.0)
            }
        }
    };
}

define_id!(
    /// Identity of a watcher handle, assigned on first registration.
    pub WatcherId, "watcher", WATCHER_IDS
);

define_id!(
    /// Identity of an atom, used in log fields and error reports.
    pub AtomId, "atom", ATOM_IDS
);

define_id!(
    /// Identity of an event listener handle.
    pub ListenerId, "listener", LISTENER_IDS
);

define_id!(
    /// Identity of a producer/consumer context.
    pub ContextId, "context", CONTEXT_IDS
);

define_id!(
    /// A single pushed provider frame.
    pub(crate) FrameId, "frame", FRAME_IDS
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_starts_at_one() {
        let ids = IdGenerator::new("test");
        assert_eq!(ids.next_raw(), 1);
        assert_eq!(ids.next_raw(), 2);
        assert_eq!(ids.next_label(), "test-3");
    }

    #[test]
    fn typed_ids_are_monotonic() {
        let a = WatcherId::next();
        let b = WatcherId::next();
        assert!(b > a);
        assert_ne!(a, b);
    }

    #[test]
    fn display_uses_prefix() {
        let id = AtomId::next();
        assert_eq!(id.to_string(), format!("atom-{}", id.get()));
    }
}
