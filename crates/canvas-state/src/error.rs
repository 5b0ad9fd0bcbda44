#![forbid(unsafe_code)]

//! Error type shared by atoms, containers, and the registry.
//!
//! Errors are returned to the immediate caller and never logged here.

use std::fmt;

use crate::id::AtomId;

/// Errors from state operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An argument was rejected at runtime.
    InvalidArgument(String),
    /// A candidate value failed the atom's validator. The atom is unchanged.
    InvalidStateTransition {
        atom: AtomId,
        type_name: &'static str,
    },
    /// No registry entry exists under the name.
    NotRegistered(String),
    /// A registry entry already exists under the name.
    AlreadyRegistered(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::InvalidStateTransition { atom, type_name } => {
                write!(f, "invalid state transition rejected by validator of {atom} ({type_name})")
            }
            Self::NotRegistered(name) => write!(f, "nothing registered under '{name}'"),
            Self::AlreadyRegistered(name) => write!(f, "'{name}' is already registered"),
        }
    }
}

impl std::error::Error for Error {}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
