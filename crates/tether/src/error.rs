//! # Runtime Error Types
//!
//! Game-logic failures ([`ActionError`]) are kept apart from infrastructure
//! failures ([`RuntimeError`], [`ConfigError`]).

use std::path::PathBuf;

use tether_core::PatchError;
use tether_networking::TransportError;
use thiserror::Error;

/// Errors raised by action handlers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// The action is not allowed in the current state.
    #[error("action rejected: {0}")]
    Rejected(String),

    /// The action input has the wrong shape.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ActionError {
    /// Shorthand for [`ActionError::Rejected`].
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    /// Shorthand for [`ActionError::InvalidInput`].
    #[must_use]
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput(reason.into())
    }
}

/// Errors returned by [`crate::Runtime`] operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// No handler is registered under this name.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// The handler returned an error. State is unchanged.
    #[error("action {name} failed: {source}")]
    Action {
        /// Action name.
        name: String,
        /// Handler error.
        #[source]
        source: ActionError,
    },

    /// Forwarding the action to the host failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A patch could not be applied.
    #[error(transparent)]
    Patch(#[from] PatchError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors loading a session configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The TOML is malformed or has wrong types.
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
