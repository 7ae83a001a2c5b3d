//! # Patch Error Types
//!
//! All errors that can occur while applying a patch to a state tree.
//! Any of these on a client means the local mirror has diverged from the host.

use thiserror::Error;

/// Errors that can occur when applying a [`crate::Patch`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// The patch path was empty. The root is replaced through a snapshot, never patched.
    #[error("patch path is empty; the root can only be replaced by a snapshot")]
    EmptyPath,

    /// A path segment walked into a scalar.
    #[error("value at {path:?} is not a container")]
    NotAContainer {
        /// Path prefix that resolved to a scalar.
        path: Vec<String>,
    },

    /// A segment addressing an array was not a valid index.
    #[error("segment {segment:?} at {path:?} is not an array index")]
    InvalidIndex {
        /// Path prefix of the array.
        path: Vec<String>,
        /// The offending segment.
        segment: String,
    },

    /// An array index fell outside the array.
    #[error("index {index} out of bounds at {path:?} (len {len})")]
    IndexOutOfBounds {
        /// Path prefix of the array.
        path: Vec<String>,
        /// Requested index.
        index: usize,
        /// Array length at the time of application.
        len: usize,
    },

    /// An `add` or `replace` carried no value.
    #[error("patch at {path:?} requires a value")]
    MissingValue {
        /// Full patch path.
        path: Vec<String>,
    },
}

/// Result type for patch operations.
pub type PatchResult<T> = Result<T, PatchError>;
