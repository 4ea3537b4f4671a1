//! Error type shared by all index operations.

use std::io;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Failures reported by index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The forest is already built; items can no longer be added.
    #[error("index is already built")]
    AlreadyBuilt,
    /// The operation requires a built forest.
    #[error("index is not built")]
    NotBuilt,
    /// `build` was called before any item was added.
    #[error("cannot build an index with no items")]
    NoItems,
    /// A saved file's vector width does not match this index.
    #[error("dimension mismatch: index expects {expected} words, file has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// A vector had the wrong number of words.
    #[error("bad vector length: expected {expected} words, got {actual}")]
    BadVector { expected: usize, actual: usize },
    /// Mutation was attempted on an index backed by a read-only mapping.
    #[error("index is backed by a read-only mapping")]
    ReadOnly,
    /// The node region could not be grown.
    #[error("out of memory growing node storage")]
    OutOfMemory,
    /// An underlying filesystem or mapping call failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}
