//! Error types for FileKV.
//!
//! Every cache operation returns [`Result<T>`]. The variants mirror the
//! failure classes a caller can act on: a key that is missing or expired,
//! a counter operation on the wrong kind of value, filesystem trouble, and
//! envelopes that cannot be decoded.

use thiserror::Error;

/// Errors produced by the cache and its backends.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The key does not exist, or its entry has expired
    #[error("key not found: {0}")]
    NotFound(String),

    /// Counter operation on a value that is not an integer
    #[error("value of key '{0}' is not an integer")]
    TypeMismatch(String),

    /// Decrement of an unsigned counter that is already zero
    #[error("value of key '{0}' cannot be decremented below zero")]
    Underflow(String),

    /// Counter would leave the range of its integer type
    #[error("value of key '{0}' would overflow")]
    Overflow(String),

    /// Filesystem read, write or permission failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Corrupt or truncated entry envelope
    #[error("decode error: {0}")]
    Decode(String),

    /// Stored value does not have the shape a hash operation expects
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Strict unflattening met a value it could not parse
    #[error("cannot parse field '{field}' from {value:?}")]
    FieldParse { field: String, value: String },

    /// Caller passed an unusable argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No adapter registered under this name
    #[error("unknown adapter '{0}'")]
    UnknownAdapter(String),

    /// An adapter with this name is already registered
    #[error("adapter '{0}' is already registered")]
    DuplicateAdapter(String),

    /// Options that cannot be applied
    #[error("configuration error: {0}")]
    Config(String),
}

impl CacheError {
    /// Returns true if this error means the key is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }
}

impl From<bincode::Error> for CacheError {
    fn from(err: bincode::Error) -> Self {
        CacheError::Decode(err.to_string())
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
