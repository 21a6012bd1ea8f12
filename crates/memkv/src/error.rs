use blockalloc::BlockError;
use boxalloc::BoxError;
use std::fmt;
use std::io;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MemKvError>;

/// Which part of the pool ran out of space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// The pool cannot even hold the header.
    Header,
    /// The key region has no free trie node.
    Nodes,
    /// The value region has no block large enough.
    Values,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Header => f.write_str("pool is smaller than its header"),
            Resource::Nodes => f.write_str("trie node region exhausted"),
            Resource::Values => f.write_str("value region exhausted"),
        }
    }
}

/// Errors returned by pool and trie operations.
///
/// Every failure is reported as a value; no operation retries internally.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemKvError {
    /// Empty pool or key, bad alphabet size, or all-zero region weights.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("out of memory: {0}")]
    OutOfMemory(Resource),

    /// `init` found the magic marker already in place.
    #[error("pool is already initialized")]
    AlreadyInitialized,

    /// `open` found no magic marker.
    #[error("pool is not initialized")]
    NotInitialized,

    #[error("key not found")]
    KeyNotFound,

    /// An enumeration prefix reaches the configured key depth limit.
    #[error("prefix is too long: {len} bytes (limit {limit})")]
    PrefixTooLong { len: usize, limit: usize },

    /// A key byte has no index below the pool's alphabet size.
    #[error("byte {byte:#04x} at position {position} is outside the {alphabet_size}-symbol alphabet")]
    SymbolOutOfRange {
        byte: u8,
        position: usize,
        alphabet_size: u16,
    },

    /// The alphabet passed to `open` does not match the one the pool was built with.
    #[error("alphabet has {alphabet} symbols but the pool was built for {pool}")]
    AlphabetMismatch { pool: u16, alphabet: u16 },

    /// Header or allocator metadata is inconsistent.
    #[error("corrupt pool: {0}")]
    Corrupt(String),
}

impl From<io::Error> for MemKvError {
    fn from(e: io::Error) -> Self {
        MemKvError::Corrupt(e.to_string())
    }
}

impl From<BlockError> for MemKvError {
    fn from(e: BlockError) -> Self {
        MemKvError::Corrupt(e.to_string())
    }
}

impl From<BoxError> for MemKvError {
    fn from(e: BoxError) -> Self {
        match e {
            BoxError::Exhausted { .. } => MemKvError::OutOfMemory(Resource::Values),
            other => MemKvError::Corrupt(other.to_string()),
        }
    }
}
