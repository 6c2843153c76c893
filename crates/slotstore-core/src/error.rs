//! Error types for the slotstore engine

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the slotstore Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the id allocator, the window pool and the record stores
#[derive(Error, Debug)]
pub enum Error {
    /// The id file is missing, truncated, or was not closed cleanly.
    /// The owning store must be rebuilt before it can hand out ids again.
    #[error("Corrupt id allocator {path}: {reason}")]
    CorruptAllocator {
        /// Path of the id file
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// The id space is exhausted
    #[error("Id capacity exceeded: high id {high_id} reached maximum {max_id}")]
    CapacityExceeded {
        /// Current high id
        high_id: u64,
        /// Largest id the on-disk format can represent
        max_id: u64,
    },

    /// Freeing an id that was never handed out
    #[error("Invalid id {id}: outside [0, {high_id})")]
    InvalidId {
        /// Offending id
        id: u64,
        /// High id at the time of the call
        high_id: u64,
    },

    /// Acquiring a window beyond the high id outside recovery mode
    #[error("Position {position} out of range in {store} (high id {high_id})")]
    OutOfRange {
        /// Store name
        store: String,
        /// Requested record id
        position: u64,
        /// High id at the time of the call
        high_id: u64,
    },

    /// Reading a record whose slot is not in use
    #[error("Record {id} in {store} is not in use")]
    NotInUse {
        /// Store name
        store: String,
        /// Record id
        id: u64,
    },

    /// The store was opened after an unclean shutdown and has not been rebuilt
    #[error("Store {0} is not valid, make_store_ok() must run first")]
    StoreNotValid(String),

    /// Mapping a brick failed. Absorbed by the window pool, never returned by acquire.
    #[error("Unable to map {len} bytes at offset {offset}: {source}")]
    MappingUnavailable {
        /// Byte offset of the brick
        offset: u64,
        /// Brick length in bytes
        len: usize,
        /// Underlying mmap failure
        #[source]
        source: std::io::Error,
    },

    /// I/O failure while touching a store file
    #[error("I/O error in {store} at position {position}: {source}")]
    Io {
        /// Store (or id file) name
        store: String,
        /// Record id or byte offset involved
        position: u64,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// Plain I/O errors raised outside any particular record position
    #[error("I/O error: {0}")]
    RawIo(#[from] std::io::Error),

    /// The allocator was closed and can no longer be used
    #[error("Id allocator {0} is closed")]
    ClosedAllocator(PathBuf),

    /// `create_store` on a path that already exists
    #[error("Store file already exists: {0}")]
    AlreadyExists(PathBuf),

    /// The store file is locked by another handle
    #[error("Store file is locked by another process: {0}")]
    Locked(PathBuf),

    /// Invalid argument supplied by the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Bytes on disk that cannot be decoded
    #[error("Format error: {0}")]
    Format(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage errors that fit none of the above
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Wrap an I/O error with the store name and position it happened at
    pub fn io(store: impl Into<String>, position: u64, source: std::io::Error) -> Self {
        Self::Io {
            store: store.into(),
            position,
            source,
        }
    }

    /// Create a corrupt-allocator error
    pub fn corrupt_allocator(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptAllocator {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a format error
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Create an invalid-argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// True for failures the caller may see after an unclean shutdown and
    /// that are cured by `make_store_ok()`
    pub fn requires_rebuild(&self) -> bool {
        matches!(self, Self::CorruptAllocator { .. } | Self::StoreNotValid(_))
    }
}
