//! Error types for TricolorIPC

use std::io;
use thiserror::Error;

/// Result type for channel operations
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Errors that can occur while creating, attaching to or using a channel
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Failed to create shared memory
    #[error("Failed to create shared memory '{name}': {source}")]
    ShmCreate {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Failed to open shared memory
    #[error("Failed to open shared memory '{name}': {source}")]
    ShmOpen {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Failed to remove shared memory
    #[error("Failed to unlink shared memory '{name}': {source}")]
    ShmUnlink {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Failed to map memory
    #[error("Failed to map memory: {0}")]
    Mmap(#[source] io::Error),

    /// Failed to unmap memory
    #[error("Failed to unmap memory: {0}")]
    Munmap(#[source] io::Error),

    /// Failed to truncate shared memory
    #[error("Failed to set shared memory size: {0}")]
    Truncate(#[source] io::Error),

    /// A named resource survived a previous run
    #[error("'{name}' already exists; remove it from /dev/shm if a previous run crashed")]
    AlreadyExists { name: String },

    /// Failed to create or open a named semaphore
    #[error("Failed to open semaphore '{name}': {source}")]
    SemOpen {
        name: String,
        #[source]
        source: io::Error,
    },

    /// A wait on a semaphore failed for a reason other than a signal
    #[error("Waiting on the {role} semaphore failed: {source}")]
    SemWait {
        role: &'static str,
        #[source]
        source: io::Error,
    },

    /// Releasing a permit failed
    #[error("Posting the {role} semaphore failed: {source}")]
    SemPost {
        role: &'static str,
        #[source]
        source: io::Error,
    },

    /// Reading a semaphore's count failed
    #[error("Reading the {role} semaphore failed: {source}")]
    SemValue {
        role: &'static str,
        #[source]
        source: io::Error,
    },

    /// Closing a semaphore handle failed
    #[error("Failed to close semaphore '{name}': {source}")]
    SemClose {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Removing a semaphore name failed
    #[error("Failed to unlink semaphore '{name}': {source}")]
    SemUnlink {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Region was not laid out by this crate
    #[error("Invalid channel magic number: expected 0x{expected:08X}, got 0x{got:08X}")]
    InvalidMagic { expected: u32, got: u32 },

    /// Region was laid out by an incompatible version
    #[error("Unsupported channel version: expected {expected}, got {got}")]
    VersionMismatch { expected: u32, got: u32 },

    /// Installing the stop signal handler failed
    #[error("Failed to install signal handler: {0}")]
    Signal(#[source] io::Error),

    /// Writing a result line failed
    #[error("Failed to write output: {0}")]
    Output(#[source] io::Error),

    /// Namespace too long
    #[error("Namespace too long: max {max} chars, got {got}")]
    NamespaceTooLong { max: usize, got: usize },

    /// Namespace contains characters POSIX names cannot carry
    #[error("Invalid namespace '{0}': only ASCII letters, digits, '_' and '-' are allowed")]
    InvalidName(String),
}

impl ChannelError {
    /// Whether the error means a named resource does not exist (yet)
    pub fn is_not_found(&self) -> bool {
        match self {
            ChannelError::ShmOpen { source, .. } | ChannelError::SemOpen { source, .. } => {
                source.kind() == io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}

/// Error produced when a command-line edge token is malformed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseEdgeError {
    #[error("'{0}' is not an edge; expected two non-negative integers joined by '-', e.g. 0-1")]
    Format(String),

    #[error("node id in '{0}' is too large")]
    Overflow(String),
}
