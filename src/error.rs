use std::io;
use thiserror::Error;

/// Error type for jobpool operations.
#[derive(Error, Debug)]
pub enum PoolError {
    /// IO error, raised when a worker or streamer thread cannot be spawned.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A third-party pool backend failed to build.
    #[error("Backend error: {0}")]
    Backend(String),

    /// A pool kind name was not recognised.
    #[error("Invalid pool kind: {0}. Must be 'work-stealing', 'shared-queue' or 'rayon'.")]
    InvalidPoolKind(String),

    /// The task panicked while running on a worker.
    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    /// The task was discarded before it produced a result.
    #[error("Task was dropped before completion")]
    TaskDropped,

    /// A workload produced a different result than expected.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    Checksum {
        /// Expected value.
        expected: u64,
        /// Value actually computed.
        actual: u64,
    },
}

/// Result type alias for jobpool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
