//! Stream client error types

use thiserror::Error;

use super::TopicPartition;

/// Result type for stream client operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors surfaced by a stream client or producer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// A blocking poll was interrupted by `Wakeup::wakeup`.
    ///
    /// This is the cooperative shutdown signal, not a failure.
    #[error("poll interrupted by wakeup")]
    Wakeup,

    /// The topic does not exist and cannot be created
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// Operation on a partition that is not assigned to this client
    #[error("partition {0} is not assigned")]
    NotAssigned(TopicPartition),

    /// Transient broker or network failure
    #[error("stream I/O failure: {0}")]
    Io(String),

    /// The client was closed
    #[error("stream client is closed")]
    Closed,
}

impl StreamError {
    /// Create a transient I/O error.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    /// Check if this error is the benign wakeup interruption.
    pub fn is_wakeup(&self) -> bool {
        matches!(self, Self::Wakeup)
    }

    /// Check if this error cannot be cured by retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnknownTopic(_) | Self::NotAssigned(_) | Self::Closed
        )
    }
}
