//! Error types for push queue operations and configuration.

use thiserror::Error;

use super::MAX_QUEUE_CAPACITY;

/// Errors that can occur when pushing a frame.
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// The queue was at capacity and the policy was `ReturnErrorIfFull`.
    #[error("push queue full")]
    QueueFull,
    /// The receiving end of the queue has been dropped or closed.
    #[error("push queue closed")]
    Closed,
}

/// Errors returned when creating an outbound queue.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PushConfigError {
    /// The capacity was zero or exceeded [`MAX_QUEUE_CAPACITY`].
    #[error("invalid capacity {0}; must be between 1 and {max}", max = MAX_QUEUE_CAPACITY)]
    InvalidCapacity(usize),
}
