//! Error types for the notification layer

use thiserror::Error;

/// Failure to build or route a notification
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),
}

/// Failure to hand a message to a single subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("Channel full: subscriber too slow to consume messages")]
    Full,

    #[error("Channel closed: subscriber disconnected")]
    Closed,

    #[error("Subscriber no longer registered")]
    Gone,
}
