//! Error types for the SQS worker
//!
//! Errors fall into two groups:
//! - **Fatal**: configuration problems and client construction failures that
//!   stop a handler from starting at all
//! - **Per-message**: finalization failures that abort one message only and
//!   leave it to the queue's visibility timeout

use thiserror::Error;

/// Configuration error, raised at registration or while loading from the environment
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Either queue_name or queue_url is required")]
    MissingQueueIdentity,

    #[error("Only one of queue_name ({queue_name}) or queue_url ({queue_url}) may be set")]
    AmbiguousQueueIdentity {
        queue_name: String,
        queue_url: String,
    },

    #[error("Environment variable '{0}' is required but not set")]
    MissingEnvVar(String),

    #[error("Failed to parse environment variable '{key}': {details}")]
    ParseError { key: String, details: String },

    #[error("Invalid value for {field}: {details}")]
    InvalidValue { field: &'static str, details: String },
}

/// Severity of a worker error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// The scheduler cannot run
    Fatal,
    /// Only the current message is affected
    Message,
    /// Transient queue failure, the next poll may succeed
    Transient,
}

/// SQS worker errors
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A queue API call failed
    #[error("SQS {operation} failed: {message}")]
    Queue {
        operation: &'static str,
        message: String,
    },

    /// The queue client could not be constructed
    #[error("Failed to create SQS session: {0}")]
    Session(String),

    #[error("Queue '{0}' could not be resolved to a URL")]
    QueueNotFound(String),

    #[error("Invalid redrive policy: {0}")]
    InvalidRedrivePolicy(String),

    #[error("No dead-letter queue configured for {queue_url}")]
    DeadLetterNotConfigured { queue_url: String },

    /// Finalization found no receipt handle. `subscriber` carries a failed
    /// `missing_receipt_handle` subscriber, if any.
    #[error("Message {message_id} has no receipt handle")]
    MissingReceiptHandle {
        message_id: String,
        #[source]
        subscriber: Option<crate::signal::SignalError>,
    },

    #[error("No handler registered under '{0}'")]
    HandlerNotFound(String),

    #[error(transparent)]
    Signal(#[from] crate::signal::SignalError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkerError {
    /// Create a queue API error from any displayable cause
    pub fn queue(operation: &'static str, cause: impl std::fmt::Display) -> Self {
        WorkerError::Queue {
            operation,
            message: cause.to_string(),
        }
    }

    /// Get the error scope
    pub fn scope(&self) -> ErrorScope {
        match self {
            WorkerError::Config(_) => ErrorScope::Fatal,
            WorkerError::Session(_) => ErrorScope::Fatal,
            WorkerError::QueueNotFound(_) => ErrorScope::Fatal,
            WorkerError::InvalidRedrivePolicy(_) => ErrorScope::Fatal,
            WorkerError::HandlerNotFound(_) => ErrorScope::Fatal,
            WorkerError::Queue { .. } => ErrorScope::Transient,
            WorkerError::DeadLetterNotConfigured { .. } => ErrorScope::Message,
            WorkerError::MissingReceiptHandle { .. } => ErrorScope::Message,
            WorkerError::Signal(_) => ErrorScope::Message,
            WorkerError::Internal(_) => ErrorScope::Message,
        }
    }

    /// Whether the scheduler must stop on this error
    pub fn is_fatal(&self) -> bool {
        self.scope() == ErrorScope::Fatal
    }
}
