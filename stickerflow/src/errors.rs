//! Error types for the stickerflow pipeline.
//!
//! The taxonomy separates expected, user-facing outcomes (bad input, a
//! concurrent session) from operational faults (exhausted retries, timeouts)
//! so callers can pick a message and a log level without inspecting strings.

use crate::core::UserId;
use std::time::Duration;
use thiserror::Error;

/// The main error type for a pipeline run.
#[derive(Debug, Error)]
pub enum StickerflowError {
    /// The input document was malformed.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A remote call failed outside of any retry loop.
    #[error("{0}")]
    TransientRemote(#[from] TransientRemoteError),

    /// A named stage failed after exhausting its retries.
    #[error("{0}")]
    Stage(#[from] StageError),

    /// A scheduler batch did not finish in time.
    #[error("{0}")]
    Timeout(#[from] TimeoutError),

    /// Another run is already active for this user.
    #[error("{0}")]
    ConcurrentSession(#[from] ConcurrentSessionError),
}

impl StickerflowError {
    /// Returns the message shown to the chat user.
    ///
    /// Only validation messages are passed through verbatim; every fault is
    /// reduced to a generic message so internal diagnostics never leak.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(err) => format!("Bad input: {}", err.message),
            Self::ConcurrentSession(_) => {
                "A sticker set is already being processed for you. \
                 Please wait until it finishes."
                    .to_string()
            }
            Self::TransientRemote(_) | Self::Stage(_) | Self::Timeout(_) => {
                "Something went wrong while building your sticker set. \
                 Please try again later."
                    .to_string()
            }
        }
    }

    /// Returns true if the error is an operational fault worth logging as such.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            Self::TransientRemote(_) | Self::Stage(_) | Self::Timeout(_)
        )
    }

    /// Returns the underlying diagnostic, for the operational log only.
    #[must_use]
    pub fn cause(&self) -> Option<&str> {
        match self {
            Self::Stage(err) => err.cause.as_deref(),
            Self::TransientRemote(err) => Some(&err.message),
            _ => None,
        }
    }

    /// Returns a short machine-readable kind name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::TransientRemote(_) => "transient_remote",
            Self::Stage(_) => "stage",
            Self::Timeout(_) => "timeout",
            Self::ConcurrentSession(_) => "concurrent_session",
        }
    }
}

/// Error raised when the input document is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// Human-readable description of the problem.
    pub message: String,
    /// The offending field, when known.
    pub field: Option<String>,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    /// Sets the offending field.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// A network or service fault reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation}: {message}")]
pub struct TransientRemoteError {
    /// What the collaborator was doing.
    pub operation: String,
    /// The underlying fault.
    pub message: String,
}

impl TransientRemoteError {
    /// Creates a new transient remote error.
    #[must_use]
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// A named pipeline stage failed.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' failed")]
pub struct StageError {
    /// The stage that failed.
    pub stage: String,
    /// The underlying cause, for the operational log only.
    pub cause: Option<String>,
}

impl StageError {
    /// Creates a new stage error.
    #[must_use]
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            cause: None,
        }
    }

    /// Sets the underlying cause.
    #[must_use]
    pub fn with_cause(mut self, cause: impl ToString) -> Self {
        self.cause = Some(cause.to_string());
        self
    }
}

/// A scheduler batch exceeded its deadline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Batch '{batch}' timed out after {}ms", .timeout.as_millis())]
pub struct TimeoutError {
    /// The batch label.
    pub batch: String,
    /// The configured deadline.
    pub timeout: Duration,
}

impl TimeoutError {
    /// Creates a new timeout error.
    #[must_use]
    pub fn new(batch: impl Into<String>, timeout: Duration) -> Self {
        Self {
            batch: batch.into(),
            timeout,
        }
    }
}

/// A second run was rejected because one is already active for the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("A session is already active for user {user_id}")]
pub struct ConcurrentSessionError {
    /// The rejected user.
    pub user_id: UserId,
}

impl ConcurrentSessionError {
    /// Creates a new concurrent session error.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}

/// Every attempt of a retried operation failed.
///
/// The message names the operation's purpose, never the raw fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to {operation} after {attempts} attempt(s)")]
pub struct RetryExhaustedError {
    /// What the operation was for.
    pub operation: String,
    /// How many attempts were made.
    pub attempts: u32,
}

impl RetryExhaustedError {
    /// Creates a new retry exhausted error.
    #[must_use]
    pub fn new(operation: impl Into<String>, attempts: u32) -> Self {
        Self {
            operation: operation.into(),
            attempts,
        }
    }
}

/// Outcome of a failed scheduler batch.
#[derive(Debug, Clone, Error)]
pub enum BatchError<E> {
    /// A task returned an error; the first one observed wins.
    #[error("Task failed: {0}")]
    Task(E),

    /// The batch deadline elapsed.
    #[error("{0}")]
    Timeout(TimeoutError),

    /// A task panicked.
    #[error("Task panicked: {0}")]
    Panicked(String),
}

impl<E> BatchError<E> {
    /// Returns true if the batch failed because of its deadline.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Failure while normalizing an image payload.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The payload could not be decoded.
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// The normalized image could not be encoded.
    #[error("Failed to encode image: {0}")]
    Encode(String),
}

/// Failure while obtaining the sticker set description.
#[derive(Debug, Clone, Error)]
pub enum SpecFetchError {
    /// The document was malformed.
    #[error("{0}")]
    Invalid(#[from] ValidationError),

    /// The document could not be retrieved.
    #[error("{0}")]
    Remote(#[from] TransientRemoteError),
}

impl From<SpecFetchError> for StickerflowError {
    fn from(err: SpecFetchError) -> Self {
        match err {
            SpecFetchError::Invalid(err) => Self::Validation(err),
            SpecFetchError::Remote(err) => Self::TransientRemote(err),
        }
    }
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of range.
    #[error("Invalid configuration for '{field}': {reason}")]
    Invalid {
        /// The offending field path.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The configuration could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration file could not be read.
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// A global tracing subscriber is already installed.
    #[error("Failed to initialise logging: {0}")]
    Logging(String),
}

impl ConfigError {
    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
