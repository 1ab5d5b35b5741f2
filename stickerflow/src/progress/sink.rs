//! Built-in [`ProgressSink`] implementations.

use crate::core::UserId;
use crate::errors::TransientRemoteError;
use crate::ports::ProgressSink;
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, Level};

/// Discards every message.
///
/// Used when no chat transport is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgressSink;

#[async_trait]
impl ProgressSink for NoOpProgressSink {
    async fn notify(&self, _user: UserId, _message: &str) -> Result<(), TransientRemoteError> {
        Ok(())
    }
}

/// Writes progress messages to the tracing log.
#[derive(Debug, Clone)]
pub struct LoggingProgressSink {
    level: Level,
}

impl Default for LoggingProgressSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingProgressSink {
    /// Creates a sink logging at `level`. Anything other than DEBUG logs at INFO.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

#[async_trait]
impl ProgressSink for LoggingProgressSink {
    async fn notify(&self, user: UserId, message: &str) -> Result<(), TransientRemoteError> {
        if self.level == Level::DEBUG {
            debug!(user_id = %user, "Progress: {}", message);
        } else {
            info!(user_id = %user, "Progress: {}", message);
        }
        Ok(())
    }
}

/// Records every message, for tests and previews.
#[derive(Debug, Default)]
pub struct CollectingProgressSink {
    messages: RwLock<Vec<(UserId, String)>>,
}

impl CollectingProgressSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded `(user, message)` pair.
    #[must_use]
    pub fn messages(&self) -> Vec<(UserId, String)> {
        self.messages.read().clone()
    }

    /// Returns the messages sent to `user`, in order.
    #[must_use]
    pub fn messages_for(&self, user: UserId) -> Vec<String> {
        self.messages
            .read()
            .iter()
            .filter(|(u, _)| *u == user)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Returns the most recent message.
    #[must_use]
    pub fn last(&self) -> Option<String> {
        self.messages.read().last().map(|(_, m)| m.clone())
    }

    /// Number of recorded messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    /// Forgets every recorded message.
    pub fn clear(&self) {
        self.messages.write().clear();
    }
}

#[async_trait]
impl ProgressSink for CollectingProgressSink {
    async fn notify(&self, user: UserId, message: &str) -> Result<(), TransientRemoteError> {
        self.messages.write().push((user, message.to_string()));
        Ok(())
    }
}
