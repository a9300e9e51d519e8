//! Error types shared by the invite and join paths

use crate::config::ConfigError;
use crate::core_channel::ChannelError;
use std::future::Future;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for invitation operations
pub type InviteResult<T> = Result<T, InviteError>;

#[derive(Debug, Error)]
pub enum InviteError {
    /// Malformed URL, invalid identifier, oversized line
    #[error("Invalid input: {0}")]
    Input(String),

    /// Fingerprint mismatch, protocol version mismatch, bad ACK
    #[error("Trust failure: {0}")]
    Trust(String),

    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// A peer tried to write something it is not allowed to
    #[error("Policy violation: {0}")]
    Policy(String),

    #[error("Secure channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Key error: {0}")]
    Key(String),

    #[error("Timed out while {0}")]
    Timeout(String),

    #[error("Invitation cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl InviteError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        InviteError::Io { context: context.into(), source }
    }

    /// Whether this failure may indicate an active attack
    pub fn is_trust_failure(&self) -> bool {
        matches!(self, InviteError::Trust(_))
    }
}

/// Attach a human-readable context to `std::io` failures
pub trait IoContext<T> {
    fn context<C: Into<String>>(self, context: impl FnOnce() -> C) -> InviteResult<T>;
}

impl<T> IoContext<T> for Result<T, io::Error> {
    fn context<C: Into<String>>(self, context: impl FnOnce() -> C) -> InviteResult<T> {
        self.map_err(|e| InviteError::io(context(), e))
    }
}

/// Run `fut`, failing with [`InviteError::Timeout`] after `limit`
pub async fn timed<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = InviteResult<T>>,
) -> InviteResult<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| InviteError::Timeout(what.to_string()))?
}
