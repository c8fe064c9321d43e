//! Error types for the AeroView environment abstraction.

use thiserror::Error;

/// Errors that can occur while talking to the telemetry transport.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The transport refused or failed the connection attempt
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// An operation required an established connection
    #[error("Transport not connected")]
    NotConnected,

    /// A channel was read or declared that the transport does not know
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),
}

impl EnvError {
    /// Creates a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    /// Creates an unknown-channel error.
    pub fn unknown_channel(key: impl std::fmt::Display) -> Self {
        Self::UnknownChannel(key.to_string())
    }
}
