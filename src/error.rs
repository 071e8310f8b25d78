// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the replication client.
//!
//! Errors are categorized by their source (transport, pipe, discovery, the
//! replicated structure) and carry enough context to debug a failed session.
//! Every error is `Clone` so a single failure can be broadcast to all `error`
//! subscribers and still be returned to the caller of `connect()`.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `AlreadyConnecting` | No | `connect()` while an attempt is in flight |
//! | `AlreadyConnected` | No | `connect()` on a live connection |
//! | `Destroyed` | No | `connect()` on a torn-down client |
//! | `Transport` | Yes | Refused connection, socket error, dropped link |
//! | `ConnectTimeout` | Yes | Transport did not open in time |
//! | `Pipe` | Yes | Failure while bridging transport and replication stream |
//! | `Discovery` | Yes | Peer discovery failure (non-fatal) |
//! | `ConnectionClosed` | Yes | Transport closed before the handshake completed |
//! | `SessionClosed` | Yes | Replication session ended before the handshake |
//! | `Structure` | No | The local or remote structure rejected an operation |
//! | `Handshake` | No | Handshake carried unusable data |
//! | `InvalidKey` | No | Key of the wrong length or bad hex |
//! | `Config` / `Url` | No | Invalid endpoint configuration |
//! | `Internal` | No | Unexpected internal error |
//!
//! # Usage Errors
//!
//! The first three variants are precondition violations reported through the
//! `connect()` result. They never change client state. Use
//! [`ClientError::is_usage_error()`] to tell them apart from runtime failures.

use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur while connecting or replicating.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// A connection attempt is already in flight.
    #[error("Client is already connecting")]
    AlreadyConnecting,

    /// The client already holds a live connection.
    #[error("Client is already connected")]
    AlreadyConnected,

    /// The client was torn down and cannot be reused.
    #[error("Client is destroyed")]
    Destroyed,

    /// Transport failure: refused connection, socket error or explicit destroy.
    #[error("Transport error ({url}): {message}")]
    Transport { url: String, message: String },

    /// The transport did not open within the configured connect timeout.
    #[error("Transport to {url} did not open within {timeout_ms}ms")]
    ConnectTimeout { url: String, timeout_ms: u64 },

    /// Failure while pumping bytes between the transport and the replication stream.
    #[error("Pipe error: {0}")]
    Pipe(String),

    /// Peer discovery failure. Forwarded, never fatal to the connection.
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// The replicated structure failed an operation (`ready`, `replicate`, `close`, ...).
    #[error("Structure error ({operation}): {message}")]
    Structure { operation: String, message: String },

    /// The handshake completed but carried unusable data.
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// The replication session ended before its handshake completed.
    #[error("Replication session closed before handshake")]
    SessionClosed,

    /// The transport closed before the connection was established.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A key had the wrong length or was not valid hex.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Endpoint URL could not be parsed or joined.
    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),

    /// Catch-all for errors that shouldn't happen.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Create a transport error for a URL.
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a structure error for an operation.
    pub fn structure(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Structure {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retryable with a fresh client.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::ConnectTimeout { .. } => true,
            Self::Pipe(_) => true,
            Self::Discovery(_) => true,
            Self::ConnectionClosed => true,
            Self::SessionClosed => true,
            Self::AlreadyConnecting => false,
            Self::AlreadyConnected => false,
            Self::Destroyed => false,
            Self::Structure { .. } => false,
            Self::Handshake(_) => false,
            Self::InvalidKey(_) => false,
            Self::Config(_) => false,
            Self::Url(_) => false,
            Self::Internal(_) => false,
        }
    }

    /// Check if this error is a `connect()` precondition violation.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::AlreadyConnecting | Self::AlreadyConnected | Self::Destroyed
        )
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyConnecting => "already_connecting",
            Self::AlreadyConnected => "already_connected",
            Self::Destroyed => "destroyed",
            Self::Transport { .. } => "transport",
            Self::ConnectTimeout { .. } => "connect_timeout",
            Self::Pipe(_) => "pipe",
            Self::Discovery(_) => "discovery",
            Self::Structure { .. } => "structure",
            Self::Handshake(_) => "handshake",
            Self::SessionClosed => "session_closed",
            Self::ConnectionClosed => "connection_closed",
            Self::InvalidKey(_) => "invalid_key",
            Self::Config(_) => "config",
            Self::Url(_) => "url",
            Self::Internal(_) => "internal",
        }
    }
}
