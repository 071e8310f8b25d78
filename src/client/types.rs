// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Client state types.
//!
//! # State Transitions
//!
//! ```text
//!            connect()              transport open
//!   Idle ─────────────► Connecting ───────────────► Connected
//!    │                      │                           │
//!    │ close()              │ open failed / close()     │ transport close
//!    ↓                      ↓                           ↓
//!    └────────────────► Destroyed ◄─────────────────────┘
//! ```
//!
//! # State Descriptions
//!
//! - **Idle**: Initial state. No transport exists.
//! - **Connecting**: `connect()` accepted, transport is being opened.
//! - **Connected**: Transport open, replication stream piped over it.
//! - **Destroyed**: Teardown ran. Terminal; the client cannot be reused.

use crate::session::ReplicationSession;
use crate::structure::Replicable;
use crate::transport::TransportHandle;
use std::fmt;
use std::sync::Arc;

/// State of a replication client.
///
/// See module docs for the state transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Created, no connection attempted.
    Idle,

    /// A connection attempt is in flight.
    Connecting,

    /// Transport is open. The handshake may still be pending.
    Connected,

    /// Torn down. Terminal.
    Destroyed,
}

impl ClientState {
    /// Numeric encoding for the state gauge.
    pub fn as_gauge(&self) -> f64 {
        match self {
            ClientState::Idle => 0.0,
            ClientState::Connecting => 1.0,
            ClientState::Connected => 2.0,
            ClientState::Destroyed => 3.0,
        }
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientState::Idle => write!(f, "Idle"),
            ClientState::Connecting => write!(f, "Connecting"),
            ClientState::Connected => write!(f, "Connected"),
            ClientState::Destroyed => write!(f, "Destroyed"),
        }
    }
}

/// An established connection: what `connect()` resolves with.
pub struct Connection<S> {
    /// Local instance of the remote structure, keyed by the handshake.
    pub response: Arc<S>,
    /// The caller's structure.
    pub request: Arc<S>,
    /// Control handle of the transport the session runs over.
    pub socket: TransportHandle,
    /// The live replication session shared by request and response.
    pub stream: ReplicationSession,
}

impl<S> Clone for Connection<S> {
    fn clone(&self) -> Self {
        Self {
            response: self.response.clone(),
            request: self.request.clone(),
            socket: self.socket.clone(),
            stream: self.stream.clone(),
        }
    }
}

impl<S: Replicable> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("response", &self.response.key())
            .field("request", &self.request.key())
            .field("socket", &self.socket)
            .field("stream", &self.stream)
            .finish()
    }
}
