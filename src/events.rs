// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Typed client events.
//!
//! Each event kind has its own subscriber list. Subscribing hands back an
//! unbounded receiver; notifying broadcasts a clone of the value to every live
//! subscriber and prunes receivers that were dropped.
//!
//! | Kind | Payload | Emitted when |
//! |------|---------|--------------|
//! | `peer` | [`PeerInfo`] | Discovery found a peer for the request key |
//! | `handshake` | [`ReplicationSession`] | The replication handshake completed |
//! | `connect` | [`Connection`] | The response is ready and replicating |
//! | `close` | `()` | Teardown finished |
//! | `error` | [`ClientError`] | Transport, pipe, discovery or structure failure |

use crate::client::Connection;
use crate::discovery::PeerInfo;
use crate::error::ClientError;
use crate::session::ReplicationSession;
use crate::structure::Replicable;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// A list of subscribers for a single event kind.
pub struct Subscribers<T> {
    senders: Mutex<Vec<mpsc::UnboundedSender<T>>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone> Subscribers<T> {
    /// Register a new subscriber. Only events notified after this call are delivered.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    /// Deliver `value` to every live subscriber. Returns the number reached.
    pub fn notify(&self, value: T) -> usize {
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        senders.retain(|tx| tx.send(value.clone()).is_ok());
        senders.len()
    }

    /// Number of registered subscribers (including ones not yet pruned).
    pub fn len(&self) -> usize {
        self.senders.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// All event lists owned by a client.
pub struct ClientEvents<S: Replicable> {
    peer: Subscribers<PeerInfo>,
    handshake: Subscribers<ReplicationSession>,
    connect: Subscribers<Connection<S>>,
    close: Subscribers<()>,
    error: Subscribers<ClientError>,
}

impl<S: Replicable> Default for ClientEvents<S> {
    fn default() -> Self {
        Self {
            peer: Subscribers::default(),
            handshake: Subscribers::default(),
            connect: Subscribers::default(),
            close: Subscribers::default(),
            error: Subscribers::default(),
        }
    }
}

impl<S: Replicable> ClientEvents<S> {
    pub fn peers(&self) -> mpsc::UnboundedReceiver<PeerInfo> {
        self.peer.subscribe()
    }

    pub fn handshakes(&self) -> mpsc::UnboundedReceiver<ReplicationSession> {
        self.handshake.subscribe()
    }

    pub fn connects(&self) -> mpsc::UnboundedReceiver<Connection<S>> {
        self.connect.subscribe()
    }

    pub fn closes(&self) -> mpsc::UnboundedReceiver<()> {
        self.close.subscribe()
    }

    pub fn errors(&self) -> mpsc::UnboundedReceiver<ClientError> {
        self.error.subscribe()
    }

    pub(crate) fn emit_peer(&self, peer: PeerInfo) {
        self.peer.notify(peer);
    }

    pub(crate) fn emit_handshake(&self, session: ReplicationSession) {
        self.handshake.notify(session);
    }

    pub(crate) fn emit_connect(&self, connection: Connection<S>) {
        self.connect.notify(connection);
    }

    pub(crate) fn emit_close(&self) {
        self.close.notify(());
    }

    pub(crate) fn emit_error(&self, error: ClientError) {
        crate::metrics::record_error(error.kind());
        self.error.notify(error);
    }
}
