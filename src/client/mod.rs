// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication client.
//!
//! The [`Client`] owns one connection attempt from start to teardown:
//!
//! 1. `ready()`: wait for the request structure, derive the endpoint URL and
//!    start peer discovery. Memoized behind a [`ReadyGate`].
//! 2. `connect()`: open the transport, start the request's replication session
//!    and pipe it over the transport.
//! 3. On handshake: open the response structure from the handshake key and
//!    join it to the same session. Once it is ready, emit `connect`.
//! 4. On transport close: tear everything down in a fixed order and emit `close`.
//!
//! # Example
//!
//! ```rust,ignore
//! use replication_client::create_client;
//! use std::sync::Arc;
//!
//! let client = create_client(Arc::new(log), "ws://localhost:3000");
//! let connection = client.connect().await?;
//! let mirrored = connection.response.get(0).await?;
//! client.close().await?;
//! ```
//!
//! A client is single-use. After teardown every `connect()` stays pending
//! forever instead of reusing stale state.

mod lifecycle;
mod types;

pub use types::{ClientState, Connection};

use crate::config::ClientConfig;
use crate::discovery::{DiscoveryEvent, DiscoveryHandle, NoDiscovery, PeerDiscovery};
use crate::error::{ClientError, Result};
use crate::events::ClientEvents;
use crate::gate::ReadyGate;
use crate::key::StructureKey;
use crate::metrics;
use crate::session::ReplicationSession;
use crate::structure::{ReplicateOptions, Replicable};
use crate::transport::{Connector, TransportHandle, WebSocketConnector};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info};
use url::Url;

/// A resource the client may or may not currently hold.
pub(crate) struct Slot<T>(Mutex<Option<T>>);

impl<T: Clone> Slot<T> {
    fn new(value: Option<T>) -> Self {
        Self(Mutex::new(value))
    }

    pub(crate) fn get(&self) -> Option<T> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn set(&self, value: T) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = Some(value);
    }

    pub(crate) fn take(&self) -> Option<T> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// State shared between the client handle and its lifecycle task.
pub(crate) struct Shared<S: Replicable> {
    pub(crate) config: ClientConfig,
    pub(crate) connector: Arc<dyn Connector>,
    discovery_service: Arc<dyn PeerDiscovery>,

    pub(crate) request: Slot<Arc<S>>,
    pub(crate) response: Slot<Arc<S>>,
    pub(crate) transport: Slot<TransportHandle>,
    pub(crate) stream: Slot<ReplicationSession>,
    pub(crate) discovery: Slot<Arc<DiscoveryHandle>>,
    pub(crate) url: Slot<Url>,
    pub(crate) key: Slot<StructureKey>,

    pub(crate) gate: ReadyGate<Url>,
    state_tx: watch::Sender<ClientState>,
    pub(crate) events: ClientEvents<S>,
    torn_down: AtomicBool,
}

impl<S: Replicable> Shared<S> {
    pub(crate) fn state(&self) -> ClientState {
        *self.state_tx.borrow()
    }

    pub(crate) fn set_state(&self, state: ClientState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Client state changed");
            metrics::set_client_state(state.as_gauge());
        }
    }

    /// Move `Connecting` to `Connected`. Fails if the client was destroyed meanwhile.
    pub(crate) fn mark_connected(&self) -> bool {
        let moved = self.state_tx.send_if_modified(|state| {
            if *state == ClientState::Connecting {
                *state = ClientState::Connected;
                true
            } else {
                false
            }
        });
        if moved {
            metrics::set_client_state(ClientState::Connected.as_gauge());
        }
        moved
    }

    pub(crate) fn replicate_options(&self) -> ReplicateOptions {
        ReplicateOptions {
            timeout: self.config.timeout(),
            live: self.config.live,
        }
    }

    pub(crate) fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Claim the teardown. Returns `false` if it already ran.
    pub(crate) fn begin_teardown(&self) -> bool {
        !self.torn_down.swap(true, Ordering::AcqRel)
    }

    /// Gate initialization: request ready, endpoint URL, discovery.
    async fn initialize(self: &Arc<Self>) -> Result<Url> {
        let request = self.request.get().ok_or(ClientError::Destroyed)?;
        request.ready().await?;

        let key = request.key();
        let url = self.config.endpoint_url(&key)?;

        if self.config.discovery {
            let weak = Arc::downgrade(self);
            let handle = DiscoveryHandle::start(self.discovery_service.clone(), key, move |event| {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                match event {
                    DiscoveryEvent::Peer(peer) => {
                        debug!(peer = %peer, "Peer discovered");
                        metrics::record_peer_discovered();
                        shared.events.emit_peer(peer);
                    }
                    DiscoveryEvent::Error(message) => {
                        shared.events.emit_error(ClientError::Discovery(message));
                    }
                }
            })
            .await?;

            if self.is_torn_down() {
                // Closed while discovery was starting
                if let Err(e) = handle.close().await {
                    self.events.emit_error(e);
                }
                return Err(ClientError::Destroyed);
            }
            self.discovery.set(Arc::new(handle));
        }

        self.key.set(key);
        self.url.set(url.clone());
        info!(url = %url, structure = request.kind(), "Client ready");
        Ok(url)
    }
}

/// Connects a local replicable structure to a remote dispatcher.
pub struct Client<S: Replicable> {
    shared: Arc<Shared<S>>,
}

impl<S: Replicable> Clone for Client<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<S: Replicable> Client<S> {
    /// Create a client that connects over WebSocket, without peer discovery.
    pub fn new(request: Arc<S>, config: impl Into<ClientConfig>) -> Self {
        Self::with_collaborators(
            request,
            config,
            Arc::new(WebSocketConnector),
            Arc::new(NoDiscovery),
        )
    }

    /// Create a client with explicit transport and discovery collaborators.
    pub fn with_collaborators(
        request: Arc<S>,
        config: impl Into<ClientConfig>,
        connector: Arc<dyn Connector>,
        discovery: Arc<dyn PeerDiscovery>,
    ) -> Self {
        let (state_tx, _state_rx) = watch::channel(ClientState::Idle);

        Self {
            shared: Arc::new(Shared {
                config: config.into(),
                connector,
                discovery_service: discovery,
                request: Slot::new(Some(request)),
                response: Slot::new(None),
                transport: Slot::new(None),
                stream: Slot::new(None),
                discovery: Slot::new(None),
                url: Slot::new(None),
                key: Slot::new(None),
                gate: ReadyGate::new(),
                state_tx,
                events: ClientEvents::default(),
                torn_down: AtomicBool::new(false),
            }),
        }
    }

    /// Get the current state.
    pub fn state(&self) -> ClientState {
        self.shared.state()
    }

    /// Get a receiver for state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ClientState> {
        self.shared.state_tx.subscribe()
    }

    /// Subscribe to client events.
    pub fn events(&self) -> &ClientEvents<S> {
        &self.shared.events
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Endpoint URL, once the client is ready.
    pub fn url(&self) -> Option<Url> {
        self.shared.url.get()
    }

    /// Request key, once the client is ready.
    pub fn key(&self) -> Option<StructureKey> {
        self.shared.key.get()
    }

    /// The response structure, once the handshake produced one.
    pub fn response(&self) -> Option<Arc<S>> {
        self.shared.response.get()
    }

    /// The live replication session, if any.
    pub fn stream(&self) -> Option<ReplicationSession> {
        self.shared.stream.get()
    }

    /// Control handle of the current transport, if any.
    pub fn transport(&self) -> Option<TransportHandle> {
        self.shared.transport.get()
    }

    /// Wait for the request structure and start discovery. Runs once.
    ///
    /// Resolves with the endpoint URL. After teardown this never resolves.
    pub async fn ready(&self) -> Result<Url> {
        let shared = self.shared.clone();
        self.shared
            .gate
            .get_or_init(move || async move { shared.initialize().await })
            .await
    }

    /// Connect to the endpoint and establish replication.
    ///
    /// Fails with a usage error if an attempt is in flight, a connection is
    /// live, or the client was destroyed. Otherwise resolves once the response
    /// structure is ready, or with the error that ended the attempt.
    pub async fn connect(&self) -> Result<Connection<S>> {
        let url = self.ready().await?;

        let transport = TransportHandle::new(url.clone());
        let mut rejection = None;
        self.shared.state_tx.send_if_modified(|state| match state {
            _ if self.shared.is_torn_down() => {
                rejection = Some(ClientError::Destroyed);
                false
            }
            ClientState::Idle => {
                *state = ClientState::Connecting;
                self.shared.transport.set(transport.clone());
                true
            }
            ClientState::Connecting => {
                rejection = Some(ClientError::AlreadyConnecting);
                false
            }
            ClientState::Connected => {
                rejection = Some(ClientError::AlreadyConnected);
                false
            }
            ClientState::Destroyed => {
                rejection = Some(ClientError::Destroyed);
                false
            }
        });

        if let Some(err) = rejection {
            debug!(url = %url, error = %err, "Connect rejected");
            metrics::record_usage_error(err.kind());
            return Err(err);
        }

        metrics::set_client_state(ClientState::Connecting.as_gauge());
        metrics::record_connect_attempt();
        info!(url = %url, "Connecting");

        let (reply_tx, reply_rx) = oneshot::channel();
        tokio::spawn(lifecycle::run(self.shared.clone(), transport, reply_tx));

        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::ConnectionClosed),
        }
    }

    /// Finalize the replication stream and destroy the transport.
    ///
    /// Resolves once teardown finished and `close` was emitted, also when
    /// another caller started it. On an idle client teardown runs right away;
    /// on a destroyed one this is a no-op.
    pub async fn close(&self) -> Result<()> {
        let mut closes = self.shared.events.closes();
        if self.state() == ClientState::Destroyed {
            return Ok(());
        }

        match self.shared.transport.get() {
            None => {
                debug!("Closing client without transport");
                if !lifecycle::teardown(&self.shared).await {
                    // Another caller owns the teardown
                    let _ = closes.recv().await;
                }
            }
            Some(transport) => {
                if let Some(stream) = self.shared.stream.get() {
                    stream.finalize();
                }
                transport.destroy(None);
                let _ = closes.recv().await;
            }
        }
        Ok(())
    }

    /// Destroy the transport, propagating `err` as its error.
    ///
    /// Without a transport there is nothing to tear down through, so `err` is
    /// emitted directly.
    pub fn destroy(&self, err: Option<ClientError>) {
        match self.shared.transport.get() {
            Some(transport) => {
                transport.destroy(err);
            }
            None => {
                if let Some(err) = err {
                    self.shared.events.emit_error(err);
                }
            }
        }
    }
}

impl<S: Replicable> std::fmt::Debug for Client<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.shared.config.endpoint)
            .field("state", &self.state())
            .field("url", &self.url().map(|u| u.to_string()))
            .finish()
    }
}
