// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Peer discovery collaborator.
//!
//! The client does not find peers itself. It joins a [`PeerDiscovery`] service
//! for the request key, forwards every event it yields, and leaves exactly
//! once on teardown.
//!
//! Discovery is shared infrastructure: the same service may be joined by many
//! clients, so implementations hand out one event receiver per join.

use crate::error::Result;
use crate::key::StructureKey;
use crate::BoxFuture;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A peer announced by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerInfo {
    pub host: String,
    pub port: u16,
}

impl PeerInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for PeerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Event produced by a discovery service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Peer(PeerInfo),
    Error(String),
}

/// Peer discovery service.
pub trait PeerDiscovery: Send + Sync {
    /// Start announcing and looking up peers for `key`.
    fn join<'a>(&'a self, key: &'a StructureKey) -> BoxFuture<'a, mpsc::UnboundedReceiver<DiscoveryEvent>>;

    /// Stop announcing `key`.
    fn leave<'a>(&'a self, key: &'a StructureKey) -> BoxFuture<'a, ()>;
}

/// Discovery that never finds anyone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDiscovery;

impl PeerDiscovery for NoDiscovery {
    fn join<'a>(&'a self, _key: &'a StructureKey) -> BoxFuture<'a, mpsc::UnboundedReceiver<DiscoveryEvent>> {
        Box::pin(async {
            // Sender dropped right away: the forwarder ends immediately
            let (_tx, rx) = mpsc::unbounded_channel();
            Ok(rx)
        })
    }

    fn leave<'a>(&'a self, _key: &'a StructureKey) -> BoxFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }
}

/// A started discovery session for one key.
pub struct DiscoveryHandle {
    key: StructureKey,
    service: Arc<dyn PeerDiscovery>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl fmt::Debug for DiscoveryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryHandle")
            .field("key", &self.key)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl DiscoveryHandle {
    /// Join `service` for `key` and forward every event to `on_event`.
    pub async fn start<F>(service: Arc<dyn PeerDiscovery>, key: StructureKey, mut on_event: F) -> Result<Self>
    where
        F: FnMut(DiscoveryEvent) + Send + 'static,
    {
        let mut events = service.join(&key).await?;
        debug!(key = %key, "Discovery started");

        let forwarder = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                on_event(event);
            }
        });

        Ok(Self {
            key,
            service,
            forwarder: Mutex::new(Some(forwarder)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn key(&self) -> &StructureKey {
        &self.key
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop forwarding and leave the service. Only the first call does anything.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let forwarder = self
            .forwarder
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }

        let result = self.service.leave(&self.key).await;
        match &result {
            Ok(()) => debug!(key = %self.key, "Discovery stopped"),
            Err(e) => warn!(key = %self.key, error = %e, "Discovery leave failed"),
        }
        result
    }
}

impl Drop for DiscoveryHandle {
    fn drop(&mut self) {
        if let Some(forwarder) = self
            .forwarder
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            forwarder.abort();
        }
    }
}
