// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replicable structure abstraction.
//!
//! The client never looks inside the structure it replicates. It only needs
//! the capability set below, which lets tests plug in in-memory structures
//! and applications plug in real logs, drives or tries.
//!
//! # Request and Response
//!
//! The caller supplies the *request* structure. Once the handshake reveals
//! the remote key, the request acts as the factory for the *response*: a
//! fresh in-memory instance of the same type joined to the same session.
//!
//! ```text
//!   request.replicate() ──► ReplicationStream ──► piped to transport
//!                                 │
//!                            handshake
//!                                 │
//!   request.open_remote(key) ──► response.replicate_into(session)
//! ```
//!
//! # Teardown
//!
//! Structures are closed through a [`CloseCapability`]: either the structure
//! itself is [`Closable`], or it is a group of feeds closed one by one in order.

use crate::error::Result;
use crate::key::StructureKey;
use crate::session::{ReplicationSession, ReplicationStream};
use crate::BoxFuture;
use std::time::Duration;

/// Options passed to every `replicate` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicateOptions {
    /// Session timeout, enforced by the structure's replication protocol.
    pub timeout: Duration,
    /// Keep replicating after the initial sync.
    pub live: bool,
}

impl Default for ReplicateOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(crate::config::DEFAULT_TIMEOUT_MS),
            live: true,
        }
    }
}

/// Something that can be closed.
pub trait Closable: Send + Sync {
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// How a structure is torn down.
pub enum CloseCapability<'a> {
    /// The structure closes itself.
    Closable(&'a dyn Closable),
    /// The structure is a group of feeds, closed in order.
    FeedGroup(Vec<&'a dyn Closable>),
}

impl<'a> CloseCapability<'a> {
    /// Close everything this capability covers.
    ///
    /// Every feed of a group is closed even if an earlier one fails; the first
    /// error is returned.
    pub async fn close_all(self) -> Result<()> {
        match self {
            CloseCapability::Closable(target) => target.close().await,
            CloseCapability::FeedGroup(feeds) => {
                let mut first_err = None;
                for feed in feeds {
                    if let Err(e) = feed.close().await {
                        first_err.get_or_insert(e);
                    }
                }
                match first_err {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            }
        }
    }

    /// Number of closables covered.
    pub fn len(&self) -> usize {
        match self {
            CloseCapability::Closable(_) => 1,
            CloseCapability::FeedGroup(feeds) => feeds.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Capability set of a replicable structure.
pub trait Replicable: Send + Sync + Sized + 'static {
    /// Public key identifying the structure.
    fn key(&self) -> StructureKey;

    /// Secret key, when this replica is writable.
    fn secret_key(&self) -> Option<&[u8]> {
        None
    }

    /// Resolve once the structure is open and its key is known.
    fn ready(&self) -> BoxFuture<'_, ()>;

    /// Start a new replication session driven by this structure.
    fn replicate(&self, opts: ReplicateOptions) -> Result<ReplicationStream>;

    /// Join an existing replication session.
    fn replicate_into(&self, session: &ReplicationSession, opts: ReplicateOptions) -> Result<()>;

    /// Teardown capability.
    fn close_capability(&self) -> CloseCapability<'_>;

    /// Open a fresh in-memory instance of the same structure type for `key`.
    fn open_remote(&self, key: StructureKey) -> BoxFuture<'_, Self>;

    /// Short label for logs and metrics.
    fn kind(&self) -> &'static str {
        "structure"
    }
}
