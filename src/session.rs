// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication sessions.
//!
//! A [`ReplicationStream`] is what a structure's `replicate` hands back: the
//! protocol byte stream the client pipes to the transport, plus a
//! [`ReplicationSession`] handle that reports the handshake and close.
//!
//! The structure keeps the other half, a [`SessionDriver`], and uses it to
//! report protocol progress:
//!
//! ```text
//!   structure (SessionDriver)              client (ReplicationSession)
//!   ─────────────────────────              ───────────────────────────
//!   complete_handshake(hs)  ─────────────► handshake().await
//!   finalized().await       ◄───────────── finalize()
//!   close() / drop          ─────────────► closed().await
//! ```
//!
//! The session also carries an opaque protocol object so a second structure
//! (the response) can join the session the first one started.

use crate::error::{ClientError, Result};
use crate::key::StructureKey;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tracing::debug;

/// Byte stream side of a replication session.
pub trait AsyncIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncIo for T {}

pub type BoxedIo = Box<dyn AsyncIo>;

/// Data exchanged during the replication handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Key the remote side announced for its own structure, if any.
    pub remote_key: Option<StructureKey>,
    /// Opaque user data supplied by the remote side.
    pub remote_user_data: Vec<u8>,
}

impl Handshake {
    pub fn new(remote_key: Option<StructureKey>, remote_user_data: Vec<u8>) -> Self {
        Self {
            remote_key,
            remote_user_data,
        }
    }

    /// Key of the response structure, carried in the remote user data.
    pub fn response_key(&self) -> Result<StructureKey> {
        StructureKey::try_from(self.remote_user_data.as_slice())
            .map_err(|e| ClientError::Handshake(format!("remote user data is not a key: {}", e)))
    }
}

struct SessionInner {
    id: u64,
    handshake: watch::Sender<Option<Handshake>>,
    closed: watch::Sender<bool>,
    finalized: watch::Sender<bool>,
    protocol: Arc<dyn Any + Send + Sync>,
}

/// Client-side handle of one live replication session.
#[derive(Clone)]
pub struct ReplicationSession {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for ReplicationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicationSession")
            .field("id", &self.inner.id)
            .field("handshake", &self.inner.handshake.borrow().is_some())
            .field("closed", &self.is_closed())
            .field("finalized", &self.is_finalized())
            .finish()
    }
}

impl ReplicationSession {
    /// Create a session around protocol state owned by the structure.
    pub fn new<P: Any + Send + Sync>(protocol: Arc<P>) -> (ReplicationSession, SessionDriver) {
        use std::sync::atomic::{AtomicU64, Ordering};
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        let inner = Arc::new(SessionInner {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            handshake: watch::channel(None).0,
            closed: watch::channel(false).0,
            finalized: watch::channel(false).0,
            protocol,
        });

        let session = ReplicationSession { inner };
        let driver = SessionDriver {
            session: session.clone(),
        };
        (session, driver)
    }

    /// Process-unique session id, for logs.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Wait for the handshake. Resolves at most one distinct value.
    pub async fn handshake(&self) -> Result<Handshake> {
        let mut hs_rx = self.inner.handshake.subscribe();
        let mut closed_rx = self.inner.closed.subscribe();

        loop {
            let current = hs_rx.borrow_and_update().clone();
            if let Some(hs) = current {
                return Ok(hs);
            }
            let closed = *closed_rx.borrow_and_update();
            if closed {
                return Err(ClientError::SessionClosed);
            }

            tokio::select! {
                changed = hs_rx.changed() => {
                    if changed.is_err() {
                        return Err(ClientError::SessionClosed);
                    }
                }
                changed = closed_rx.changed() => {
                    if changed.is_err() {
                        return Err(ClientError::SessionClosed);
                    }
                }
            }
        }
    }

    /// Handshake data, if the handshake already happened.
    pub fn remote_handshake(&self) -> Option<Handshake> {
        self.inner.handshake.borrow().clone()
    }

    /// Wait until the session closes.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Ask the structure to flush and end the session. Idempotent.
    pub fn finalize(&self) {
        let changed = self.inner.finalized.send_if_modified(|f| {
            if *f {
                false
            } else {
                *f = true;
                true
            }
        });
        if changed {
            debug!(session = self.inner.id, "Replication session finalized");
        }
    }

    pub fn is_finalized(&self) -> bool {
        *self.inner.finalized.borrow()
    }

    /// Protocol state installed by the structure that created the session.
    pub fn protocol<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.protocol.clone().downcast::<T>().ok()
    }
}

/// Structure-side half of a replication session.
pub struct SessionDriver {
    session: ReplicationSession,
}

impl SessionDriver {
    /// The client-facing handle.
    pub fn session(&self) -> &ReplicationSession {
        &self.session
    }

    /// Report the handshake. Only the first call has effect.
    pub fn complete_handshake(&self, handshake: Handshake) -> bool {
        if self.session.is_closed() {
            return false;
        }
        self.session.inner.handshake.send_if_modified(|slot| {
            if slot.is_some() {
                false
            } else {
                *slot = Some(handshake);
                true
            }
        })
    }

    /// End the session.
    pub fn close(&self) {
        self.session.inner.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        });
    }

    /// Wait until the client finalizes the session.
    pub async fn finalized(&self) {
        let mut rx = self.session.inner.finalized.subscribe();
        let _ = rx.wait_for(|f| *f).await;
    }
}

impl Drop for SessionDriver {
    fn drop(&mut self) {
        self.close();
    }
}

/// A structure's replication session together with its byte stream.
pub struct ReplicationStream {
    pub session: ReplicationSession,
    pub io: BoxedIo,
}

impl ReplicationStream {
    pub fn new(session: ReplicationSession, io: impl AsyncIo + 'static) -> Self {
        Self {
            session,
            io: Box::new(io),
        }
    }

    pub fn into_parts(self) -> (ReplicationSession, BoxedIo) {
        (self.session, self.io)
    }
}

impl fmt::Debug for ReplicationStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicationStream")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
