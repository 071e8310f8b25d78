//! Mirror dispatcher and test collaborators.
//!
//! The mirror plays the remote dispatcher: it greets the client with a fresh
//! echo key in its handshake user data and copies every record it receives
//! for the request key into the echo structure.

use super::memory::Journal;
use super::wire::{write_message, WireMessage, SESSION_BUFFER};
use replication_client::{
    bridge, BoxFuture, ClientError, Connector, DiscoveryEvent, PeerDiscovery, StructureKey,
    TransportHandle, TransportSocket,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use url::Url;

/// Key of the echo structure the mirror serves for `request`.
pub fn echo_key(request: &StructureKey) -> StructureKey {
    StructureKey::from_bytes(request.as_bytes().map(|b| b ^ 0xFF))
}

/// Request key from the last path segment of an endpoint URL.
pub fn key_from_url(url: &Url) -> Option<StructureKey> {
    url.path_segments()?.last()?.parse().ok()
}

/// Serve one client connection until either side hangs up.
pub async fn serve_mirror(socket: TransportSocket, request: StructureKey) {
    let (io, server_io) = tokio::io::duplex(SESSION_BUFFER);
    let handle = TransportHandle::new(Url::parse("ws://mirror.test/").unwrap());
    let pump = tokio::spawn(bridge(socket, Box::new(io), handle.clone()));

    let echo = echo_key(&request);
    let (reader, mut writer) = tokio::io::split(server_io);
    let mut lines = BufReader::new(reader).lines();

    let hello = WireMessage::Hello {
        key: echo.to_hex(),
        user_data: echo.to_hex(),
    };
    if write_message(&mut writer, &hello).await.is_ok() {
        while let Ok(Some(line)) = lines.next_line().await {
            match serde_json::from_str::<WireMessage>(&line) {
                Ok(WireMessage::Records { key, records }) if key == request.to_hex() => {
                    let echoed = WireMessage::Records {
                        key: echo.to_hex(),
                        records,
                    };
                    if write_message(&mut writer, &echoed).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    }

    handle.destroy(None);
    let _ = pump.await;
}

// =============================================================================
// Connectors
// =============================================================================

/// How a `MemoryConnector` answers `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorMode {
    /// Serve a mirror over an in-memory socket pair.
    Mirror,
    /// Fail like a refused TCP connection.
    Refuse,
    /// Never finish opening.
    Stall,
}

/// In-process connector recording every URL it was asked to open.
pub struct MemoryConnector {
    mode: ConnectorMode,
    opened: Mutex<Vec<Url>>,
    opens: AtomicUsize,
}

impl MemoryConnector {
    pub fn new(mode: ConnectorMode) -> Self {
        Self {
            mode,
            opened: Mutex::new(Vec::new()),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> Vec<Url> {
        self.opened.lock().unwrap().clone()
    }
}

impl Connector for MemoryConnector {
    fn open<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, TransportSocket> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.opened.lock().unwrap().push(url.clone());

        Box::pin(async move {
            match self.mode {
                ConnectorMode::Mirror => {
                    let request = key_from_url(url)
                        .ok_or_else(|| ClientError::transport(url.as_str(), "404 no key in path"))?;
                    let (client, server) = TransportSocket::memory_pair();
                    tokio::spawn(serve_mirror(server, request));
                    Ok(client)
                }
                ConnectorMode::Refuse => Err(ClientError::transport(
                    url.as_str(),
                    "Connection refused (os error 111)",
                )),
                ConnectorMode::Stall => std::future::pending().await,
            }
        })
    }
}

// =============================================================================
// Discovery
// =============================================================================

/// Discovery that journals join/leave and lets tests announce events.
pub struct RecordingDiscovery {
    journal: Journal,
    senders: Mutex<Vec<mpsc::UnboundedSender<DiscoveryEvent>>>,
    join_delay: Option<Duration>,
    leave_error: Option<String>,
}

impl RecordingDiscovery {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            senders: Mutex::new(Vec::new()),
            join_delay: None,
            leave_error: None,
        }
    }

    /// Make `join` take `delay` before it returns.
    pub fn with_join_delay(mut self, delay: Duration) -> Self {
        self.join_delay = Some(delay);
        self
    }

    /// Make `leave` fail with `message`.
    pub fn failing_leave(mut self, message: impl Into<String>) -> Self {
        self.leave_error = Some(message.into());
        self
    }

    pub fn announce(&self, event: DiscoveryEvent) {
        for tx in self.senders.lock().unwrap().iter() {
            let _ = tx.send(event.clone());
        }
    }
}

impl PeerDiscovery for RecordingDiscovery {
    fn join<'a>(&'a self, _key: &'a StructureKey) -> BoxFuture<'a, mpsc::UnboundedReceiver<DiscoveryEvent>> {
        Box::pin(async move {
            if let Some(delay) = self.join_delay {
                tokio::time::sleep(delay).await;
            }
            self.journal.record("discovery.join");
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.lock().unwrap().push(tx);
            Ok(rx)
        })
    }

    fn leave<'a>(&'a self, _key: &'a StructureKey) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.journal.record("discovery.leave");
            match &self.leave_error {
                Some(message) => Err(ClientError::Discovery(message.clone())),
                None => Ok(()),
            }
        })
    }
}
