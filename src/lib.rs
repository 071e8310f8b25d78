//! # Replication Client
//!
//! Connects a local replicable structure to a remote dispatcher and keeps it
//! replicating with a matching remote structure over one duplex transport.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                          replication-client                               │
//! │                                                                           │
//! │  ┌───────────┐    ┌────────────────┐    ┌──────────────────────────────┐  │
//! │  │ ReadyGate │───►│ Transport (WS) │◄──►│ pipe ◄──► ReplicationStream  │  │
//! │  │ (once)    │    │ {endpoint}/hex │    │          (request.replicate) │  │
//! │  └───────────┘    └────────────────┘    └──────────────────────────────┘  │
//! │        │                                               │ handshake        │
//! │        ▼                                               ▼                  │
//! │  ┌────────────────┐                      ┌────────────────────────────┐   │
//! │  │ DiscoveryHandle│                      │ Response (open_remote +    │   │
//! │  │ (peer / error) │                      │ replicate_into same stream)│   │
//! │  └────────────────┘                      └────────────────────────────┘   │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use replication_client::create_client;
//! use std::sync::Arc;
//!
//! let client = create_client(Arc::new(log), "ws://localhost:3000");
//! let connection = client.connect().await?;
//! println!("replicating into {}", connection.response.key());
//! client.close().await?;
//! ```

pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod gate;
pub mod key;
pub mod metrics;
pub mod pipe;
pub mod session;
pub mod structure;
pub mod transport;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed, sendable future resolving to a client [`Result`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

// Re-exports for convenience
pub use client::{Client, ClientState, Connection};
pub use config::{ClientConfig, DEFAULT_TIMEOUT_MS};
pub use discovery::{DiscoveryEvent, DiscoveryHandle, NoDiscovery, PeerDiscovery, PeerInfo};
pub use error::{ClientError, Result};
pub use events::{ClientEvents, Subscribers};
pub use gate::ReadyGate;
pub use key::{StructureKey, KEY_LENGTH};
pub use pipe::{bridge, PipeOutcome};
pub use session::{AsyncIo, BoxedIo, Handshake, ReplicationSession, ReplicationStream, SessionDriver};
pub use structure::{CloseCapability, Closable, ReplicateOptions, Replicable};
pub use transport::{Connector, TransportHandle, TransportSignal, TransportSocket, WebSocketConnector};

/// Create a client for `request`.
///
/// `config` may be a full [`ClientConfig`] or just the endpoint string.
pub fn create_client<S: Replicable>(request: Arc<S>, config: impl Into<ClientConfig>) -> Client<S> {
    Client::new(request, config)
}
