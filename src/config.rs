//! Configuration for the replication client.
//!
//! Configuration is passed to [`Client::new()`](crate::Client::new) and can be
//! constructed programmatically, from a bare endpoint string, or deserialized
//! from YAML/JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use replication_client::config::ClientConfig;
//!
//! let config = ClientConfig::from("ws://localhost:3000");
//! assert_eq!(config.timeout_ms, 30_000);
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! endpoint: "ws://dispatcher.example.com:3000"
//! timeout_ms: 30000
//! connect_timeout: "10s"
//! live: true
//! discovery: true
//! ```

use crate::error::{ClientError, Result};
use crate::key::StructureKey;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Default replication timeout handed to every `replicate` call (30 seconds).
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the remote dispatcher, e.g. `ws://localhost:3000`.
    pub endpoint: String,

    /// Replication timeout in milliseconds.
    /// Passed into `replicate` on both the request and response side; the
    /// replication session enforces it, not the client.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Upper bound for opening the transport, as a duration string (e.g. "10s").
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,

    /// Keep replicating after the initial sync.
    #[serde(default = "default_true")]
    pub live: bool,

    /// Start peer discovery for the request key once it is ready.
    #[serde(default = "default_true")]
    pub discovery: bool,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_connect_timeout() -> String {
    "10s".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:3000".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            connect_timeout: default_connect_timeout(),
            live: true,
            discovery: true,
        }
    }
}

impl From<&str> for ClientConfig {
    fn from(endpoint: &str) -> Self {
        Self::new(endpoint)
    }
}

impl From<String> for ClientConfig {
    fn from(endpoint: String) -> Self {
        Self::new(endpoint)
    }
}

impl ClientConfig {
    /// Create a config for an endpoint with default settings.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Create a config for tests: short connect timeout, no discovery.
    pub fn for_testing(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            timeout_ms: 5_000,
            connect_timeout: "2s".to_string(),
            live: true,
            discovery: false,
        }
    }

    /// Override the replication timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Replication timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parse the connect_timeout string to a Duration.
    pub fn connect_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.connect_timeout).unwrap_or(Duration::from_secs(10))
    }

    /// Check that the endpoint is a usable WebSocket base URL.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(ClientError::Config("endpoint is empty".to_string()));
        }

        let base = Url::parse(&self.endpoint)?;
        match base.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(ClientError::Config(format!(
                "endpoint must use ws or wss, got {}",
                other
            ))),
        }
    }

    /// Derive the URL for a structure: the endpoint joined with `/` + lowercase hex key.
    ///
    /// Any path already present on the endpoint is replaced, so
    /// `ws://host:3000/base` and `ws://host:3000` give the same result.
    pub fn endpoint_url(&self, key: &StructureKey) -> Result<Url> {
        self.validate()?;
        let base = Url::parse(&self.endpoint)?;
        Ok(base.join(&format!("/{}", key.to_hex()))?)
    }
}
