//! Shared test utilities for client and WebSocket tests.
//!
//! This module provides:
//! - A line-delimited JSON replication protocol (`wire`)
//! - In-memory log and drive structures (`memory`)
//! - A mirror dispatcher, in-memory connectors and recording discovery (`mirror`)

#![allow(dead_code)]

pub mod memory;
pub mod mirror;
pub mod wire;

pub use memory::*;
pub use mirror::*;

use replication_client::ClientConfig;

/// Config for in-memory tests. The endpoint is never dialled for real.
pub fn memory_config() -> ClientConfig {
    ClientConfig::for_testing("ws://localhost:3000")
}
