// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Structure keys.
//!
//! A replicable structure is identified by a fixed-length public key. The
//! key's lowercase hex encoding is the path component of the endpoint URL,
//! which lets one dispatcher multiplex many structures.

use crate::error::{ClientError, Result};
use std::fmt;
use std::str::FromStr;

/// Length of a structure public key in bytes.
pub const KEY_LENGTH: usize = 32;

/// Public identifier of a replicable structure.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructureKey([u8; KEY_LENGTH]);

impl StructureKey {
    pub const fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    /// Lowercase hex encoding (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hex encoded key. Accepts either case.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| ClientError::InvalidKey(e.to_string()))?;
        Self::try_from(bytes.as_slice())
    }
}

impl TryFrom<&[u8]> for StructureKey {
    type Error = ClientError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; KEY_LENGTH] = bytes.try_into().map_err(|_| {
            ClientError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }
}

impl From<[u8; KEY_LENGTH]> for StructureKey {
    fn from(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl FromStr for StructureKey {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Display for StructureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for StructureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable
        write!(f, "StructureKey({}..)", &self.to_hex()[..8])
    }
}
