//! Fuzz target for endpoint URL derivation.
//!
//! Arbitrary endpoints must never panic. When a URL is produced, its path is
//! always a single lowercase hex segment.

#![no_main]

use libfuzzer_sys::fuzz_target;
use replication_client::{ClientConfig, StructureKey, KEY_LENGTH};

fuzz_target!(|data: (&str, [u8; KEY_LENGTH])| {
    let (endpoint, bytes) = data;
    let key = StructureKey::from_bytes(bytes);
    let config = ClientConfig::new(endpoint);

    if let Ok(url) = config.endpoint_url(&key) {
        assert_eq!(url.path(), format!("/{}", key.to_hex()));
        assert!(matches!(url.scheme(), "ws" | "wss"));
    }

    let _ = config.validate();
});
