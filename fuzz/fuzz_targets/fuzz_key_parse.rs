//! Fuzz target for structure key parsing.
//!
//! Parsing must never panic, and any key that parses must re-encode to the
//! lowercase form of its input.

#![no_main]

use libfuzzer_sys::fuzz_target;
use replication_client::StructureKey;

fuzz_target!(|data: &str| {
    if let Ok(key) = data.parse::<StructureKey>() {
        assert_eq!(key.to_hex(), data.to_ascii_lowercase());
    }

    // Raw bytes path
    let _ = StructureKey::try_from(data.as_bytes());
});
