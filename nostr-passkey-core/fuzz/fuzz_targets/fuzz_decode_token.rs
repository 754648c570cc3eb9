#![no_main]

//! Fuzz target for token decoding
//!
//! Feeds arbitrary bytes both as a bare token and as raw event JSON.
//!
//! Run with: cargo +nightly fuzz run fuzz_decode_token

use libfuzzer_sys::fuzz_target;
use nostr_passkey_core::{decode_token, HttpAuthEvent};

fuzz_target!(|data: &[u8]| {
    if let Ok(token) = std::str::from_utf8(data) {
        let _ = decode_token(token);
    }

    if let Some(event) = HttpAuthEvent::from_json(data) {
        // Parsed events must always be able to recompute their id
        let _ = event.computed_id();
    }
});
