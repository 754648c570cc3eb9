#![no_main]

//! Fuzz target for header verification
//!
//! Every input must produce a rejection or an identity, never a panic.
//!
//! Run with: cargo +nightly fuzz run fuzz_verify_header

use libfuzzer_sys::fuzz_target;
use nostr_passkey_core::{verify_at, VerifyContext};

fuzz_target!(|data: &[u8]| {
    let Ok(header) = std::str::from_utf8(data) else {
        return;
    };

    let context = VerifyContext::new("https://forum.example.com/auth/login/verify", "POST")
        .with_body(data)
        .allow_basic_scheme(true)
        .allow_method_wildcard(true)
        .allow_url_prefix(true);

    let _ = verify_at(Some(header), &context, 1_700_000_000);
});
