//! WebAssembly bindings for passkey-derived Nostr identities.
//!
//! The browser evaluates the authenticator PRF, then derives the keypair and
//! signs NIP-98 headers locally. The secret key never leaves this module.

use nostr_passkey_core::{prf_eval_salt, token, verify, NostrKeypair, VerifyContext};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

/// Initialize panic hook for better error messages in browser console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Identity derived from a PRF output.
#[derive(Serialize, Deserialize)]
pub struct DerivedIdentity {
    /// x-only public key, 64 lowercase hex
    pub identity: String,
    /// `did:nostr:<identity>`
    pub did: String,
    /// Error message if derivation failed
    pub error: Option<String>,
}

/// Result of checking a header locally.
#[derive(Serialize, Deserialize)]
pub struct HeaderCheck {
    pub valid: bool,
    pub identity: Option<String>,
    /// Rejection code when invalid
    pub code: Option<String>,
}

/// Derive the identity for an authenticator PRF output.
///
/// # Returns
/// A JSON string with `identity`, `did` and `error`
#[wasm_bindgen]
pub fn derive_identity(prf_output: &[u8]) -> String {
    let result = match NostrKeypair::derive_from_prf(prf_output) {
        Ok(keypair) => DerivedIdentity {
            identity: keypair.identity().to_string(),
            did: keypair.identity().did(),
            error: None,
        },
        Err(e) => DerivedIdentity {
            identity: String::new(),
            did: String::new(),
            error: Some(e.to_string()),
        },
    };
    serde_json::to_string(&result)
        .unwrap_or_else(|_| r#"{"identity":"","did":"","error":"Unknown error"}"#.to_string())
}

/// Sign a request and return its `Authorization` header value.
///
/// Pass the exact body bytes that will be sent so the payload hash matches.
#[wasm_bindgen]
pub fn create_auth_header(
    prf_output: &[u8],
    url: &str,
    method: &str,
    body: Option<Vec<u8>>,
) -> Result<String, JsValue> {
    create_header_internal(prf_output, url, method, body.as_deref())
        .map_err(|e| JsValue::from_str(&e))
}

fn create_header_internal(
    prf_output: &[u8],
    url: &str,
    method: &str,
    body: Option<&[u8]>,
) -> Result<String, String> {
    let keypair = NostrKeypair::derive_from_prf(prf_output).map_err(|e| e.to_string())?;
    let token = token::encode(&keypair, url, method, body).map_err(|e| e.to_string())?;
    Ok(token::authorization_header(&token))
}

/// Check a header the way the server will, for client-side diagnostics.
///
/// # Returns
/// A JSON string with `valid`, `identity` and `code`
#[wasm_bindgen]
pub fn check_auth_header(header: &str, url: &str, method: &str, body: Option<Vec<u8>>) -> String {
    let mut context = VerifyContext::new(url, method);
    if let Some(body) = body.as_deref() {
        context = context.with_body(body);
    }
    let result = match verify(Some(header), &context) {
        Ok(verified) => HeaderCheck {
            valid: true,
            identity: Some(verified.identity().to_string()),
            code: None,
        },
        Err(rejection) => HeaderCheck {
            valid: false,
            identity: None,
            code: Some(rejection.code().to_string()),
        },
    };
    serde_json::to_string(&result)
        .unwrap_or_else(|_| r#"{"valid":false,"code":"UNKNOWN"}"#.to_string())
}

/// The 32-byte value to pass as `prf.eval.first` when no server salt is used.
#[wasm_bindgen]
pub fn prf_salt() -> js_sys::Uint8Array {
    js_sys::Uint8Array::from(&prf_eval_salt()[..])
}

/// Hex form of [`prf_salt`].
#[wasm_bindgen]
pub fn prf_salt_hex() -> String {
    hex::encode(prf_eval_salt())
}

/// Get the library version.
#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
