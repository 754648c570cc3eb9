//! Token codec for the `Authorization` header
//!
//! A token is the base64 encoding of a signed event's JSON. It travels as
//! `Authorization: Nostr <token>` or, for clients that can only send Basic
//! credentials, `Authorization: Basic base64("nostr:" + token)`.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;

use crate::error::{Result, MAX_TOKEN_SIZE};
use crate::event::{sign_http_auth, HttpAuthEvent};
use crate::keys::NostrKeypair;

/// Scheme prefix of the primary header form.
pub const NOSTR_SCHEME: &str = "Nostr ";
/// Scheme prefix of the Basic compatibility form.
pub const BASIC_SCHEME: &str = "Basic ";
/// Username carried inside Basic credentials.
const BASIC_USERNAME_PREFIX: &str = "nostr:";

/// Which header shape a token was presented in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderScheme {
    Nostr,
    Basic,
}

/// Create a signed token for a request, timestamped now.
pub fn encode(
    keypair: &NostrKeypair,
    url: &str,
    method: &str,
    body: Option<&[u8]>,
) -> Result<String> {
    encode_at(keypair, url, method, body, chrono::Utc::now().timestamp())
}

/// Create a signed token with an explicit `created_at`.
pub fn encode_at(
    keypair: &NostrKeypair,
    url: &str,
    method: &str,
    body: Option<&[u8]>,
    created_at: i64,
) -> Result<String> {
    let event = sign_http_auth(keypair, url, method, body, created_at)?;
    let json = serde_json::to_vec(&event)?;
    Ok(STANDARD.encode(json))
}

/// `Nostr <token>`
pub fn authorization_header(token: &str) -> String {
    format!("{NOSTR_SCHEME}{token}")
}

/// `Basic base64("nostr:" + token)`
pub fn basic_authorization_header(token: &str) -> String {
    let credentials = format!("{BASIC_USERNAME_PREFIX}{token}");
    format!("{BASIC_SCHEME}{}", STANDARD.encode(credentials))
}

/// Whether a header value uses one of the two recognised shapes.
///
/// Does not decode the event.
pub fn has_nostr_auth(header: &str) -> bool {
    split_scheme(header, true).is_some()
}

/// Split a header value into its scheme and the raw token.
///
/// Returns `None` when the header has neither shape, when Basic is not
/// allowed, or when the Basic credentials do not start with `nostr:`.
pub fn split_scheme(header: &str, allow_basic: bool) -> Option<(HeaderScheme, String)> {
    split_scheme_within(header, allow_basic, MAX_TOKEN_SIZE)
}

/// [`split_scheme`] with a caller-chosen size bound.
pub(crate) fn split_scheme_within(
    header: &str,
    allow_basic: bool,
    max_size: usize,
) -> Option<(HeaderScheme, String)> {
    if header.len() > max_size {
        return None;
    }

    if let Some(token) = header.strip_prefix(NOSTR_SCHEME) {
        return Some((HeaderScheme::Nostr, token.trim().to_string()));
    }

    if allow_basic {
        if let Some(encoded) = header.strip_prefix(BASIC_SCHEME) {
            let decoded = decode_base64_lenient(encoded.trim())?;
            let credentials = String::from_utf8(decoded).ok()?;
            let token = credentials.strip_prefix(BASIC_USERNAME_PREFIX)?;
            return Some((HeaderScheme::Basic, token.to_string()));
        }
    }

    None
}

/// Decode a header value into an event. Never panics; any failure is `None`.
pub fn decode_header(header: &str, allow_basic: bool) -> Option<HttpAuthEvent> {
    let (_, token) = split_scheme(header, allow_basic)?;
    decode_token(&token)
}

/// Decode a bare token into an event. Never panics; any failure is `None`.
///
/// Inputs over [`MAX_TOKEN_SIZE`] are rejected before base64 decoding, and so
/// is decoded JSON over the same bound.
pub fn decode_token(token: &str) -> Option<HttpAuthEvent> {
    decode_token_within(token, MAX_TOKEN_SIZE)
}

/// [`decode_token`] with a caller-chosen size bound.
pub(crate) fn decode_token_within(token: &str, max_size: usize) -> Option<HttpAuthEvent> {
    if token.is_empty() || token.len() > max_size {
        return None;
    }
    let json = decode_base64_lenient(token)?;
    if json.len() > max_size {
        return None;
    }
    HttpAuthEvent::from_json(&json)
}

/// Accept standard and URL-safe alphabets, with or without padding.
fn decode_base64_lenient(input: &str) -> Option<Vec<u8>> {
    STANDARD
        .decode(input)
        .or_else(|_| STANDARD_NO_PAD.decode(input))
        .or_else(|_| URL_SAFE.decode(input))
        .or_else(|_| URL_SAFE_NO_PAD.decode(input))
        .ok()
}
