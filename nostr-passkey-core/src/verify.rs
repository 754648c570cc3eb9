//! Verification of `Authorization` headers against the request they arrived on
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. size bound, header shape, token decode
//! 2. event kind
//! 3. timestamp window (inclusive)
//! 4. identity shape, before any cryptographic work
//! 5. `u` tag against the request URL
//! 6. `method` tag against the request method
//! 7. recomputed event id
//! 8. Schnorr signature over the id
//! 9. `payload` tag against the raw body, when both are present
//!
//! A rejection is an ordinary return value, not an error condition.

use std::fmt;

use crate::error::{HTTP_AUTH_KIND, MAX_TOKEN_SIZE, TIMESTAMP_TOLERANCE_SECS};
use crate::event::payload_hash;
use crate::identity::Identity;
use crate::keys::verify_signature;
use crate::token::{decode_token_within, split_scheme_within};

/// Why a header was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    TokenTooLarge,
    HeaderMissing,
    TokenMalformed,
    KindMismatch,
    TimestampOutOfRange,
    IdentityShapeInvalid,
    UrlMismatch,
    MethodMismatch,
    IdRecomputeMismatch,
    SignatureInvalid,
    PayloadHashMismatch,
}

impl Rejection {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::TokenTooLarge => "TOKEN_TOO_LARGE",
            Self::HeaderMissing => "HEADER_MISSING",
            Self::TokenMalformed => "TOKEN_MALFORMED",
            Self::KindMismatch => "KIND_MISMATCH",
            Self::TimestampOutOfRange => "TIMESTAMP_OUT_OF_RANGE",
            Self::IdentityShapeInvalid => "IDENTITY_SHAPE_INVALID",
            Self::UrlMismatch => "URL_MISMATCH",
            Self::MethodMismatch => "METHOD_MISMATCH",
            Self::IdRecomputeMismatch => "ID_RECOMPUTE_MISMATCH",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::PayloadHashMismatch => "PAYLOAD_HASH_MISMATCH",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::TokenTooLarge => "authorization token exceeds the size limit",
            Self::HeaderMissing => "missing or unrecognised authorization header",
            Self::TokenMalformed => "authorization token could not be decoded",
            Self::KindMismatch => "event kind is not an HTTP auth event",
            Self::TimestampOutOfRange => "event timestamp is outside the accepted window",
            Self::IdentityShapeInvalid => "event pubkey is not 64 lowercase hex characters",
            Self::UrlMismatch => "event URL does not match the request",
            Self::MethodMismatch => "event method does not match the request",
            Self::IdRecomputeMismatch => "event id does not match its content",
            Self::SignatureInvalid => "event signature is invalid",
            Self::PayloadHashMismatch => "payload hash does not match the request body",
        };
        f.write_str(message)
    }
}

impl std::error::Error for Rejection {}

/// The identity behind a header that passed every check.
///
/// Only this module constructs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    identity: Identity,
    did: String,
}

impl VerifiedIdentity {
    pub(crate) fn new(identity: Identity) -> Self {
        let did = identity.did();
        Self { identity, did }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// `did:nostr:<identity>`
    pub fn did(&self) -> &str {
        &self.did
    }

}

/// The request a header is verified against.
#[derive(Debug, Clone)]
pub struct VerifyContext<'a> {
    url: &'a str,
    method: &'a str,
    raw_body: Option<&'a [u8]>,
    allow_method_wildcard: bool,
    allow_url_prefix: bool,
    allow_basic_scheme: bool,
    max_size: usize,
}

impl<'a> VerifyContext<'a> {
    pub fn new(url: &'a str, method: &'a str) -> Self {
        Self {
            url,
            method,
            raw_body: None,
            allow_method_wildcard: false,
            allow_url_prefix: false,
            allow_basic_scheme: false,
            max_size: MAX_TOKEN_SIZE,
        }
    }

    /// The exact bytes received, hashed for the `payload` check.
    pub fn with_body(mut self, raw_body: &'a [u8]) -> Self {
        self.raw_body = Some(raw_body);
        self
    }

    /// Accept a `method` tag of `*`.
    pub fn allow_method_wildcard(mut self, allow: bool) -> Self {
        self.allow_method_wildcard = allow;
        self
    }

    /// Accept a request URL that lies under the event URL (`event_url + "/"`).
    pub fn allow_url_prefix(mut self, allow: bool) -> Self {
        self.allow_url_prefix = allow;
        self
    }

    /// Accept the `Basic base64("nostr:" + token)` header form.
    pub fn allow_basic_scheme(mut self, allow: bool) -> Self {
        self.allow_basic_scheme = allow;
        self
    }

    /// Bound on the header, the token and the decoded event JSON, in bytes.
    /// Defaults to [`MAX_TOKEN_SIZE`].
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }
}

/// Verify a header value against the current clock.
pub fn verify(
    header: Option<&str>,
    context: &VerifyContext<'_>,
) -> Result<VerifiedIdentity, Rejection> {
    verify_at(header, context, chrono::Utc::now().timestamp())
}

/// Verify a header value against a fixed clock reading (unix seconds).
pub fn verify_at(
    header: Option<&str>,
    context: &VerifyContext<'_>,
    now: i64,
) -> Result<VerifiedIdentity, Rejection> {
    let result = run_checks(header, context, now);
    if let Err(rejection) = &result {
        tracing::debug!(reason = rejection.code(), url = context.url, "NIP-98 header rejected");
    }
    result
}

fn run_checks(
    header: Option<&str>,
    context: &VerifyContext<'_>,
    now: i64,
) -> Result<VerifiedIdentity, Rejection> {
    let header = header.ok_or(Rejection::HeaderMissing)?;
    if header.len() > context.max_size {
        return Err(Rejection::TokenTooLarge);
    }

    let (_, token) = split_scheme_within(header, context.allow_basic_scheme, context.max_size)
        .ok_or(Rejection::HeaderMissing)?;
    if token.len() > context.max_size {
        return Err(Rejection::TokenTooLarge);
    }
    let decoded = decode_token_within(&token, context.max_size).ok_or(Rejection::TokenMalformed)?;
    let event = decoded.event();
    let tags = decoded.tags();

    if event.kind != HTTP_AUTH_KIND {
        return Err(Rejection::KindMismatch);
    }

    if now.abs_diff(event.created_at) > TIMESTAMP_TOLERANCE_SECS.unsigned_abs() {
        return Err(Rejection::TimestampOutOfRange);
    }

    let identity = Identity::parse(&event.pubkey).ok_or(Rejection::IdentityShapeInvalid)?;

    let event_url = tags.url.as_deref().ok_or(Rejection::UrlMismatch)?;
    if !url_matches(event_url, context.url, context.allow_url_prefix) {
        return Err(Rejection::UrlMismatch);
    }

    let event_method = tags.method.as_deref().ok_or(Rejection::MethodMismatch)?;
    let wildcard = context.allow_method_wildcard && event_method == "*";
    if !wildcard && !event_method.eq_ignore_ascii_case(context.method) {
        return Err(Rejection::MethodMismatch);
    }

    let computed_id = decoded
        .computed_id()
        .map_err(|_| Rejection::IdRecomputeMismatch)?;
    if computed_id != event.id {
        return Err(Rejection::IdRecomputeMismatch);
    }

    let mut digest = [0u8; 32];
    hex::decode_to_slice(&event.id, &mut digest).map_err(|_| Rejection::IdRecomputeMismatch)?;
    if !verify_signature(identity.as_str(), &digest, &event.sig) {
        return Err(Rejection::SignatureInvalid);
    }

    if let (Some(expected), Some(body)) = (tags.payload.as_deref(), context.raw_body) {
        if !expected.eq_ignore_ascii_case(&payload_hash(body)) {
            return Err(Rejection::PayloadHashMismatch);
        }
    }

    Ok(VerifiedIdentity::new(identity))
}

/// Exact match after dropping one trailing `/` from each side, or, in prefix
/// mode, the request URL continuing the event URL at a path boundary.
pub fn url_matches(event_url: &str, request_url: &str, allow_prefix: bool) -> bool {
    let event_url = strip_one_trailing_slash(event_url);
    let request_url = strip_one_trailing_slash(request_url);

    if event_url == request_url {
        return true;
    }

    allow_prefix
        && request_url
            .strip_prefix(event_url)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn strip_one_trailing_slash(url: &str) -> &str {
    url.strip_suffix('/').unwrap_or(url)
}
