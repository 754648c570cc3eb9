//! HTTP authentication events (kind 27235)
//!
//! An event arrives as untrusted JSON. [`HttpAuthEvent::from_json`] only
//! checks the JSON *shape*: every field present with the right JSON type.
//! Value checks (kind, timestamp window, identity shape, signature) belong to
//! the verifier so they run in a fixed order.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, HTTP_AUTH_KIND};
use crate::keys::NostrKeypair;

/// Tag name carrying the absolute request URL.
pub const TAG_URL: &str = "u";
/// Tag name carrying the HTTP method.
pub const TAG_METHOD: &str = "method";
/// Tag name carrying `hex(sha256(body))`.
pub const TAG_PAYLOAD: &str = "payload";

/// Wire representation of a signed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedEvent {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

/// The tags the verifier consults, indexed once at decode time.
///
/// The first tag with a given name fills its slot. A slot stays `None` when
/// that tag has no value or an empty one, even if a later tag of the same
/// name carries a value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthTags {
    pub url: Option<String>,
    pub method: Option<String>,
    pub payload: Option<String>,
}

impl AuthTags {
    fn index(tags: &[Vec<String>]) -> Self {
        let mut indexed = Self::default();
        let (mut seen_url, mut seen_method, mut seen_payload) = (false, false, false);
        for tag in tags {
            let Some(name) = tag.first() else {
                continue;
            };
            let (seen, slot) = match name.as_str() {
                TAG_URL => (&mut seen_url, &mut indexed.url),
                TAG_METHOD => (&mut seen_method, &mut indexed.method),
                TAG_PAYLOAD => (&mut seen_payload, &mut indexed.payload),
                _ => continue,
            };
            if !*seen {
                *seen = true;
                *slot = tag.get(1).filter(|value| !value.is_empty()).cloned();
            }
        }
        indexed
    }
}

/// A decoded HTTP auth event together with its tag index.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpAuthEvent {
    event: SignedEvent,
    tags: AuthTags,
}

impl HttpAuthEvent {
    /// Parse event JSON. Returns `None` for anything that is not an object
    /// with the expected field types.
    pub fn from_json(json: &[u8]) -> Option<Self> {
        let event: SignedEvent = serde_json::from_slice(json).ok()?;
        Some(Self::from_signed(event))
    }

    pub fn from_signed(event: SignedEvent) -> Self {
        let tags = AuthTags::index(&event.tags);
        Self { event, tags }
    }

    pub fn event(&self) -> &SignedEvent {
        &self.event
    }

    pub fn tags(&self) -> &AuthTags {
        &self.tags
    }

    /// Recompute the event id from its content fields.
    pub fn computed_id(&self) -> Result<String> {
        let digest = event_digest(
            &self.event.pubkey,
            self.event.created_at,
            self.event.kind,
            &self.event.tags,
            &self.event.content,
        )?;
        Ok(hex::encode(digest))
    }
}

/// `sha256` of the canonical serialization
/// `[0, pubkey, created_at, kind, tags, content]` as compact JSON.
pub fn event_digest(
    pubkey: &str,
    created_at: i64,
    kind: u32,
    tags: &[Vec<String>],
    content: &str,
) -> Result<[u8; 32]> {
    let canonical = serde_json::to_vec(&(0u8, pubkey, created_at, kind, tags, content))?;
    Ok(Sha256::digest(&canonical).into())
}

/// Hex `sha256` of a request body, as carried by the `payload` tag.
pub fn payload_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Build and sign an HTTP auth event for `url` and `method`.
///
/// The method is upper-cased. A `payload` tag is added only when `body` is
/// given; an empty body still gets one.
pub fn sign_http_auth(
    keypair: &NostrKeypair,
    url: &str,
    method: &str,
    body: Option<&[u8]>,
    created_at: i64,
) -> Result<SignedEvent> {
    let mut tags = vec![
        vec![TAG_URL.to_string(), url.to_string()],
        vec![TAG_METHOD.to_string(), method.to_ascii_uppercase()],
    ];
    if let Some(body) = body {
        tags.push(vec![TAG_PAYLOAD.to_string(), payload_hash(body)]);
    }

    let pubkey = keypair.identity().as_str().to_string();
    let content = String::new();
    let digest = event_digest(&pubkey, created_at, HTTP_AUTH_KIND, &tags, &content)?;
    let sig = keypair.sign_digest(&digest)?;

    Ok(SignedEvent {
        id: hex::encode(digest),
        pubkey,
        created_at,
        kind: HTTP_AUTH_KIND,
        tags,
        content,
        sig,
    })
}
