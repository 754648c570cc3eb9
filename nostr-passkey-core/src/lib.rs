//! Nostr Passkey Core - NIP-98 request authentication and passkey-derived identities
//!
//! This crate holds the pure, I/O-free half of the identity subsystem:
//!
//! # Features
//!
//! - HTTP auth events (kind 27235) binding a Schnorr signature to a URL,
//!   method and request body
//! - A token codec for the `Authorization: Nostr <token>` header and its
//!   `Basic` compatibility form
//! - An ordered verifier that returns a typed [`Rejection`] instead of failing
//! - Deterministic secp256k1 keypairs derived from a WebAuthn PRF output
//! - Secret key zeroization on drop
//!
//! # Example
//!
//! ```no_run
//! use nostr_passkey_core::{token, verify, NostrKeypair, VerifyContext};
//!
//! # fn example() -> nostr_passkey_core::Result<()> {
//! // The PRF output comes from the authenticator's `prf` extension.
//! let prf_output = [42u8; 32];
//! let keypair = NostrKeypair::derive_from_prf(&prf_output)?;
//!
//! let url = "https://forum.example.com/auth/login/verify";
//! let body = br#"{"identity":"..."}"#;
//! let header = token::authorization_header(&token::encode(&keypair, url, "POST", Some(body))?);
//!
//! let context = VerifyContext::new(url, "POST").with_body(body);
//! let verified = verify(Some(&header), &context).expect("fresh header verifies");
//! assert_eq!(verified.identity(), keypair.identity());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod event;
pub mod identity;
pub mod keys;
pub mod token;
pub mod verify;

// Re-export main types for convenience
pub use error::{CoreError, Result, HTTP_AUTH_KIND, MAX_TOKEN_SIZE, TIMESTAMP_TOLERANCE_SECS};
pub use event::{payload_hash, sign_http_auth, AuthTags, HttpAuthEvent, SignedEvent};
pub use identity::{did_nostr, is_identity_shape, Identity, DID_NOSTR_PREFIX};
pub use keys::{prf_eval_salt, verify_signature, NostrKeypair, HKDF_INFO, PRF_LABEL};
pub use token::{
    authorization_header, basic_authorization_header, decode_header, decode_token,
    has_nostr_auth, HeaderScheme,
};
pub use verify::{url_matches, verify, verify_at, Rejection, VerifiedIdentity, VerifyContext};
