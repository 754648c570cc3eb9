//! Hardware authenticator ceremonies (WebAuthn/FIDO2)
//!
//! The ceremony orchestrator talks to authenticators only through the
//! [`CeremonyVerifier`] trait, so the cryptographic verification of
//! attestations and assertions can be swapped out.
//!
//! ## Architecture
//!
//! - `config`: WebAuthn Relying Party configuration
//! - `verifier`: the `CeremonyVerifier` seam and its result types
//! - `passkey`: `CeremonyVerifier` backed by webauthn-rs passkeys
//! - `client_data`: decoding of `clientDataJSON` from a browser response
//! - `mock`: a software authenticator and matching verifier for testing

mod client_data;
mod config;
pub mod mock;
mod passkey;
mod verifier;

pub use client_data::{parse_client_data, ClientData};
pub use config::{ConfigError, WebAuthnConfig};
pub use mock::{MockAuthenticator, MockCeremonyVerifier};
pub use verifier::{
    transports_from_response, CeremonyVerifier, IssuedCeremony, VerifiedAssertion,
    VerifiedRegistration, VerifierError,
};
