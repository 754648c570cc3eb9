//! Shared fixtures for ceremony tests

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use nostr_passkey_core::{Identity, NostrKeypair};

use super::{CeremonyService, IdentityResponse, RegistrationOptionsRequest, RegistrationVerifyRequest};
use crate::store::AuthStorage;
use crate::webauthn::{MockAuthenticator, MockCeremonyVerifier};

pub const ORIGIN: &str = "https://forum.example.com";

pub fn service() -> CeremonyService {
    CeremonyService::new(
        Arc::new(AuthStorage::in_memory()),
        Arc::new(MockCeremonyVerifier::new("forum.example.com", ORIGIN)),
    )
}

pub fn authenticator(seed: u8) -> MockAuthenticator {
    MockAuthenticator::with_secret(ORIGIN, [seed; 32])
}

/// The keypair a client derives from the authenticator's PRF output for `salt`
pub fn keypair_from(authenticator: &MockAuthenticator, salt_b64: &str) -> NostrKeypair {
    let salt = URL_SAFE_NO_PAD.decode(salt_b64).unwrap();
    NostrKeypair::derive_from_prf(&authenticator.prf(&salt)).unwrap()
}

pub fn identity_from(authenticator: &MockAuthenticator, salt_b64: &str) -> Identity {
    keypair_from(authenticator, salt_b64).identity().clone()
}

/// Run a full registration, returning the derived identity
pub async fn register(
    service: &CeremonyService,
    authenticator: &MockAuthenticator,
) -> (Identity, IdentityResponse) {
    let issued = service
        .registration_options(RegistrationOptionsRequest::default())
        .await
        .unwrap();
    let identity = identity_from(authenticator, &issued.prf_salt);
    let response = service
        .verify_registration(RegistrationVerifyRequest {
            attestation: authenticator.create(&issued.options).unwrap(),
            identity: identity.to_string(),
            web_id: None,
        })
        .await
        .unwrap();
    (identity, response)
}
