//! Nostr Passkey Server Library - passkey ceremonies issuing NIP-98 authenticated identities
//!
//! This library exposes the server components for use in integration tests.
//! The main binary uses these same components.

pub mod auth;
pub mod ceremony;
pub mod config;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod provisioning;
pub mod routes;
pub mod state;
pub mod store;
pub mod webauthn;

pub use auth::Nip98Json;
pub use ceremony::{
    AuthenticationOptionsRequest, AuthenticationVerifyRequest, CeremonyError, CeremonyOptions,
    CeremonyService, IdentityResponse, RegistrationOptionsRequest, RegistrationVerifyRequest,
};
pub use config::Config;
pub use error::ApiError;
pub use openapi::ApiDoc;
pub use provisioning::{CssPodClient, PodInfo, PodProvisioner, ProvisioningError};
pub use routes::create_router;
pub use state::AppState;
pub use store::{spawn_expiry_sweep, AuthStorage, StorageError};
pub use webauthn::{
    CeremonyVerifier, MockAuthenticator, MockCeremonyVerifier, VerifierError, WebAuthnConfig,
};
