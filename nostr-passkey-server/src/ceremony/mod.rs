//! Registration and authentication ceremonies
//!
//! [`CeremonyService`] sequences the storage, the ceremony verifier and the
//! optional pod provisioner:
//!
//! - Registration: `Init → OptionsIssued → Verified → Stored`
//! - Authentication: `Init → OptionsIssued → Verified → CounterUpdated`
//!
//! Each log event carries the current step as its `stage` field. A challenge
//! is consumed before the ceremony response is checked, so a failed attempt
//! burns the challenge and the client has to start over.

mod authentication;
mod registration;
#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use nostr_passkey_core::Identity;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::provisioning::PodProvisioner;
use crate::store::{AuthStorage, ChallengeRecord, CredentialRecord, StorageError};
use crate::webauthn::{parse_client_data, CeremonyVerifier, VerifierError};

/// Size of the per-credential PRF salt
pub const PRF_SALT_LEN: usize = 32;

/// Ceremony failures
#[derive(Debug, thiserror::Error)]
pub enum CeremonyError {
    #[error("Invalid identity: must be 64 lowercase hex characters")]
    IdentityInvalid,

    #[error("Invalid webId: {0}")]
    InvalidWebId(&'static str),

    #[error("Identity already registered")]
    IdentityAlreadyRegistered,

    #[error("Challenge not found, expired, or already used")]
    ChallengeNotFoundExpiredOrUsed,

    #[error("Challenge was issued for a different ceremony")]
    CeremonyMismatch,

    #[error("Challenge was issued for a different identity")]
    ChallengeIdentityMismatch,

    #[error("NIP-98 identity does not match the claimed identity")]
    AssertionIdentityMismatch,

    #[error("Credential not found")]
    CredentialNotFound,

    #[error("Assertion was made with a different credential")]
    CredentialMismatch,

    #[error("Credential counter did not advance (stored {stored}, presented {presented})")]
    CounterRegression { stored: u32, presented: u32 },

    #[error("Malformed ceremony response: {0}")]
    MalformedCeremonyResponse(String),

    #[error("Ceremony verification failed: {0}")]
    CeremonyVerification(String),

    #[error("Storage error: {0}")]
    Store(#[from] StorageError),

    #[error("Internal ceremony error: {0}")]
    Internal(String),
}

impl From<VerifierError> for CeremonyError {
    fn from(err: VerifierError) -> Self {
        match err {
            VerifierError::MalformedResponse(msg) => Self::MalformedCeremonyResponse(msg),
            VerifierError::Rejected(msg) => Self::CeremonyVerification(msg),
            VerifierError::State(msg) | VerifierError::Setup(msg) => Self::Internal(msg),
        }
    }
}

/// `POST /auth/register/options` body
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOptionsRequest {
    /// Name shown by the authenticator
    #[schema(example = "Forum User")]
    pub display_name: Option<String>,
    /// Identity the client already derived, checked for prior registration
    #[serde(alias = "pubkey")]
    pub identity: Option<String>,
}

/// `POST /auth/register/verify` body
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationVerifyRequest {
    /// `PublicKeyCredential` JSON from `navigator.credentials.create`
    #[serde(alias = "response")]
    #[schema(value_type = Object)]
    pub attestation: Value,
    /// Identity derived from the PRF output of this credential
    #[serde(alias = "pubkey")]
    pub identity: String,
    /// WebID the client already owns (https only)
    pub web_id: Option<String>,
}

/// `POST /auth/login/options` body
#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthenticationOptionsRequest {
    #[serde(alias = "pubkey")]
    pub identity: String,
}

/// `POST /auth/login/verify` body
#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthenticationVerifyRequest {
    /// `PublicKeyCredential` JSON from `navigator.credentials.get`
    #[serde(alias = "response")]
    #[schema(value_type = Object)]
    pub assertion: Value,
    #[serde(alias = "pubkey")]
    pub identity: String,
}

/// Options for the browser plus the PRF salt to evaluate
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CeremonyOptions {
    /// Pass to `navigator.credentials.create/get`
    #[schema(value_type = Object)]
    pub options: Value,
    /// base64url PRF salt, also present in `options.publicKey.extensions.prf.eval.first`
    pub prf_salt: String,
}

/// Result of a completed ceremony
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IdentityResponse {
    pub ok: bool,
    #[schema(value_type = String, example = "eba811c75d487721d41d26718fc2c7f805a0c09e7084e1ecf6f1b51be5d4a720")]
    pub identity: Identity,
    #[schema(example = "did:nostr:eba811c75d487721d41d26718fc2c7f805a0c09e7084e1ecf6f1b51be5d4a720")]
    pub did_nostr: String,
    pub web_id: Option<String>,
    pub pod_url: Option<String>,
}

impl IdentityResponse {
    fn from_credential(credential: CredentialRecord) -> Self {
        Self {
            ok: true,
            identity: credential.identity,
            did_nostr: credential.did_nostr,
            web_id: credential.web_id,
            pod_url: credential.pod_url,
        }
    }
}

/// Ceremony orchestration over explicitly owned collaborators
pub struct CeremonyService {
    storage: Arc<AuthStorage>,
    verifier: Arc<dyn CeremonyVerifier>,
    provisioner: Option<Arc<dyn PodProvisioner>>,
    provisioning_timeout: Duration,
}

impl CeremonyService {
    pub fn new(storage: Arc<AuthStorage>, verifier: Arc<dyn CeremonyVerifier>) -> Self {
        Self {
            storage,
            verifier,
            provisioner: None,
            provisioning_timeout: Duration::from_secs(15),
        }
    }

    /// Provision a pod for every new registration
    pub fn with_provisioner(
        mut self,
        provisioner: Arc<dyn PodProvisioner>,
        timeout: Duration,
    ) -> Self {
        self.provisioner = Some(provisioner);
        self.provisioning_timeout = timeout;
        self
    }

    pub fn storage(&self) -> &Arc<AuthStorage> {
        &self.storage
    }

    /// Atomically consume the challenge embedded in a ceremony response
    async fn consume_response_challenge(
        &self,
        response: &Value,
    ) -> Result<ChallengeRecord, CeremonyError> {
        let client_data = parse_client_data(response)?;
        self.storage
            .consume_challenge(&client_data.challenge)
            .await?
            .ok_or(CeremonyError::ChallengeNotFoundExpiredOrUsed)
    }
}

impl std::fmt::Debug for CeremonyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CeremonyService")
            .field("storage", &self.storage)
            .field("provisioning", &self.provisioner.is_some())
            .field("provisioning_timeout", &self.provisioning_timeout)
            .finish()
    }
}

fn parse_identity(value: &str) -> Result<Identity, CeremonyError> {
    Identity::parse(value).ok_or(CeremonyError::IdentityInvalid)
}

fn random_salt() -> Result<Vec<u8>, CeremonyError> {
    let mut salt = vec![0u8; PRF_SALT_LEN];
    getrandom::fill(&mut salt).map_err(|e| CeremonyError::Internal(format!("randomness: {e}")))?;
    Ok(salt)
}

/// Ask the authenticator to evaluate its PRF with `salt` during the ceremony
fn attach_prf_salt(options: &mut Value, salt: &[u8]) {
    let Some(public_key) = options.get_mut("publicKey").and_then(Value::as_object_mut) else {
        return;
    };
    let extensions = public_key
        .entry("extensions")
        .or_insert_with(|| json!({}));
    if !extensions.is_object() {
        *extensions = json!({});
    }
    if let Some(extensions) = extensions.as_object_mut() {
        extensions.insert(
            "prf".to_string(),
            json!({ "eval": { "first": URL_SAFE_NO_PAD.encode(salt) } }),
        );
    }
}

/// Accept an https WebID without traversal sequences
fn sanitize_web_id(raw: &str) -> Result<String, CeremonyError> {
    let parsed = url::Url::parse(raw).map_err(|_| CeremonyError::InvalidWebId("not a valid URL"))?;
    if parsed.scheme() != "https" {
        return Err(CeremonyError::InvalidWebId("must use the https scheme"));
    }
    let lowered = raw.to_ascii_lowercase();
    if raw.contains("..") || lowered.contains("%2e%2e") {
        return Err(CeremonyError::InvalidWebId("contains invalid path sequences"));
    }
    Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_prf_salt() {
        let mut options = json!({ "publicKey": { "challenge": "c", "extensions": null } });
        attach_prf_salt(&mut options, &[0xff; 32]);
        assert_eq!(
            options.pointer("/publicKey/extensions/prf/eval/first"),
            Some(&json!(URL_SAFE_NO_PAD.encode([0xff; 32])))
        );

        let mut options = json!({ "publicKey": { "extensions": { "credProps": true } } });
        attach_prf_salt(&mut options, &[1; 32]);
        assert_eq!(options.pointer("/publicKey/extensions/credProps"), Some(&json!(true)));
        assert!(options.pointer("/publicKey/extensions/prf/eval/first").is_some());
    }

    #[test]
    fn test_sanitize_web_id() {
        assert_eq!(
            sanitize_web_id("https://alice.example.com/profile/card#me").unwrap(),
            "https://alice.example.com/profile/card#me"
        );
        assert!(sanitize_web_id("http://alice.example.com/card#me").is_err());
        assert!(sanitize_web_id("https://alice.example.com/a/../b").is_err());
        assert!(sanitize_web_id("https://alice.example.com/a/%2E%2e/b").is_err());
        assert!(sanitize_web_id("card#me").is_err());
    }

    #[test]
    fn test_request_aliases() {
        let req: AuthenticationVerifyRequest = serde_json::from_value(json!({
            "response": { "id": "x" },
            "pubkey": "ab",
        }))
        .unwrap();
        assert_eq!(req.identity, "ab");
        assert_eq!(req.assertion, json!({ "id": "x" }));

        let req: RegistrationVerifyRequest = serde_json::from_value(json!({
            "attestation": {},
            "identity": "cd",
            "webId": "https://x.example/card#me",
        }))
        .unwrap();
        assert_eq!(req.web_id.as_deref(), Some("https://x.example/card#me"));
    }

    #[test]
    fn test_verifier_error_mapping() {
        assert!(matches!(
            CeremonyError::from(VerifierError::Rejected("sig".into())),
            CeremonyError::CeremonyVerification(_)
        ));
        assert!(matches!(
            CeremonyError::from(VerifierError::MalformedResponse("x".into())),
            CeremonyError::MalformedCeremonyResponse(_)
        ));
        assert!(matches!(
            CeremonyError::from(VerifierError::State("x".into())),
            CeremonyError::Internal(_)
        ));
    }
}
