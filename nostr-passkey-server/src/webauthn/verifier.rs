//! The ceremony verifier seam

use serde_json::Value;
use uuid::Uuid;

use crate::store::{CredentialRecord, DeviceType};

/// Ceremony verifier errors
#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    /// The browser response could not be parsed
    #[error("Malformed ceremony response: {0}")]
    MalformedResponse(String),

    /// The response parsed but failed cryptographic or policy checks
    #[error("Ceremony rejected: {0}")]
    Rejected(String),

    /// Stored ceremony state or credential material could not be used
    #[error("Ceremony state error: {0}")]
    State(String),

    /// Options could not be generated
    #[error("Ceremony setup failed: {0}")]
    Setup(String),
}

/// Options handed to the browser plus what the server keeps
#[derive(Debug, Clone)]
pub struct IssuedCeremony {
    /// JSON for `navigator.credentials.create/get`
    pub options: Value,
    /// The challenge as it will appear in `clientDataJSON` (base64url)
    pub challenge: String,
    /// Opaque state needed to finish the ceremony
    pub state: Value,
}

/// Outcome of a verified registration
#[derive(Debug, Clone)]
pub struct VerifiedRegistration {
    pub credential_id: String,
    /// Material needed to verify later assertions
    pub public_key_bytes: Vec<u8>,
    pub counter: u32,
    pub device_type: DeviceType,
    pub backed_up: bool,
    pub transports: Vec<String>,
}

/// Outcome of a verified assertion
#[derive(Debug, Clone)]
pub struct VerifiedAssertion {
    pub credential_id: String,
    pub counter: u32,
    /// Refreshed credential material to persist alongside the counter
    pub updated_material: Option<Vec<u8>>,
}

/// Cryptographic half of the registration and authentication ceremonies
///
/// Implementations check signatures, origins and challenges; they never
/// touch storage. Replay protection (single-use challenges, monotonic
/// counters) is enforced by the caller.
pub trait CeremonyVerifier: Send + Sync {
    fn start_registration(
        &self,
        user_id: Uuid,
        user_name: &str,
        display_name: &str,
    ) -> Result<IssuedCeremony, VerifierError>;

    fn finish_registration(
        &self,
        response: &Value,
        state: &Value,
    ) -> Result<VerifiedRegistration, VerifierError>;

    fn start_authentication(
        &self,
        credential: &CredentialRecord,
    ) -> Result<IssuedCeremony, VerifierError>;

    fn finish_authentication(
        &self,
        response: &Value,
        state: &Value,
        credential: &CredentialRecord,
    ) -> Result<VerifiedAssertion, VerifierError>;
}

/// `response.transports` from a browser registration response, if any
pub fn transports_from_response(response: &Value) -> Vec<String> {
    response
        .pointer("/response/transports")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
