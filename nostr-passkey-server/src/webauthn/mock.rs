//! Software authenticator and matching verifier
//!
//! `MockAuthenticator` plays the browser side: it answers `create`/`get`
//! with responses shaped like the WebAuthn JSON encoding, keeps a signature
//! counter and evaluates a PRF (`sha256(device_secret || salt)`).
//! `MockCeremonyVerifier` checks those responses the way a real verifier
//! checks attestations and assertions: challenge, ceremony type, and a
//! signature bound to the stored credential material.
//!
//! Neither provides any security. They exist so ceremonies can be exercised
//! end to end without a hardware authenticator.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::client_data::parse_client_data;
use super::verifier::{
    transports_from_response, CeremonyVerifier, IssuedCeremony, VerifiedAssertion,
    VerifiedRegistration, VerifierError,
};
use crate::store::{CredentialRecord, DeviceType};

const CREATE_TYPE: &str = "webauthn.create";
const GET_TYPE: &str = "webauthn.get";

/// Verifier for responses produced by [`MockAuthenticator`]
#[derive(Debug, Clone)]
pub struct MockCeremonyVerifier {
    rp_id: String,
    origin: String,
}

impl MockCeremonyVerifier {
    pub fn new(rp_id: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            rp_id: rp_id.into(),
            origin: origin.into(),
        }
    }

    fn issue(&self, options: Value, challenge: String, ceremony: &str) -> IssuedCeremony {
        IssuedCeremony {
            options,
            state: json!({ "challenge": challenge, "ceremony": ceremony }),
            challenge,
        }
    }

    fn check_client_data(
        &self,
        response: &Value,
        state: &Value,
        expected_type: &str,
    ) -> Result<Vec<u8>, VerifierError> {
        let client_data = parse_client_data(response)?;
        let expected_challenge = state
            .get("challenge")
            .and_then(Value::as_str)
            .ok_or_else(|| VerifierError::State("state has no challenge".into()))?;

        if client_data.ceremony_type != expected_type {
            return Err(VerifierError::Rejected(format!(
                "unexpected clientData type {}",
                client_data.ceremony_type
            )));
        }
        if client_data.challenge != expected_challenge {
            return Err(VerifierError::Rejected("challenge mismatch".into()));
        }
        if client_data.origin != self.origin {
            return Err(VerifierError::Rejected(format!(
                "unexpected origin {}",
                client_data.origin
            )));
        }

        raw_client_data(response)
    }
}

impl CeremonyVerifier for MockCeremonyVerifier {
    fn start_registration(
        &self,
        user_id: Uuid,
        user_name: &str,
        display_name: &str,
    ) -> Result<IssuedCeremony, VerifierError> {
        let challenge = random_challenge()?;
        let options = json!({
            "publicKey": {
                "challenge": challenge,
                "rp": { "id": self.rp_id, "name": self.rp_id },
                "user": {
                    "id": URL_SAFE_NO_PAD.encode(user_id.as_bytes()),
                    "name": user_name,
                    "displayName": display_name,
                },
                "pubKeyCredParams": [{ "type": "public-key", "alg": -7 }],
                "authenticatorSelection": { "residentKey": "preferred", "userVerification": "required" },
            }
        });
        Ok(self.issue(options, challenge, "registration"))
    }

    fn finish_registration(
        &self,
        response: &Value,
        state: &Value,
    ) -> Result<VerifiedRegistration, VerifierError> {
        self.check_client_data(response, state, CREATE_TYPE)?;

        let credential_id = string_field(response, "/id")?;
        let public_key = string_field(response, "/response/publicKey")?;
        let public_key_bytes = URL_SAFE_NO_PAD
            .decode(public_key)
            .map_err(|e| VerifierError::MalformedResponse(format!("publicKey: {e}")))?;

        Ok(VerifiedRegistration {
            credential_id,
            public_key_bytes,
            counter: counter_field(response)?,
            device_type: if bool_field(response, "/response/backupEligible") {
                DeviceType::MultiDevice
            } else {
                DeviceType::SingleDevice
            },
            backed_up: bool_field(response, "/response/backupState"),
            transports: transports_from_response(response),
        })
    }

    fn start_authentication(
        &self,
        credential: &CredentialRecord,
    ) -> Result<IssuedCeremony, VerifierError> {
        let challenge = random_challenge()?;
        let options = json!({
            "publicKey": {
                "challenge": challenge,
                "rpId": self.rp_id,
                "allowCredentials": [{ "type": "public-key", "id": credential.credential_id }],
                "userVerification": "required",
            }
        });
        Ok(self.issue(options, challenge, "authentication"))
    }

    fn finish_authentication(
        &self,
        response: &Value,
        state: &Value,
        credential: &CredentialRecord,
    ) -> Result<VerifiedAssertion, VerifierError> {
        let client_data = self.check_client_data(response, state, GET_TYPE)?;
        let credential_id = string_field(response, "/id")?;
        let counter = counter_field(response)?;

        let signature = string_field(response, "/response/signature")?;
        let expected = assertion_signature(&credential.public_key_bytes, &client_data, counter);
        if signature != expected {
            return Err(VerifierError::Rejected("assertion signature invalid".into()));
        }

        Ok(VerifiedAssertion {
            credential_id,
            counter,
            updated_material: None,
        })
    }
}

/// A software authenticator holding one credential
#[derive(Debug, Clone)]
pub struct MockAuthenticator {
    credential_id: String,
    device_secret: [u8; 32],
    origin: String,
    counter: u32,
    backup_eligible: bool,
}

impl MockAuthenticator {
    /// A deterministic authenticator
    pub fn with_secret(origin: impl Into<String>, device_secret: [u8; 32]) -> Self {
        let credential_id = URL_SAFE_NO_PAD.encode(&Sha256::digest(device_secret)[..16]);
        Self {
            credential_id,
            device_secret,
            origin: origin.into(),
            counter: 0,
            backup_eligible: true,
        }
    }

    pub fn credential_id(&self) -> &str {
        &self.credential_id
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Force the next assertion's counter base (simulates a cloned authenticator)
    pub fn set_counter(&mut self, counter: u32) {
        self.counter = counter;
    }

    /// PRF extension output for a salt
    pub fn prf(&self, salt: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.device_secret);
        hasher.update(salt);
        hasher.finalize().into()
    }

    /// Answer `navigator.credentials.create` for the options' challenge
    pub fn create(&self, options: &Value) -> Result<Value, VerifierError> {
        let challenge = string_field(options, "/publicKey/challenge")?;
        let client_data = self.client_data(CREATE_TYPE, &challenge);
        Ok(json!({
            "id": self.credential_id,
            "rawId": self.credential_id,
            "type": "public-key",
            "response": {
                "clientDataJSON": URL_SAFE_NO_PAD.encode(client_data),
                "publicKey": URL_SAFE_NO_PAD.encode(self.public_key()),
                "counter": self.counter,
                "backupEligible": self.backup_eligible,
                "backupState": self.backup_eligible,
                "transports": ["internal", "hybrid"],
            }
        }))
    }

    /// Answer `navigator.credentials.get`, incrementing the counter first
    pub fn get(&mut self, options: &Value) -> Result<Value, VerifierError> {
        let challenge = string_field(options, "/publicKey/challenge")?;
        self.counter = self.counter.saturating_add(1);

        let client_data = self.client_data(GET_TYPE, &challenge);
        let signature = assertion_signature(&self.public_key(), client_data.as_bytes(), self.counter);
        Ok(json!({
            "id": self.credential_id,
            "rawId": self.credential_id,
            "type": "public-key",
            "response": {
                "clientDataJSON": URL_SAFE_NO_PAD.encode(client_data),
                "authenticatorData": "",
                "signature": signature,
                "counter": self.counter,
            }
        }))
    }

    fn public_key(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(b"mock-public-key");
        hasher.update(self.device_secret);
        hasher.finalize().to_vec()
    }

    fn client_data(&self, ceremony_type: &str, challenge: &str) -> String {
        json!({
            "type": ceremony_type,
            "challenge": challenge,
            "origin": self.origin,
        })
        .to_string()
    }
}

fn assertion_signature(public_key: &[u8], client_data: &[u8], counter: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(public_key);
    hasher.update(client_data);
    hasher.update(counter.to_be_bytes());
    hex::encode(hasher.finalize())
}

fn random_challenge() -> Result<String, VerifierError> {
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes).map_err(|e| VerifierError::Setup(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn raw_client_data(response: &Value) -> Result<Vec<u8>, VerifierError> {
    let encoded = string_field(response, "/response/clientDataJSON")?;
    URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| VerifierError::MalformedResponse(format!("clientDataJSON: {e}")))
}

fn string_field(value: &Value, pointer: &str) -> Result<String, VerifierError> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| VerifierError::MalformedResponse(format!("missing {pointer}")))
}

fn bool_field(value: &Value, pointer: &str) -> bool {
    value.pointer(pointer).and_then(Value::as_bool).unwrap_or(false)
}

fn counter_field(value: &Value) -> Result<u32, VerifierError> {
    value
        .pointer("/response/counter")
        .and_then(Value::as_u64)
        .and_then(|c| u32::try_from(c).ok())
        .ok_or_else(|| VerifierError::MalformedResponse("missing /response/counter".into()))
}
