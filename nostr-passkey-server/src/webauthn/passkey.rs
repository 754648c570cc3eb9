//! `CeremonyVerifier` backed by webauthn-rs passkeys
//!
//! The stored credential material is the serialized `Passkey`, which carries
//! the COSE public key and the library's own view of the credential.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;
use webauthn_rs::prelude::*;

use super::client_data::parse_client_data;
use super::config::WebAuthnConfig;
use super::verifier::{
    transports_from_response, CeremonyVerifier, IssuedCeremony, VerifiedAssertion,
    VerifiedRegistration, VerifierError,
};
use crate::store::{CredentialRecord, DeviceType};

/// The parts of a serialized passkey read back for bookkeeping
#[derive(Deserialize)]
struct PasskeyView {
    cred: CredentialView,
}

#[derive(Deserialize)]
struct CredentialView {
    #[serde(default)]
    counter: u32,
    #[serde(default)]
    backup_eligible: bool,
    #[serde(default)]
    backup_state: bool,
}

impl CeremonyVerifier for WebAuthnConfig {
    fn start_registration(
        &self,
        user_id: Uuid,
        user_name: &str,
        display_name: &str,
    ) -> Result<IssuedCeremony, VerifierError> {
        let (ccr, reg_state) = self
            .webauthn()
            .start_passkey_registration(user_id, user_name, display_name, None)
            .map_err(|e| VerifierError::Setup(format!("{:?}", e)))?;

        let options = to_json(&ccr)?;
        let challenge = options_challenge(&options)?;
        Ok(IssuedCeremony {
            options,
            challenge,
            state: to_json(&reg_state)?,
        })
    }

    fn finish_registration(
        &self,
        response: &Value,
        state: &Value,
    ) -> Result<VerifiedRegistration, VerifierError> {
        let client_data = parse_client_data(response)?;
        if client_data.ceremony_type != "webauthn.create" {
            return Err(VerifierError::Rejected(format!(
                "unexpected clientData type {}",
                client_data.ceremony_type
            )));
        }

        let reg: RegisterPublicKeyCredential = serde_json::from_value(response.clone())
            .map_err(|e| VerifierError::MalformedResponse(e.to_string()))?;
        let reg_state: PasskeyRegistration = serde_json::from_value(state.clone())
            .map_err(|e| VerifierError::State(e.to_string()))?;

        let passkey = self
            .webauthn()
            .finish_passkey_registration(&reg, &reg_state)
            .map_err(|e| VerifierError::Rejected(format!("{:?}", e)))?;

        let material =
            serde_json::to_vec(&passkey).map_err(|e| VerifierError::State(e.to_string()))?;
        let view: PasskeyView =
            serde_json::from_slice(&material).map_err(|e| VerifierError::State(e.to_string()))?;

        Ok(VerifiedRegistration {
            credential_id: base64_url_encode(passkey.cred_id()),
            public_key_bytes: material,
            counter: view.cred.counter,
            device_type: if view.cred.backup_eligible {
                DeviceType::MultiDevice
            } else {
                DeviceType::SingleDevice
            },
            backed_up: view.cred.backup_state,
            transports: transports_from_response(response),
        })
    }

    fn start_authentication(
        &self,
        credential: &CredentialRecord,
    ) -> Result<IssuedCeremony, VerifierError> {
        let passkey = load_passkey(credential)?;
        let (rcr, auth_state) = self
            .webauthn()
            .start_passkey_authentication(&[passkey])
            .map_err(|e| VerifierError::Setup(format!("{:?}", e)))?;

        let options = to_json(&rcr)?;
        let challenge = options_challenge(&options)?;
        Ok(IssuedCeremony {
            options,
            challenge,
            state: to_json(&auth_state)?,
        })
    }

    fn finish_authentication(
        &self,
        response: &Value,
        state: &Value,
        credential: &CredentialRecord,
    ) -> Result<VerifiedAssertion, VerifierError> {
        let assertion: PublicKeyCredential = serde_json::from_value(response.clone())
            .map_err(|e| VerifierError::MalformedResponse(e.to_string()))?;
        let auth_state: PasskeyAuthentication = serde_json::from_value(state.clone())
            .map_err(|e| VerifierError::State(e.to_string()))?;

        let auth_result = self
            .webauthn()
            .finish_passkey_authentication(&assertion, &auth_state)
            .map_err(|e| VerifierError::Rejected(format!("{:?}", e)))?;

        let mut passkey = load_passkey(credential)?;
        let updated_material = match passkey.update_credential(&auth_result) {
            Some(true) => Some(
                serde_json::to_vec(&passkey).map_err(|e| VerifierError::State(e.to_string()))?,
            ),
            _ => None,
        };

        Ok(VerifiedAssertion {
            credential_id: base64_url_encode(auth_result.cred_id()),
            counter: auth_result.counter(),
            updated_material,
        })
    }
}

fn load_passkey(credential: &CredentialRecord) -> Result<Passkey, VerifierError> {
    serde_json::from_slice(&credential.public_key_bytes).map_err(|e| {
        VerifierError::State(format!(
            "credential {} material unreadable: {}",
            credential.credential_id, e
        ))
    })
}

/// Base64url encode bytes
fn base64_url_encode(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes.as_ref())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, VerifierError> {
    serde_json::to_value(value).map_err(|e| VerifierError::State(e.to_string()))
}

fn options_challenge(options: &Value) -> Result<String, VerifierError> {
    options
        .pointer("/publicKey/challenge")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| VerifierError::Setup("options carry no challenge".into()))
}
