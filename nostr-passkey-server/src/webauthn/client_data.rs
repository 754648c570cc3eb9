//! `clientDataJSON` decoding

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;

use super::VerifierError;

/// The fields of `clientDataJSON` the server relies on
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientData {
    /// `webauthn.create` or `webauthn.get`
    #[serde(rename = "type")]
    pub ceremony_type: String,
    /// base64url challenge as issued in the options
    pub challenge: String,
    #[serde(default)]
    pub origin: String,
}

/// Decode `response.clientDataJSON` from a browser credential response.
pub fn parse_client_data(response: &Value) -> Result<ClientData, VerifierError> {
    let encoded = response
        .pointer("/response/clientDataJSON")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            VerifierError::MalformedResponse("missing response.clientDataJSON".into())
        })?;

    let raw = URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .or_else(|_| URL_SAFE.decode(encoded))
        .map_err(|e| VerifierError::MalformedResponse(format!("clientDataJSON: {e}")))?;

    let client_data: ClientData = serde_json::from_slice(&raw)
        .map_err(|e| VerifierError::MalformedResponse(format!("clientDataJSON: {e}")))?;

    if client_data.challenge.is_empty() {
        return Err(VerifierError::MalformedResponse(
            "clientDataJSON has an empty challenge".into(),
        ));
    }
    Ok(client_data)
}
