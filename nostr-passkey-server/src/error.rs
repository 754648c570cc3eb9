//! API error handling module
//!
//! Provides a unified error type for all API endpoints with structured error variants.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use nostr_passkey_core::Rejection;
use thiserror::Error;

use crate::ceremony::CeremonyError;

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request - client provided invalid input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// NIP-98 header rejected
    #[error("NIP-98 authorization failed: {0}")]
    Nip98(Rejection),

    /// Ceremony failure
    #[error("{0}")]
    Ceremony(#[from] CeremonyError),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Nip98(_) => StatusCode::UNAUTHORIZED,
            Self::Ceremony(ref e) => match e {
                CeremonyError::IdentityInvalid
                | CeremonyError::InvalidWebId(_)
                | CeremonyError::ChallengeNotFoundExpiredOrUsed
                | CeremonyError::CeremonyMismatch
                | CeremonyError::ChallengeIdentityMismatch
                | CeremonyError::CredentialMismatch
                | CeremonyError::MalformedCeremonyResponse(_)
                | CeremonyError::CeremonyVerification(_) => StatusCode::BAD_REQUEST,

                CeremonyError::AssertionIdentityMismatch => StatusCode::FORBIDDEN,
                CeremonyError::CounterRegression { .. } => StatusCode::UNAUTHORIZED,
                CeremonyError::CredentialNotFound => StatusCode::NOT_FOUND,
                CeremonyError::IdentityAlreadyRegistered => StatusCode::CONFLICT,

                CeremonyError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
                CeremonyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Get the error code for programmatic error handling
    fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "INVALID_INPUT",
            Self::Nip98(rejection) => rejection.code(),
            Self::Ceremony(ref e) => match e {
                CeremonyError::IdentityInvalid => "IDENTITY_INVALID",
                CeremonyError::InvalidWebId(_) => "WEBID_INVALID",
                CeremonyError::IdentityAlreadyRegistered => "IDENTITY_ALREADY_REGISTERED",
                CeremonyError::ChallengeNotFoundExpiredOrUsed => "CHALLENGE_NOT_FOUND",
                CeremonyError::CeremonyMismatch => "CEREMONY_MISMATCH",
                CeremonyError::ChallengeIdentityMismatch => "CHALLENGE_IDENTITY_MISMATCH",
                CeremonyError::AssertionIdentityMismatch => "ASSERTION_IDENTITY_MISMATCH",
                CeremonyError::CredentialNotFound => "CREDENTIAL_NOT_FOUND",
                CeremonyError::CredentialMismatch => "CREDENTIAL_MISMATCH",
                CeremonyError::CounterRegression { .. } => "COUNTER_REGRESSION",
                CeremonyError::MalformedCeremonyResponse(_) => "MALFORMED_CEREMONY_RESPONSE",
                CeremonyError::CeremonyVerification(_) => "CEREMONY_VERIFICATION_FAILED",
                CeremonyError::Store(_) => "STORE_UNAVAILABLE",
                CeremonyError::Internal(_) => "INTERNAL_ERROR",
            },
        }
    }

    /// Get sanitized error message for client response
    fn client_message(&self) -> String {
        match self {
            Self::Nip98(rejection) => rejection.to_string(),
            Self::Ceremony(ref e) => match e {
                CeremonyError::MalformedCeremonyResponse(_) => {
                    "Missing or invalid WebAuthn response".to_string()
                }
                CeremonyError::CeremonyVerification(_) => "WebAuthn verification failed".to_string(),
                CeremonyError::CounterRegression { .. } => {
                    "Credential counter did not advance".to_string()
                }
                CeremonyError::Store(_) => "Storage temporarily unavailable".to_string(),
                CeremonyError::Internal(_) => "Internal server error".to_string(),
                other => other.to_string(),
            },
            // For other errors, use the Display message
            _ => self.to_string(),
        }
    }

    /// Get the error category for logging
    fn error_category(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Nip98(_) => "nip98",
            Self::Ceremony(_) => "ceremony",
        }
    }

    fn is_server_fault(&self) -> bool {
        matches!(
            self,
            Self::Ceremony(CeremonyError::Store(_))
                | Self::Ceremony(CeremonyError::Internal(_))
                | Self::Ceremony(CeremonyError::CounterRegression { .. })
        )
    }
}

impl From<Rejection> for ApiError {
    fn from(rejection: Rejection) -> Self {
        Self::Nip98(rejection)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.error_category();
        let code = self.error_code();
        let internal_message = self.to_string();
        let client_message = self.client_message();

        // Log based on severity, always including internal details
        if self.is_server_fault() {
            tracing::error!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Server error"
            );
        } else {
            tracing::warn!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Client error"
            );
        }

        // All error responses include a `code` field for programmatic error handling
        let body = serde_json::json!({
            "error": client_message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}
