//! Registration ceremony handlers

use axum::{body::Bytes, extract::State, http::StatusCode, Json};

use crate::ceremony::{
    CeremonyOptions, IdentityResponse, RegistrationOptionsRequest, RegistrationVerifyRequest,
};
use crate::error::ApiError;
use crate::state::AppState;

/// POST /auth/register/options
///
/// Start registration. The returned `prfSalt` is also embedded in the
/// options' PRF extension; the client derives its Nostr key from the
/// authenticator's PRF output for it.
#[utoipa::path(
    post,
    path = "/auth/register/options",
    tag = "Registration",
    request_body = RegistrationOptionsRequest,
    responses(
        (status = 200, description = "Credential creation options", body = CeremonyOptions),
        (status = 400, description = "Invalid identity"),
        (status = 409, description = "Identity already registered")
    )
)]
pub async fn registration_options(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CeremonyOptions>, ApiError> {
    // Every field is optional, so an empty body is accepted.
    let request: RegistrationOptionsRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RegistrationOptionsRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {e}")))?
    };
    Ok(Json(state.ceremonies.registration_options(request).await?))
}

/// POST /auth/register/verify
///
/// Complete registration with the authenticator's attestation and the
/// identity derived from its PRF output.
#[utoipa::path(
    post,
    path = "/auth/register/verify",
    tag = "Registration",
    request_body = RegistrationVerifyRequest,
    responses(
        (status = 201, description = "Identity registered", body = IdentityResponse),
        (status = 400, description = "Invalid input, challenge or attestation"),
        (status = 409, description = "Identity already registered"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn verify_registration(
    State(state): State<AppState>,
    Json(request): Json<RegistrationVerifyRequest>,
) -> Result<(StatusCode, Json<IdentityResponse>), ApiError> {
    let registered = state.ceremonies.verify_registration(request).await?;
    Ok((StatusCode::CREATED, Json(registered)))
}
