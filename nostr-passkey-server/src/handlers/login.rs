//! Authentication ceremony handlers

use axum::{extract::State, Json};

use crate::auth::Nip98Json;
use crate::ceremony::{
    AuthenticationOptionsRequest, AuthenticationVerifyRequest, CeremonyOptions, IdentityResponse,
};
use crate::error::ApiError;
use crate::state::AppState;

/// POST /auth/login/options
///
/// Start authentication for a registered identity. `prfSalt` is the salt
/// stored at registration.
#[utoipa::path(
    post,
    path = "/auth/login/options",
    tag = "Authentication",
    request_body = AuthenticationOptionsRequest,
    responses(
        (status = 200, description = "Credential request options", body = CeremonyOptions),
        (status = 400, description = "Invalid identity"),
        (status = 404, description = "Identity not registered")
    )
)]
pub async fn authentication_options(
    State(state): State<AppState>,
    Json(request): Json<AuthenticationOptionsRequest>,
) -> Result<Json<CeremonyOptions>, ApiError> {
    Ok(Json(state.ceremonies.authentication_options(request).await?))
}

/// POST /auth/login/verify
///
/// Complete authentication. Requires an `Authorization: Nostr <token>`
/// header signed by the claimed identity over this URL, method and body.
#[utoipa::path(
    post,
    path = "/auth/login/verify",
    tag = "Authentication",
    request_body = AuthenticationVerifyRequest,
    security(("nip98" = [])),
    responses(
        (status = 200, description = "Authenticated", body = IdentityResponse),
        (status = 400, description = "Invalid input, challenge or assertion"),
        (status = 401, description = "NIP-98 rejected or counter did not advance"),
        (status = 403, description = "NIP-98 signer differs from claimed identity"),
        (status = 404, description = "Credential not found")
    )
)]
pub async fn verify_authentication(
    State(state): State<AppState>,
    request: Nip98Json<AuthenticationVerifyRequest>,
) -> Result<Json<IdentityResponse>, ApiError> {
    let authenticated = state
        .ceremonies
        .verify_authentication(request.identity.identity(), request.body)
        .await?;
    Ok(Json(authenticated))
}
