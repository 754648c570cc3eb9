//! OpenAPI documentation configuration
//!
//! Generates the OpenAPI 3 document served at `/api-docs/openapi.json`.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::ceremony::{
    AuthenticationOptionsRequest, AuthenticationVerifyRequest, CeremonyOptions, IdentityResponse,
    RegistrationOptionsRequest, RegistrationVerifyRequest,
};
use crate::handlers::{HealthResponse, ReadyResponse};

/// Nostr Passkey API - OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Nostr Passkey API",
        version = "0.1.0",
        description = r#"
## Passkey-derived Nostr identities

A hardware authenticator's PRF output is the only secret. The client derives
a secp256k1 keypair from it with HKDF-SHA256; the x-only public key is the
user's Nostr identity (`did:nostr:<pubkey>`).

### Flow

1. `POST /auth/register/options` returns WebAuthn options and a PRF salt
2. The client runs the ceremony, derives its key and calls `POST /auth/register/verify`
3. Later logins use `POST /auth/login/options` and `POST /auth/login/verify`,
   the latter authenticated with a NIP-98 `Authorization: Nostr <token>` header

Challenges are single-use and expire after five minutes. Authenticator
counters must strictly increase.
"#,
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    tags(
        (name = "Registration", description = "Passkey registration bound to a derived Nostr identity"),
        (name = "Authentication", description = "Passkey login with NIP-98 proof of key ownership"),
        (name = "Health", description = "Service health and readiness endpoints")
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::health::ready,
        crate::handlers::register::registration_options,
        crate::handlers::register::verify_registration,
        crate::handlers::login::authentication_options,
        crate::handlers::login::verify_authentication,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            RegistrationOptionsRequest,
            RegistrationVerifyRequest,
            AuthenticationOptionsRequest,
            AuthenticationVerifyRequest,
            CeremonyOptions,
            IdentityResponse,
        )
    ),
    modifiers(&Nip98Security)
)]
pub struct ApiDoc;

/// Registers the `nip98` Authorization header scheme
struct Nip98Security;

impl Modify for Nip98Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "nip98",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                "Authorization",
                "`Nostr <base64 kind-27235 event>`",
            ))),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_ceremony_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/auth/register/options",
            "/auth/register/verify",
            "/auth/login/options",
            "/auth/login/verify",
            "/health",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("nip98"));
    }
}
