//! API integration tests for nostr-passkey-server.
//!
//! These tests drive the HTTP API with a software authenticator, covering
//! the full register/login flow, NIP-98 gating and replay protection.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use nostr_passkey_core::{token, NostrKeypair};
use nostr_passkey_server::{
    create_router, AppState, AuthStorage, CeremonyService, Config, MockAuthenticator,
    MockCeremonyVerifier,
};
use serde_json::{json, Value};
use tower::ServiceExt;

const ORIGIN: &str = "https://forum.example.com";
const LOGIN_VERIFY_URL: &str = "https://forum.example.com/auth/login/verify";

fn test_config() -> Config {
    Config {
        rp_id: "forum.example.com".to_string(),
        rp_origin: ORIGIN.to_string(),
        ..Config::default()
    }
}

/// Build the test router with in-memory storage and the mock verifier
fn create_test_app() -> Router {
    let config = test_config();
    let storage = Arc::new(AuthStorage::in_memory());
    let verifier = Arc::new(MockCeremonyVerifier::new("forum.example.com", ORIGIN));
    let ceremonies = Arc::new(CeremonyService::new(storage, verifier));
    create_router(AppState::new(ceremonies, &config), &config)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn signed_post(uri: &str, body: &[u8], authorization: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, authorization)
        .body(Body::from(body.to_vec()))
        .unwrap()
}

fn keypair_for(authenticator: &MockAuthenticator, prf_salt: &str) -> NostrKeypair {
    let salt = URL_SAFE_NO_PAD.decode(prf_salt).unwrap();
    NostrKeypair::derive_from_prf(&authenticator.prf(&salt)).unwrap()
}

/// Register through the API, returning the derived keypair
async fn register(app: &Router, authenticator: &MockAuthenticator) -> NostrKeypair {
    let (status, options) = send(app, post_json("/auth/register/options", &json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let prf_salt = options["prfSalt"].as_str().unwrap();
    let keypair = keypair_for(authenticator, prf_salt);
    let attestation = authenticator.create(&options["options"]).unwrap();

    let (status, body) = send(
        app,
        post_json(
            "/auth/register/verify",
            &json!({ "response": attestation, "pubkey": keypair.identity().as_str() }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    keypair
}

/// Fetch login options and sign an assertion for them
async fn login_body(
    app: &Router,
    authenticator: &mut MockAuthenticator,
    identity: &str,
) -> (String, Vec<u8>) {
    let (status, options) = send(
        app,
        post_json("/auth/login/options", &json!({ "identity": identity })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{options}");
    let prf_salt = options["prfSalt"].as_str().unwrap().to_string();
    let assertion = authenticator.get(&options["options"]).unwrap();
    let body = json!({ "assertion": assertion, "identity": identity }).to_string();
    (prf_salt, body.into_bytes())
}

fn nip98(keypair: &NostrKeypair, body: &[u8]) -> String {
    token::authorization_header(
        &token::encode(keypair, LOGIN_VERIFY_URL, "POST", Some(body)).unwrap(),
    )
}

// ============================================================================
// Health & Readiness Tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let app = create_test_app();
    let (status, json) = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["storage_available"], true);
    assert_eq!(json["storage_persistent"], false);
    assert_eq!(json["service"], "nostr-passkey-server");
}

#[tokio::test]
async fn test_ready_endpoint_returns_ok() {
    let app = create_test_app();
    let (status, json) = send(
        &app,
        Request::builder().uri("/ready").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], true);
}

#[tokio::test]
async fn test_openapi_spec_endpoint() {
    let app = create_test_app();
    let (status, json) = send(
        &app,
        Request::builder()
            .uri("/api-docs/openapi.json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["info"]["title"], "Nostr Passkey API");
    assert!(json["paths"]["/auth/login/verify"].is_object());
}

// ============================================================================
// Ceremony Tests
// ============================================================================

#[tokio::test]
async fn test_register_and_login_flow() {
    let app = create_test_app();
    let mut authenticator = MockAuthenticator::with_secret(ORIGIN, [1u8; 32]);
    let keypair = register(&app, &authenticator).await;
    let identity = keypair.identity().as_str();

    let (prf_salt, body) = login_body(&app, &mut authenticator, identity).await;
    // Login evaluates the same salt, so the same key comes back.
    assert_eq!(keypair_for(&authenticator, &prf_salt).identity(), keypair.identity());

    let (status, json) = send(
        &app,
        signed_post("/auth/login/verify", &body, &nip98(&keypair, &body)),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["ok"], true);
    assert_eq!(json["identity"], identity);
    assert_eq!(json["didNostr"], format!("did:nostr:{identity}"));
    assert!(json["webId"].is_null());
    assert!(json["podUrl"].is_null());
}

#[tokio::test]
async fn test_registration_options_accept_empty_body() {
    let app = create_test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/auth/register/options")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["options"]["publicKey"]["extensions"]["prf"]["eval"]["first"],
        json["prfSalt"]
    );
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let app = create_test_app();
    let authenticator = MockAuthenticator::with_secret(ORIGIN, [2u8; 32]);
    let keypair = register(&app, &authenticator).await;

    let (status, json) = send(
        &app,
        post_json(
            "/auth/register/options",
            &json!({ "identity": keypair.identity().as_str() }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "IDENTITY_ALREADY_REGISTERED");
}

#[tokio::test]
async fn test_replayed_login_rejected() {
    let app = create_test_app();
    let mut authenticator = MockAuthenticator::with_secret(ORIGIN, [3u8; 32]);
    let keypair = register(&app, &authenticator).await;

    let (_, body) = login_body(&app, &mut authenticator, keypair.identity().as_str()).await;
    let authorization = nip98(&keypair, &body);

    let (status, _) = send(&app, signed_post("/auth/login/verify", &body, &authorization)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&app, signed_post("/auth/login/verify", &body, &authorization)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "CHALLENGE_NOT_FOUND");
}

#[tokio::test]
async fn test_counter_regression_rejected() {
    let app = create_test_app();
    let mut authenticator = MockAuthenticator::with_secret(ORIGIN, [4u8; 32]);
    let keypair = register(&app, &authenticator).await;
    let identity = keypair.identity().as_str().to_string();

    for _ in 0..2 {
        let (_, body) = login_body(&app, &mut authenticator, &identity).await;
        let (status, _) = send(
            &app,
            signed_post("/auth/login/verify", &body, &nip98(&keypair, &body)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let mut clone = authenticator.clone();
    clone.set_counter(0);
    let (_, body) = login_body(&app, &mut clone, &identity).await;
    let (status, json) = send(
        &app,
        signed_post("/auth/login/verify", &body, &nip98(&keypair, &body)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "COUNTER_REGRESSION");
}

#[tokio::test]
async fn test_login_requires_nip98_header() {
    let app = create_test_app();
    let mut authenticator = MockAuthenticator::with_secret(ORIGIN, [5u8; 32]);
    let keypair = register(&app, &authenticator).await;
    let (_, body) = login_body(&app, &mut authenticator, keypair.identity().as_str()).await;

    let request = Request::builder()
        .method("POST")
        .uri("/auth/login/verify")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "HEADER_MISSING");
}

#[tokio::test]
async fn test_nip98_signed_by_other_identity_forbidden() {
    let app = create_test_app();
    let mut authenticator = MockAuthenticator::with_secret(ORIGIN, [6u8; 32]);
    let keypair = register(&app, &authenticator).await;
    let (_, body) = login_body(&app, &mut authenticator, keypair.identity().as_str()).await;

    let intruder = NostrKeypair::generate().unwrap();
    let (status, json) = send(
        &app,
        signed_post("/auth/login/verify", &body, &nip98(&intruder, &body)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "ASSERTION_IDENTITY_MISMATCH");
}

#[tokio::test]
async fn test_nip98_payload_must_match_body() {
    let app = create_test_app();
    let mut authenticator = MockAuthenticator::with_secret(ORIGIN, [7u8; 32]);
    let keypair = register(&app, &authenticator).await;
    let (_, body) = login_body(&app, &mut authenticator, keypair.identity().as_str()).await;

    let authorization = nip98(&keypair, b"{\"identity\":\"something else\"}");
    let (status, json) = send(&app, signed_post("/auth/login/verify", &body, &authorization)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "PAYLOAD_HASH_MISMATCH");
}

#[tokio::test]
async fn test_nip98_url_from_configured_origin() {
    let app = create_test_app();
    let mut authenticator = MockAuthenticator::with_secret(ORIGIN, [8u8; 32]);
    let keypair = register(&app, &authenticator).await;
    let (_, body) = login_body(&app, &mut authenticator, keypair.identity().as_str()).await;

    // Signed for the host an attacker would put in Host / X-Forwarded-Host.
    let authorization = token::authorization_header(
        &token::encode(
            &keypair,
            "https://attacker.example.net/auth/login/verify",
            "POST",
            Some(&body),
        )
        .unwrap(),
    );
    let request = Request::builder()
        .method("POST")
        .uri("/auth/login/verify")
        .header(header::HOST, "attacker.example.net")
        .header("x-forwarded-host", "attacker.example.net")
        .header(header::AUTHORIZATION, authorization)
        .body(Body::from(body))
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "URL_MISMATCH");
}

#[tokio::test]
async fn test_basic_scheme_disabled_by_default() {
    let app = create_test_app();
    let mut authenticator = MockAuthenticator::with_secret(ORIGIN, [9u8; 32]);
    let keypair = register(&app, &authenticator).await;
    let (_, body) = login_body(&app, &mut authenticator, keypair.identity().as_str()).await;

    let authorization = token::basic_authorization_header(
        &token::encode(&keypair, LOGIN_VERIFY_URL, "POST", Some(&body)).unwrap(),
    );
    let (status, json) = send(&app, signed_post("/auth/login/verify", &body, &authorization)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "HEADER_MISSING");
}

#[tokio::test]
async fn test_login_for_unknown_identity() {
    let app = create_test_app();
    let (status, json) = send(
        &app,
        post_json("/auth/login/options", &json!({ "pubkey": "e".repeat(64) })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "CREDENTIAL_NOT_FOUND");

    let (status, json) = send(
        &app,
        post_json("/auth/login/options", &json!({ "identity": "E".repeat(64) })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "IDENTITY_INVALID");
}

#[tokio::test]
async fn test_wrong_salt_cannot_log_in() {
    let app = create_test_app();
    let mut authenticator = MockAuthenticator::with_secret(ORIGIN, [10u8; 32]);
    let registered = register(&app, &authenticator).await;

    // A client that evaluated the PRF with a different salt holds a different key.
    let wrong = keypair_for(&authenticator, &URL_SAFE_NO_PAD.encode([0xaa; 32]));
    assert_ne!(wrong.identity(), registered.identity());

    let (_, body) = login_body(&app, &mut authenticator, registered.identity().as_str()).await;
    let (status, json) = send(
        &app,
        signed_post("/auth/login/verify", &body, &nip98(&wrong, &body)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "ASSERTION_IDENTITY_MISMATCH");
}
