//! NIP-98 request authentication
//!
//! Provides the [`Nip98Json`] extractor for Axum handlers. It verifies the
//! `Authorization` header against the request URL, method and raw body
//! bytes, then parses the body as JSON.
//!
//! The URL is rebuilt from the configured public origin plus the request
//! path and query. `Host` and `X-Forwarded-*` headers are never consulted,
//! so a client cannot steer URL matching.

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::{header::AUTHORIZATION, Uri};
use nostr_passkey_core::{verify, Rejection, VerifiedIdentity, VerifyContext};
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::state::AppState;

/// A JSON body whose request carried a valid NIP-98 header
///
/// Rejects with 401 and the rejection's code before the body is parsed.
#[derive(Debug)]
pub struct Nip98Json<T> {
    pub identity: VerifiedIdentity,
    pub body: T,
}

impl<T> FromRequest<AppState> for Nip98Json<T>
where
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = match req.headers().get(AUTHORIZATION) {
            Some(value) => Some(
                value
                    .to_str()
                    .map_err(|_| ApiError::from(Rejection::TokenMalformed))?
                    .to_string(),
            ),
            None => None,
        };
        let url = request_url(&state.public_origin, req.uri());
        let method = req.method().as_str().to_string();

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;

        let context = VerifyContext::new(&url, &method)
            .with_body(&bytes)
            .allow_basic_scheme(state.allow_basic_nostr);
        let identity = verify(header.as_deref(), &context)?;

        let body = serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {e}")))?;

        Ok(Self { identity, body })
    }
}

/// `{origin}{path}?{query}` for the URL a client signed
pub fn request_url(public_origin: &str, uri: &Uri) -> String {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    format!("{}{}", public_origin.trim_end_matches('/'), path_and_query)
}
