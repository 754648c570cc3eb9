//! Nostr Passkey Server - passkey registration and NIP-98 authenticated login
//!
//! Endpoints:
//! - POST /auth/register/options, /auth/register/verify
//! - POST /auth/login/options, /auth/login/verify (NIP-98)
//! - GET /health, /ready, /api-docs/openapi.json

use std::net::SocketAddr;
use std::sync::Arc;

use nostr_passkey_server::{
    create_router, spawn_expiry_sweep, AppState, AuthStorage, CeremonyService, Config,
    CssPodClient, WebAuthnConfig,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let config = Config::from_env();

    let storage = Arc::new(AuthStorage::from_config(&config).await?);
    let webauthn = WebAuthnConfig::from_settings(&config.rp_id, &config.rp_origin, &config.rp_name)?;
    tracing::info!(rp_id = %config.rp_id, rp_origin = %config.rp_origin, "WebAuthn relying party configured");

    let mut ceremonies = CeremonyService::new(storage.clone(), Arc::new(webauthn));
    match config.pod_base_url.as_deref() {
        Some(base) => match CssPodClient::new(base) {
            Ok(client) => {
                tracing::info!(pod_base_url = %client.base_url(), "Pod provisioning enabled");
                ceremonies =
                    ceremonies.with_provisioner(Arc::new(client), config.provisioning_timeout());
            }
            Err(e) => tracing::warn!(error = %e, "Pod provisioning disabled"),
        },
        None => tracing::warn!("POD_BASE_URL is not set, skipping pod provisioning"),
    }

    let sweep = spawn_expiry_sweep(storage.clone(), config.challenge_sweep_interval());
    let state = AppState::new(Arc::new(ceremonies), &config);
    let app = create_router(state, &config);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Nostr passkey server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweep.abort();
    storage.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
