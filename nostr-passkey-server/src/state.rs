//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;

use crate::ceremony::CeremonyService;
use crate::config::Config;

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    /// Ceremony orchestration (owns the storage)
    pub ceremonies: Arc<CeremonyService>,
    /// Public origin NIP-98 URLs are rebuilt from (no trailing slash)
    pub public_origin: Arc<str>,
    /// Accept the `Basic` NIP-98 header form
    pub allow_basic_nostr: bool,
}

impl AppState {
    pub fn new(ceremonies: Arc<CeremonyService>, config: &Config) -> Self {
        Self {
            ceremonies,
            public_origin: Arc::from(config.public_origin()),
            allow_basic_nostr: config.allow_basic_nostr,
        }
    }
}
