//! Challenge and credential storage
//!
//! Two record kinds live here:
//! - **Challenges**: single-use, 5-minute values issued at the start of a
//!   ceremony. [`AuthStorage::consume_challenge`] is the only way to flip
//!   `used`, and exactly one concurrent caller can win it.
//! - **Credentials**: one authenticator per identity. The replay counter only
//!   moves forward, through [`AuthStorage::update_counter`].
//!
//! PostgreSQL is the production backend. Without `DATABASE_URL` the server
//! falls back to an in-memory backend with the same contracts (useful for
//! development and tests, but everything is lost on restart).

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nostr_passkey_core::Identity;
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;

/// Lifetime of an issued challenge (5 minutes)
pub const CHALLENGE_TTL_SECS: i64 = 300;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),
}

/// Which ceremony a challenge was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyKind {
    Registration,
    Authentication,
}

impl CeremonyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Authentication => "authentication",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "registration" => Some(Self::Registration),
            "authentication" => Some(Self::Authentication),
            _ => None,
        }
    }
}

/// A challenge about to be persisted
#[derive(Debug, Clone)]
pub struct NewChallenge {
    pub challenge: String,
    pub ceremony: CeremonyKind,
    /// Identity the challenge is bound to (authentication only)
    pub identity: Option<Identity>,
    pub prf_salt: Option<Vec<u8>>,
    /// Serialized ceremony verifier state needed to finish the ceremony
    pub state: serde_json::Value,
    pub expires_at: DateTime<Utc>,
}

impl NewChallenge {
    /// Expiry of a challenge issued now.
    pub fn default_expiry() -> DateTime<Utc> {
        Utc::now() + chrono::Duration::seconds(CHALLENGE_TTL_SECS)
    }
}

/// A stored challenge
#[derive(Debug, Clone)]
pub struct ChallengeRecord {
    pub id: Uuid,
    pub challenge: String,
    pub ceremony: CeremonyKind,
    pub identity: Option<Identity>,
    pub used: bool,
    pub prf_salt: Option<Vec<u8>>,
    pub state: serde_json::Value,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Whether an authenticator's key material is bound to one device or synced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceType {
    SingleDevice,
    MultiDevice,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleDevice => "singleDevice",
            Self::MultiDevice => "multiDevice",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "singleDevice" => Some(Self::SingleDevice),
            "multiDevice" => Some(Self::MultiDevice),
            _ => None,
        }
    }
}

/// A credential about to be persisted
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub credential_id: String,
    pub identity: Identity,
    /// Verifier-specific credential material (public key and metadata)
    pub public_key_bytes: Vec<u8>,
    pub counter: u32,
    pub device_type: DeviceType,
    pub backed_up: bool,
    pub transports: Vec<String>,
    pub prf_salt: Vec<u8>,
    pub web_id: Option<String>,
    pub pod_url: Option<String>,
}

/// A stored credential
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub credential_id: String,
    pub identity: Identity,
    pub did_nostr: String,
    pub public_key_bytes: Vec<u8>,
    pub counter: u32,
    pub device_type: DeviceType,
    pub backed_up: bool,
    pub transports: Vec<String>,
    pub prf_salt: Vec<u8>,
    pub web_id: Option<String>,
    pub pod_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    fn from_new(credential: NewCredential, created_at: DateTime<Utc>) -> Self {
        Self {
            did_nostr: credential.identity.did(),
            credential_id: credential.credential_id,
            identity: credential.identity,
            public_key_bytes: credential.public_key_bytes,
            counter: credential.counter,
            device_type: credential.device_type,
            backed_up: credential.backed_up,
            transports: credential.transports,
            prf_salt: credential.prf_salt,
            web_id: credential.web_id,
            pod_url: credential.pod_url,
            created_at,
            last_used_at: None,
        }
    }
}

/// Storage backend
enum Backend {
    /// PostgreSQL storage (production)
    Postgres(PostgresStore),
    /// In-memory storage (development fallback)
    Memory(MemoryStore),
}

/// Challenge and credential storage, explicitly opened and closed by its owner
pub struct AuthStorage {
    backend: Backend,
}

impl AuthStorage {
    /// Open PostgreSQL storage and run migrations
    pub async fn open_postgres(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, StorageError> {
        let store = PostgresStore::connect(database_url, max_connections, min_connections).await?;
        store.migrate().await?;

        Ok(Self {
            backend: Backend::Postgres(store),
        })
    }

    /// Create storage with in-memory backend (development only)
    pub fn in_memory() -> Self {
        tracing::warn!("Using in-memory challenge/credential storage - data will be lost on restart!");
        Self {
            backend: Backend::Memory(MemoryStore::new()),
        }
    }

    /// Open storage for an optional database URL
    ///
    /// Uses PostgreSQL when a non-empty URL is given, otherwise falls back to in-memory.
    pub async fn open(
        database_url: Option<&str>,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, StorageError> {
        match database_url {
            Some(url) if !url.is_empty() => {
                tracing::info!("Using PostgreSQL challenge/credential storage");
                Self::open_postgres(url, max_connections, min_connections).await
            }
            _ => {
                tracing::warn!("DATABASE_URL not set, using in-memory storage");
                Ok(Self::in_memory())
            }
        }
    }

    /// Open the storage a configuration asks for
    pub async fn from_config(config: &Config) -> Result<Self, StorageError> {
        Self::open(
            config.database_url.as_deref(),
            config.database_max_connections,
            config.database_min_connections,
        )
        .await
    }

    /// Check if using persistent storage
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, Backend::Postgres(_))
    }

    /// Check database health (always Ok for memory backend)
    pub async fn check_health(&self) -> Result<(), StorageError> {
        match &self.backend {
            Backend::Postgres(pg) => pg.check_health().await,
            Backend::Memory(_) => Ok(()),
        }
    }

    /// Release backend resources. Further calls on a closed PostgreSQL store fail.
    pub async fn close(&self) {
        match &self.backend {
            Backend::Postgres(pg) => pg.close().await,
            Backend::Memory(_) => {}
        }
    }

    // ==================== Challenge Methods ====================

    /// Persist a newly issued challenge
    pub async fn store_challenge(&self, challenge: NewChallenge) -> Result<(), StorageError> {
        match &self.backend {
            Backend::Postgres(pg) => pg.store_challenge(&challenge).await,
            Backend::Memory(mem) => {
                mem.store_challenge(challenge);
                Ok(())
            }
        }
    }

    /// Atomically mark an unused, unexpired challenge as used and return it
    ///
    /// Unknown, expired and already-used challenges are all `None`.
    pub async fn consume_challenge(
        &self,
        challenge: &str,
    ) -> Result<Option<ChallengeRecord>, StorageError> {
        match &self.backend {
            Backend::Postgres(pg) => pg.consume_challenge(challenge).await,
            Backend::Memory(mem) => Ok(mem.consume_challenge(challenge, Utc::now())),
        }
    }

    /// Delete expired challenges, returning how many were removed
    pub async fn purge_expired_challenges(&self) -> Result<u64, StorageError> {
        match &self.backend {
            Backend::Postgres(pg) => pg.purge_expired_challenges().await,
            Backend::Memory(mem) => Ok(mem.purge_expired_challenges(Utc::now())),
        }
    }

    // ==================== Credential Methods ====================

    /// Store a new credential
    ///
    /// Fails with [`StorageError::Duplicate`] if the identity or the
    /// credential id is already registered.
    pub async fn insert_credential(
        &self,
        credential: NewCredential,
    ) -> Result<CredentialRecord, StorageError> {
        match &self.backend {
            Backend::Postgres(pg) => pg.insert_credential(credential).await,
            Backend::Memory(mem) => mem.insert_credential(credential),
        }
    }

    /// Look up the credential registered for an identity
    pub async fn credential_by_identity(
        &self,
        identity: &Identity,
    ) -> Result<Option<CredentialRecord>, StorageError> {
        match &self.backend {
            Backend::Postgres(pg) => pg.credential_by_identity(identity).await,
            Backend::Memory(mem) => Ok(mem.credential_by_identity(identity)),
        }
    }

    /// Move the replay counter forward
    ///
    /// Applies only when `new_counter` is strictly greater than the stored
    /// value. Returns `false` when no row was updated. `material` replaces
    /// the stored credential material in the same update when given.
    pub async fn update_counter(
        &self,
        credential_id: &str,
        new_counter: u32,
        material: Option<&[u8]>,
    ) -> Result<bool, StorageError> {
        match &self.backend {
            Backend::Postgres(pg) => pg.update_counter(credential_id, new_counter, material).await,
            Backend::Memory(mem) => Ok(mem.update_counter(credential_id, new_counter, material)),
        }
    }

    // ==================== Maintenance ====================

    /// Get storage statistics
    pub async fn stats(&self) -> StorageStats {
        let (pending_challenges, credentials) = match &self.backend {
            Backend::Postgres(pg) => (
                pg.pending_challenge_count().await.unwrap_or(0),
                pg.credential_count().await.unwrap_or(0),
            ),
            Backend::Memory(mem) => (mem.challenge_count(), mem.credential_count()),
        };

        StorageStats {
            pending_challenges,
            credentials,
            persistent: self.is_persistent(),
        }
    }
}

/// Storage statistics for monitoring
#[derive(Debug, Clone)]
pub struct StorageStats {
    pub pending_challenges: usize,
    pub credentials: usize,
    pub persistent: bool,
}

impl std::fmt::Debug for AuthStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match &self.backend {
            Backend::Postgres(_) => "PostgreSQL",
            Backend::Memory(_) => "Memory",
        };
        f.debug_struct("AuthStorage")
            .field("backend", &backend)
            .finish()
    }
}

/// Periodically delete expired challenges
///
/// Each sweep is idempotent; a failed sweep is logged and retried on the
/// next tick.
pub fn spawn_expiry_sweep(storage: Arc<AuthStorage>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match storage.purge_expired_challenges().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Purged expired challenges"),
                Err(e) => tracing::warn!(error = %e, "Challenge expiry sweep failed"),
            }
        }
    })
}
