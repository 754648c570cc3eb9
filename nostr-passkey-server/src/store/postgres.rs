//! PostgreSQL storage for challenges and credentials

use std::time::Duration;

use chrono::{DateTime, Utc};
use nostr_passkey_core::Identity;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    CeremonyKind, ChallengeRecord, CredentialRecord, DeviceType, NewChallenge, NewCredential,
    StorageError,
};

/// PostgreSQL-backed storage
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect a pool to the given database URL
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        tracing::info!(max_connections, "Connected to PostgreSQL database");
        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;

        tracing::info!("Database migrations completed");
        Ok(())
    }

    /// Check database connection health
    pub async fn check_health(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    /// Close the pool, waiting for checked-out connections to be returned
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL pool closed");
    }

    // ==================== Challenges ====================

    /// Insert a challenge; a duplicate value is ignored
    pub async fn store_challenge(&self, challenge: &NewChallenge) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO webauthn_challenges
                (challenge, ceremony, pubkey, prf_salt, ceremony_state, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (challenge) DO NOTHING
            "#,
        )
        .bind(&challenge.challenge)
        .bind(challenge.ceremony.as_str())
        .bind(challenge.identity.as_ref().map(Identity::as_str))
        .bind(challenge.prf_salt.as_deref())
        .bind(&challenge.state)
        .bind(challenge.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(())
    }

    /// Lock the row, check it, flip `used`, all in one transaction
    ///
    /// A concurrent consumer blocks on the row lock and, once the winner
    /// commits, re-evaluates `used = FALSE` against the new row version and
    /// finds nothing.
    pub async fn consume_challenge(
        &self,
        challenge: &str,
    ) -> Result<Option<ChallengeRecord>, StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let row = sqlx::query_as::<_, ChallengeRow>(
            r#"
            SELECT id, challenge, ceremony, pubkey, used, prf_salt, ceremony_state,
                   expires_at, created_at
            FROM webauthn_challenges
            WHERE challenge = $1 AND used = FALSE AND expires_at > NOW()
            FOR UPDATE
            "#,
        )
        .bind(challenge)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        let Some(row) = row else {
            tx.rollback()
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;
            return Ok(None);
        };

        sqlx::query("UPDATE webauthn_challenges SET used = TRUE WHERE id = $1")
            .bind(row.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        let mut record = row.into_record()?;
        record.used = true;
        Ok(Some(record))
    }

    /// Delete expired challenges
    pub async fn purge_expired_challenges(&self) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM webauthn_challenges WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(result.rows_affected())
    }

    /// Count challenges that are still consumable
    pub async fn pending_challenge_count(&self) -> Result<usize, StorageError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM webauthn_challenges WHERE used = FALSE AND expires_at > NOW()",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(count as usize)
    }

    // ==================== Credentials ====================

    /// Insert a new credential
    pub async fn insert_credential(
        &self,
        credential: NewCredential,
    ) -> Result<CredentialRecord, StorageError> {
        let did_nostr = credential.identity.did();

        let row = sqlx::query_as::<_, CredentialRow>(
            r#"
            INSERT INTO webauthn_credentials
                (credential_id, pubkey, did_nostr, webid, pod_url, public_key_bytes,
                 counter, device_type, backed_up, transports, prf_salt)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING credential_id, pubkey, did_nostr, webid, pod_url, public_key_bytes,
                      counter, device_type, backed_up, transports, prf_salt,
                      created_at, last_used_at
            "#,
        )
        .bind(&credential.credential_id)
        .bind(credential.identity.as_str())
        .bind(&did_nostr)
        .bind(credential.web_id.as_deref())
        .bind(credential.pod_url.as_deref())
        .bind(&credential.public_key_bytes)
        .bind(i64::from(credential.counter))
        .bind(credential.device_type.as_str())
        .bind(credential.backed_up)
        .bind(&credential.transports)
        .bind(&credential.prf_salt)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StorageError::Duplicate(db.message().to_string())
            }
            other => StorageError::Query(other.to_string()),
        })?;

        tracing::info!(
            credential_id = %credential.credential_id,
            identity = %credential.identity,
            "Credential stored in database"
        );
        row.into_record()
    }

    /// Get the credential for an identity
    pub async fn credential_by_identity(
        &self,
        identity: &Identity,
    ) -> Result<Option<CredentialRecord>, StorageError> {
        let row = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT credential_id, pubkey, did_nostr, webid, pod_url, public_key_bytes,
                   counter, device_type, backed_up, transports, prf_salt,
                   created_at, last_used_at
            FROM webauthn_credentials
            WHERE pubkey = $1
            "#,
        )
        .bind(identity.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        row.map(CredentialRow::into_record).transpose()
    }

    /// Conditional counter update: only a strictly greater counter is written
    pub async fn update_counter(
        &self,
        credential_id: &str,
        new_counter: u32,
        material: Option<&[u8]>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE webauthn_credentials
            SET counter = $2,
                public_key_bytes = COALESCE($3, public_key_bytes),
                last_used_at = NOW()
            WHERE credential_id = $1 AND counter < $2
            "#,
        )
        .bind(credential_id)
        .bind(i64::from(new_counter))
        .bind(material)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    /// Get total credential count
    pub async fn credential_count(&self) -> Result<usize, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM webauthn_credentials")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(count as usize)
    }
}

/// Database row for challenges
#[derive(sqlx::FromRow)]
struct ChallengeRow {
    id: Uuid,
    challenge: String,
    ceremony: String,
    pubkey: Option<String>,
    used: bool,
    prf_salt: Option<Vec<u8>>,
    ceremony_state: serde_json::Value,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl ChallengeRow {
    fn into_record(self) -> Result<ChallengeRecord, StorageError> {
        let ceremony = CeremonyKind::parse(&self.ceremony).ok_or_else(|| {
            StorageError::Serialization(format!("unknown ceremony kind {:?}", self.ceremony))
        })?;
        let identity = self.pubkey.as_deref().map(parse_identity).transpose()?;

        Ok(ChallengeRecord {
            id: self.id,
            challenge: self.challenge,
            ceremony,
            identity,
            used: self.used,
            prf_salt: self.prf_salt,
            state: self.ceremony_state,
            expires_at: self.expires_at,
            created_at: self.created_at,
        })
    }
}

/// Database row for credentials
#[derive(sqlx::FromRow)]
struct CredentialRow {
    credential_id: String,
    pubkey: String,
    did_nostr: String,
    webid: Option<String>,
    pod_url: Option<String>,
    public_key_bytes: Vec<u8>,
    counter: i64,
    device_type: String,
    backed_up: bool,
    transports: Vec<String>,
    prf_salt: Vec<u8>,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
}

impl CredentialRow {
    fn into_record(self) -> Result<CredentialRecord, StorageError> {
        let counter = u32::try_from(self.counter).map_err(|_| {
            StorageError::Serialization(format!("counter {} out of range", self.counter))
        })?;
        let device_type = DeviceType::parse(&self.device_type).ok_or_else(|| {
            StorageError::Serialization(format!("unknown device type {:?}", self.device_type))
        })?;

        Ok(CredentialRecord {
            identity: parse_identity(&self.pubkey)?,
            credential_id: self.credential_id,
            did_nostr: self.did_nostr,
            public_key_bytes: self.public_key_bytes,
            counter,
            device_type,
            backed_up: self.backed_up,
            transports: self.transports,
            prf_salt: self.prf_salt,
            web_id: self.webid,
            pod_url: self.pod_url,
            created_at: self.created_at,
            last_used_at: self.last_used_at,
        })
    }
}

fn parse_identity(value: &str) -> Result<Identity, StorageError> {
    Identity::parse(value)
        .ok_or_else(|| StorageError::Serialization(format!("stored pubkey {value:?} is malformed")))
}
