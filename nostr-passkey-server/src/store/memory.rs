//! In-memory challenge and credential storage
//!
//! Each check-and-set happens while holding the DashMap shard's write lock
//! for the entry, which gives the same atomicity the PostgreSQL backend gets
//! from `SELECT ... FOR UPDATE` and conditional `UPDATE`s.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use nostr_passkey_core::Identity;
use uuid::Uuid;

use super::{ChallengeRecord, CredentialRecord, NewChallenge, NewCredential, StorageError};

/// In-memory storage backend
#[derive(Default)]
pub struct MemoryStore {
    /// challenge value -> record
    challenges: DashMap<String, ChallengeRecord>,
    /// identity -> credential (one credential per identity)
    credentials: DashMap<Identity, CredentialRecord>,
    /// credential id -> identity
    credential_index: DashMap<String, Identity>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a challenge; an existing value is left untouched
    pub fn store_challenge(&self, challenge: NewChallenge) {
        let now = Utc::now();
        self.challenges
            .entry(challenge.challenge.clone())
            .or_insert_with(|| ChallengeRecord {
                id: Uuid::new_v4(),
                challenge: challenge.challenge,
                ceremony: challenge.ceremony,
                identity: challenge.identity,
                used: false,
                prf_salt: challenge.prf_salt,
                state: challenge.state,
                expires_at: challenge.expires_at,
                created_at: now,
            });
    }

    /// Flip `used` under the entry lock if the challenge is unused and unexpired
    pub fn consume_challenge(&self, challenge: &str, now: DateTime<Utc>) -> Option<ChallengeRecord> {
        let mut entry = self.challenges.get_mut(challenge)?;
        if entry.used || entry.expires_at <= now {
            return None;
        }
        entry.used = true;
        Some(entry.clone())
    }

    /// Remove expired challenges (called periodically)
    pub fn purge_expired_challenges(&self, now: DateTime<Utc>) -> u64 {
        let before = self.challenges.len();
        self.challenges.retain(|_, record| record.expires_at > now);
        before.saturating_sub(self.challenges.len()) as u64
    }

    /// Insert a credential if neither its identity nor its id is taken
    pub fn insert_credential(
        &self,
        credential: NewCredential,
    ) -> Result<CredentialRecord, StorageError> {
        let identity_slot = match self.credentials.entry(credential.identity.clone()) {
            Entry::Occupied(_) => {
                return Err(StorageError::Duplicate(format!(
                    "identity {} already has a credential",
                    credential.identity
                )))
            }
            Entry::Vacant(slot) => slot,
        };

        match self.credential_index.entry(credential.credential_id.clone()) {
            Entry::Occupied(_) => Err(StorageError::Duplicate(format!(
                "credential {} already registered",
                credential.credential_id
            ))),
            Entry::Vacant(index_slot) => {
                index_slot.insert(credential.identity.clone());
                let record = CredentialRecord::from_new(credential, Utc::now());
                identity_slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    pub fn credential_by_identity(&self, identity: &Identity) -> Option<CredentialRecord> {
        self.credentials.get(identity).map(|entry| entry.value().clone())
    }

    /// Conditional counter update, `counter < new_counter` checked under the entry lock
    pub fn update_counter(
        &self,
        credential_id: &str,
        new_counter: u32,
        material: Option<&[u8]>,
    ) -> bool {
        let Some(identity) = self
            .credential_index
            .get(credential_id)
            .map(|entry| entry.value().clone())
        else {
            return false;
        };

        let Some(mut record) = self.credentials.get_mut(&identity) else {
            return false;
        };
        if record.credential_id != credential_id || record.counter >= new_counter {
            return false;
        }

        record.counter = new_counter;
        if let Some(material) = material {
            record.public_key_bytes = material.to_vec();
        }
        record.last_used_at = Some(Utc::now());
        true
    }

    /// Get number of challenges not yet purged
    pub fn challenge_count(&self) -> usize {
        self.challenges.len()
    }

    /// Get number of stored credentials
    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("challenges", &self.challenges.len())
            .field("credentials", &self.credentials.len())
            .finish()
    }
}
