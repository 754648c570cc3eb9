//! Deterministic Nostr keypairs derived from a passkey PRF output
//!
//! The authenticator evaluates its PRF over a fixed label ([`prf_eval_salt`]).
//! The resulting output is expanded with HKDF-SHA256 into a secp256k1 secret
//! scalar whose x-only public key becomes the user's durable identity. The
//! same authenticator and the same salt always produce the same identity.

use std::fmt;

use hkdf::Hkdf;
use secp256k1::{schnorr, Keypair, Message, SecretKey, XOnlyPublicKey, SECP256K1};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{CoreError, Result};
use crate::identity::Identity;

/// Product label hashed into the PRF evaluation input.
pub const PRF_LABEL: &str = "dreamlab-nostr-key-v1";

/// HKDF `info` for the first (and almost always only) expansion attempt.
pub const HKDF_INFO: &[u8] = b"nostr-secp256k1-v1";

/// Retries after attempt 0 append a single counter byte to [`HKDF_INFO`].
const MAX_RETRY_ATTEMPTS: u8 = u8::MAX;

/// `sha256(PRF_LABEL)`, the 32-byte value the authenticator evaluates its PRF over.
pub fn prf_eval_salt() -> [u8; 32] {
    Sha256::digest(PRF_LABEL.as_bytes()).into()
}

/// A secp256k1 keypair whose secret bytes are zeroized on drop.
pub struct NostrKeypair {
    secret: Zeroizing<[u8; 32]>,
    public: XOnlyPublicKey,
    identity: Identity,
}

impl NostrKeypair {
    /// Derive the keypair for a PRF output.
    ///
    /// Attempt 0 expands with `info = "nostr-secp256k1-v1"`. Only when those
    /// 32 bytes are not a valid scalar (zero, or not below the group order)
    /// is the expansion repeated with `info || k` for `k = 1..=255`.
    pub fn derive_from_prf(prf_output: &[u8]) -> Result<Self> {
        if prf_output.is_empty() {
            return Err(CoreError::KeyDerivation("PRF output is empty".into()));
        }

        let hk = Hkdf::<Sha256>::new(None, prf_output);

        for attempt in 0..=MAX_RETRY_ATTEMPTS {
            let mut okm = Zeroizing::new([0u8; 32]);
            let expanded = if attempt == 0 {
                hk.expand(HKDF_INFO, &mut okm[..])
            } else {
                let mut info = HKDF_INFO.to_vec();
                info.push(attempt);
                hk.expand(&info, &mut okm[..])
            };
            expanded.map_err(|e| CoreError::KeyDerivation(e.to_string()))?;

            match Self::from_secret_bytes(&okm) {
                Ok(keypair) => {
                    if attempt > 0 {
                        tracing::debug!(attempt, "HKDF output rejected as scalar, used retry");
                    }
                    return Ok(keypair);
                }
                Err(CoreError::InvalidSecretKey(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(CoreError::KeyDerivation(
            "no valid secp256k1 scalar after all expansion attempts".into(),
        ))
    }

    /// Build a keypair from a raw 32-byte secret scalar.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|e| CoreError::InvalidSecretKey(e.to_string()))?;
        let keypair = Keypair::from_secret_key(SECP256K1, &secret_key);
        let (public, _parity) = keypair.x_only_public_key();

        Ok(Self {
            secret: Zeroizing::new(*bytes),
            identity: Identity::from_xonly_bytes(&public.serialize()),
            public,
        })
    }

    /// Build a keypair from a 64-character hex secret.
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self> {
        let mut bytes = Zeroizing::new([0u8; 32]);
        hex::decode_to_slice(secret_hex.trim(), &mut bytes[..])
            .map_err(|e| CoreError::InvalidSecretKey(e.to_string()))?;
        Self::from_secret_bytes(&bytes)
    }

    /// Generate a fresh random keypair (not passkey-bound).
    pub fn generate() -> Result<Self> {
        loop {
            let mut bytes = Zeroizing::new([0u8; 32]);
            getrandom::fill(&mut bytes[..]).map_err(|e| CoreError::Randomness(e.to_string()))?;
            match Self::from_secret_bytes(&bytes) {
                Ok(keypair) => return Ok(keypair),
                Err(CoreError::InvalidSecretKey(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn public_key(&self) -> &XOnlyPublicKey {
        &self.public
    }

    /// Secret scalar as hex. The returned string is zeroized on drop.
    pub fn secret_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(&self.secret[..]))
    }

    /// BIP-340 Schnorr signature over a 32-byte digest, with fresh auxiliary
    /// randomness. Returns the 64-byte signature as lowercase hex.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<String> {
        let secret_key = SecretKey::from_slice(&self.secret[..])
            .map_err(|e| CoreError::InvalidSecretKey(e.to_string()))?;
        let keypair = Keypair::from_secret_key(SECP256K1, &secret_key);

        let mut aux = [0u8; 32];
        getrandom::fill(&mut aux).map_err(|e| CoreError::Randomness(e.to_string()))?;

        let msg = Message::from_digest(*digest);
        let signature = SECP256K1.sign_schnorr_with_aux_rand(&msg, &keypair, &aux);
        Ok(signature.to_string())
    }
}

impl fmt::Debug for NostrKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NostrKeypair")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Verify a hex BIP-340 signature over a 32-byte digest.
///
/// Malformed hex, a pubkey that is not on the curve or a signature of the
/// wrong length all verify as `false`.
pub fn verify_signature(pubkey_hex: &str, digest: &[u8; 32], signature_hex: &str) -> bool {
    let mut pubkey_bytes = [0u8; 32];
    if hex::decode_to_slice(pubkey_hex, &mut pubkey_bytes).is_err() {
        return false;
    }
    let mut sig_bytes = [0u8; 64];
    if hex::decode_to_slice(signature_hex, &mut sig_bytes).is_err() {
        return false;
    }

    let Ok(public) = XOnlyPublicKey::from_slice(&pubkey_bytes) else {
        return false;
    };
    let Ok(signature) = schnorr::Signature::from_slice(&sig_bytes) else {
        return false;
    };

    let msg = Message::from_digest(*digest);
    SECP256K1.verify_schnorr(&signature, &msg, &public).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_prf() -> Vec<u8> {
        (0u8..32).collect()
    }

    #[test]
    fn test_prf_eval_salt_is_label_hash() {
        assert_eq!(
            hex::encode(prf_eval_salt()),
            "305b0f686508f7643414ab2457f575c2dd33cff8c6d23aca49b0b8544bef619d"
        );
    }

    #[test]
    fn test_derivation_known_vector() {
        let keypair = NostrKeypair::derive_from_prf(&sample_prf()).unwrap();
        assert_eq!(
            keypair.secret_hex().as_str(),
            "11280d208e5fcdc936e50e3d717e23392cfa9b4a7f8b0c913725efcb4dc6f638"
        );
        assert_eq!(
            keypair.identity().as_str(),
            "eba811c75d487721d41d26718fc2c7f805a0c09e7084e1ecf6f1b51be5d4a720"
        );
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = NostrKeypair::derive_from_prf(&sample_prf()).unwrap();
        let b = NostrKeypair::derive_from_prf(&sample_prf()).unwrap();
        assert_eq!(a.identity(), b.identity());
        assert_eq!(a.secret_hex(), b.secret_hex());
    }

    #[test]
    fn test_different_prf_outputs_give_different_identities() {
        let a = NostrKeypair::derive_from_prf(&[1u8; 32]).unwrap();
        let b = NostrKeypair::derive_from_prf(&[2u8; 32]).unwrap();
        assert_ne!(a.identity(), b.identity());
    }

    #[test]
    fn test_empty_prf_output_rejected() {
        assert!(matches!(
            NostrKeypair::derive_from_prf(&[]),
            Err(CoreError::KeyDerivation(_))
        ));
    }

    #[test]
    fn test_bip340_public_key_vector() {
        let keypair = NostrKeypair::from_secret_hex(
            "0000000000000000000000000000000000000000000000000000000000000003",
        )
        .unwrap();
        assert_eq!(
            keypair.identity().as_str(),
            "f9308a019258c31049344f85f89d5229b531c845836f99b08601f113bce036f9"
        );
    }

    #[test]
    fn test_zero_and_overflow_scalars_rejected() {
        assert!(NostrKeypair::from_secret_bytes(&[0u8; 32]).is_err());
        assert!(NostrKeypair::from_secret_bytes(&[0xffu8; 32]).is_err());
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = NostrKeypair::generate().unwrap();
        let digest: [u8; 32] = Sha256::digest(b"hello").into();
        let sig = keypair.sign_digest(&digest).unwrap();
        assert_eq!(sig.len(), 128);
        assert!(verify_signature(keypair.identity().as_str(), &digest, &sig));

        let other: [u8; 32] = Sha256::digest(b"hellp").into();
        assert!(!verify_signature(keypair.identity().as_str(), &other, &sig));
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let digest = [7u8; 32];
        assert!(!verify_signature("zz", &digest, "00"));
        assert!(!verify_signature(&"00".repeat(32), &digest, &"00".repeat(64)));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let keypair = NostrKeypair::derive_from_prf(&sample_prf()).unwrap();
        let rendered = format!("{:?}", keypair);
        assert!(!rendered.contains("11280d20"));
        assert!(rendered.contains("redacted"));
    }
}
