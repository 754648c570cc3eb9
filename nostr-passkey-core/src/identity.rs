//! Nostr identity (x-only public key) handling

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix of the decentralized identifier derived from an identity.
pub const DID_NOSTR_PREFIX: &str = "did:nostr:";

/// A Nostr identity: a 32-byte x-only secp256k1 public key rendered as
/// exactly 64 lowercase hex characters.
///
/// Construction goes through [`Identity::parse`], so holding an `Identity`
/// means the shape has already been checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Parse a 64-character lowercase hex string.
    pub fn parse(value: &str) -> Option<Self> {
        if is_identity_shape(value) {
            Some(Self(value.to_string()))
        } else {
            None
        }
    }

    pub(crate) fn from_xonly_bytes(bytes: &[u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `did:nostr:<identity>`
    pub fn did(&self) -> String {
        did_nostr(&self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_identity_shape(&value) {
            Ok(Self(value))
        } else {
            Err(format!("not a 64-character lowercase hex identity: {value:?}"))
        }
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Exactly 64 characters from `[0-9a-f]`.
pub fn is_identity_shape(value: &str) -> bool {
    value.len() == 64
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Build the `did:nostr:` URI for a pubkey. Uppercase hex is lowered.
pub fn did_nostr(pubkey: &str) -> String {
    format!("{}{}", DID_NOSTR_PREFIX, pubkey.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBKEY: &str = "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    #[test]
    fn test_parse_accepts_lowercase_hex() {
        let identity = Identity::parse(PUBKEY).unwrap();
        assert_eq!(identity.as_str(), PUBKEY);
        assert_eq!(identity.did(), format!("did:nostr:{PUBKEY}"));
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert!(Identity::parse(&PUBKEY[..63]).is_none());
        assert!(Identity::parse(&format!("{PUBKEY}0")).is_none());
        assert!(Identity::parse(&PUBKEY.to_uppercase()).is_none());
        assert!(Identity::parse(&PUBKEY.replace('7', "g")).is_none());
        assert!(Identity::parse("").is_none());
    }

    #[test]
    fn test_did_lowercases() {
        assert_eq!(did_nostr("ABCDEF"), "did:nostr:abcdef");
    }

    #[test]
    fn test_serde_rejects_invalid_identity() {
        let ok: Identity = serde_json::from_str(&format!("\"{PUBKEY}\"")).unwrap();
        assert_eq!(ok.as_str(), PUBKEY);
        assert!(serde_json::from_str::<Identity>("\"abc\"").is_err());
    }
}
