use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("Randomness unavailable: {0}")]
    Randomness(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Event kind reserved for HTTP authentication events.
pub const HTTP_AUTH_KIND: u32 = 27235;

/// Upper bound on an encoded token (and on its decoded JSON), checked before decoding.
pub const MAX_TOKEN_SIZE: usize = 64 * 1024;

/// Accepted clock skew between `created_at` and the verifier's clock, inclusive.
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 60;
