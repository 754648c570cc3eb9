//! Common utility functions shared across CLI commands.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{TimeZone, Utc};
use nostr_passkey_core::NostrKeypair;
use tracing::debug;

use crate::KeySource;

/// Global output switches
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub quiet: bool,
    pub json: bool,
}

impl Output {
    pub fn decorated(&self) -> bool {
        !self.quiet && !self.json
    }
}

/// Decode a hex argument, naming it in the error.
pub fn decode_hex_arg(label: &str, value: &str) -> Result<Vec<u8>> {
    let bytes =
        hex::decode(value.trim()).with_context(|| format!("Invalid {label} hex"))?;
    if bytes.is_empty() {
        bail!("Invalid {label}: empty");
    }
    Ok(bytes)
}

/// Resolve the signing keypair from `--prf` or `--secret`.
pub fn load_keypair(source: &KeySource) -> Result<NostrKeypair> {
    match (&source.prf, &source.secret) {
        (Some(prf), _) => {
            let prf_output = decode_hex_arg("PRF output", prf)?;
            NostrKeypair::derive_from_prf(&prf_output).context("Invalid PRF output")
        }
        (None, Some(secret)) => {
            NostrKeypair::from_secret_hex(secret).context("Invalid secret key")
        }
        (None, None) => bail!("Invalid key source: pass --prf or --secret"),
    }
}

/// Read the optional request body file.
pub fn read_body(path: Option<&Path>) -> Result<Option<Vec<u8>>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let body = std::fs::read(path)
        .with_context(|| format!("Failed to read body file: {}", path.display()))?;
    debug!(path = %path.display(), bytes = body.len(), "Read body");
    Ok(Some(body))
}

/// Format a Unix timestamp (seconds) as a human-readable UTC string.
pub fn format_timestamp(timestamp: i64) -> String {
    match Utc.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        _ => format!("{timestamp}s"),
    }
}
