//! Salt command implementation.

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use colored::Colorize;
use nostr_passkey_core::{prf_eval_salt, PRF_LABEL};

use crate::utils::Output;

/// Execute the salt command.
///
/// Without `--random`, prints the fixed salt derived from the PRF label.
pub fn execute(random: bool, output: Output) -> Result<()> {
    let (salt, source) = if random {
        let mut salt = [0u8; 32];
        getrandom::fill(&mut salt)
            .map_err(|e| anyhow::anyhow!(e.to_string()))
            .context("Failed to generate random salt")?;
        (salt, "random")
    } else {
        (prf_eval_salt(), PRF_LABEL)
    };

    let encoded = URL_SAFE_NO_PAD.encode(salt);
    if output.json {
        let value = serde_json::json!({
            "source": source,
            "hex": hex::encode(salt),
            "base64url": encoded,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else if output.quiet {
        println!("{encoded}");
    } else {
        println!("   {} {}", "Source:".dimmed(), source);
        println!("   {} {}", "Hex:".dimmed(), hex::encode(salt));
        println!("   {} {}", "Base64url:".dimmed(), encoded.green());
    }
    Ok(())
}
