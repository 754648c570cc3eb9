//! Derive command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use nostr_passkey_core::NostrKeypair;
use tracing::info;

use crate::utils::{decode_hex_arg, Output};

/// Execute the derive command.
pub fn execute(prf_hex: &str, show_secret: bool, output: Output) -> Result<()> {
    let prf_output = decode_hex_arg("PRF output", prf_hex)?;
    let keypair = NostrKeypair::derive_from_prf(&prf_output).context("Invalid PRF output")?;
    let identity = keypair.identity();

    info!(identity = %identity, prf_len = prf_output.len(), "Derived identity");

    if output.json {
        let mut value = serde_json::json!({
            "identity": identity.as_str(),
            "did": identity.did(),
        });
        if show_secret {
            value["secretKey"] = serde_json::Value::String(keypair.secret_hex().to_string());
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if output.quiet {
        println!("{identity}");
        return Ok(());
    }

    println!();
    println!("   {} {}", "Identity:".dimmed(), identity.as_str().green());
    println!("   {} {}", "DID:".dimmed(), identity.did());
    if show_secret {
        println!("   {} {}", "Secret:".dimmed(), keypair.secret_hex().as_str().yellow());
        println!();
        println!(
            "   {}",
            "Anyone holding the secret key can act as this identity.".yellow()
        );
    }
    Ok(())
}
