//! Sign command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use nostr_passkey_core::token;
use tracing::info;

use crate::utils::{load_keypair, read_body, Output};
use crate::KeySource;

pub struct SignArgs {
    pub url: String,
    pub method: String,
    pub body_file: Option<PathBuf>,
    pub key: KeySource,
    pub basic: bool,
    pub token_only: bool,
    pub created_at: Option<i64>,
}

/// Execute the sign command.
pub fn execute(args: SignArgs, output: Output) -> Result<()> {
    let keypair = load_keypair(&args.key)?;
    let body = read_body(args.body_file.as_deref())?;
    let created_at = args
        .created_at
        .unwrap_or_else(|| chrono::Utc::now().timestamp());

    let token = token::encode_at(&keypair, &args.url, &args.method, body.as_deref(), created_at)
        .context("Failed to sign request")?;

    info!(
        identity = %keypair.identity(),
        url = %args.url,
        method = %args.method,
        payload = body.is_some(),
        "Signed request"
    );

    let header = if args.token_only {
        token.clone()
    } else if args.basic {
        token::basic_authorization_header(&token)
    } else {
        token::authorization_header(&token)
    };

    if output.json {
        let value = serde_json::json!({
            "identity": keypair.identity().as_str(),
            "url": args.url,
            "method": args.method,
            "createdAt": created_at,
            "token": token,
            "authorization": header,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else if output.quiet || args.token_only {
        println!("{header}");
    } else {
        println!("{} {header}", "Authorization:".dimmed());
    }
    Ok(())
}
