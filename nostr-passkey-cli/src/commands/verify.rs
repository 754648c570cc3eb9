//! Verify command implementation.

use std::path::PathBuf;

use anyhow::{bail, Result};
use colored::Colorize;
use nostr_passkey_core::{decode_header, token, verify_at, VerifyContext};
use tracing::{error, info};

use crate::utils::{format_timestamp, read_body, Output};

pub struct VerifyArgs {
    pub header: String,
    pub url: String,
    pub method: String,
    pub body_file: Option<PathBuf>,
    pub allow_basic: bool,
    pub allow_prefix: bool,
    pub allow_wildcard: bool,
    pub at: Option<i64>,
}

/// Bare tokens get the `Nostr` scheme prepended.
fn normalize_header(header: &str) -> String {
    let trimmed = header.trim();
    if trimmed.starts_with("Nostr ") || trimmed.starts_with("Basic ") {
        trimmed.to_string()
    } else {
        token::authorization_header(trimmed)
    }
}

/// Execute the verify command.
pub fn execute(args: VerifyArgs, output: Output) -> Result<()> {
    let header = normalize_header(&args.header);
    let body = read_body(args.body_file.as_deref())?;
    let now = args.at.unwrap_or_else(|| chrono::Utc::now().timestamp());

    let mut context = VerifyContext::new(&args.url, &args.method)
        .allow_basic_scheme(args.allow_basic)
        .allow_url_prefix(args.allow_prefix)
        .allow_method_wildcard(args.allow_wildcard);
    if let Some(body) = body.as_deref() {
        context = context.with_body(body);
    }

    match verify_at(Some(&header), &context, now) {
        Ok(verified) => {
            info!(identity = %verified.identity(), url = %args.url, "Header verified");

            if output.json {
                let value = serde_json::json!({
                    "valid": true,
                    "identity": verified.identity().as_str(),
                    "did": verified.did(),
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else if output.quiet {
                println!("{}", verified.identity());
            } else {
                println!();
                println!("{}", "╔════════════════════════════════════════╗".green());
                println!(
                    "{}",
                    "║                VALID                   ║".green().bold()
                );
                println!("{}", "╚════════════════════════════════════════╝".green());
                println!();
                println!("   {} {}", "Identity:".dimmed(), verified.identity().as_str().green());
                println!("   {} {}", "DID:".dimmed(), verified.did());
                if let Some(event) = decode_header(&header, args.allow_basic) {
                    println!(
                        "   {} {}",
                        "Signed at:".dimmed(),
                        format_timestamp(event.event().created_at)
                    );
                }
            }
            Ok(())
        }
        Err(rejection) => {
            error!(code = rejection.code(), url = %args.url, "Header rejected");

            if output.json {
                let value = serde_json::json!({
                    "valid": false,
                    "code": rejection.code(),
                    "reason": rejection.to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else if output.decorated() {
                println!();
                println!("{}", "╔════════════════════════════════════════╗".red());
                println!(
                    "{}",
                    "║               REJECTED                 ║".red().bold()
                );
                println!("{}", "╚════════════════════════════════════════╝".red());
                println!();
                println!("   {} {}", "Code:".dimmed(), rejection.code().red());
                println!("   {} {}", "Reason:".dimmed(), rejection);
            }
            bail!("NIP-98 verification failed: {}", rejection.code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("abc"), "Nostr abc");
        assert_eq!(normalize_header(" Nostr abc "), "Nostr abc");
        assert_eq!(normalize_header("Basic bm9zdHI6YWJj"), "Basic bm9zdHI6YWJj");
    }
}
