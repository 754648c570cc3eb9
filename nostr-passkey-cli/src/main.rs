//! Nostr Passkey CLI - passkey-derived Nostr keys and NIP-98 HTTP auth headers.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  64  Usage error (bad hex, bad key material)
  65  Header rejected by the verifier
  66  Cannot read input file";

#[derive(Parser)]
#[command(name = "nostr-passkey")]
#[command(author, version, about = "Passkey-derived Nostr identities and NIP-98 HTTP auth", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Suppress decorated output; print only the essential value
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where the signing key comes from
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct KeySource {
    /// Authenticator PRF output (hex); the key is derived from it
    #[arg(long, value_name = "HEX")]
    pub prf: Option<String>,

    /// Raw secp256k1 secret key (hex)
    #[arg(long, value_name = "HEX")]
    pub secret: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive the Nostr identity for an authenticator PRF output
    Derive {
        /// PRF output (hex)
        #[arg(value_name = "PRF_HEX")]
        prf: String,

        /// Also print the derived secret key
        #[arg(long)]
        show_secret: bool,
    },

    /// Sign a request and print its Authorization header
    Sign {
        /// Absolute request URL
        #[arg(value_name = "URL")]
        url: String,

        /// HTTP method
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Request body to bind with a payload hash
        #[arg(long, value_name = "FILE")]
        body_file: Option<PathBuf>,

        #[command(flatten)]
        key: KeySource,

        /// Emit the `Basic base64("nostr:" + token)` form
        #[arg(long)]
        basic: bool,

        /// Print the bare token without a scheme
        #[arg(long, conflicts_with = "basic")]
        token_only: bool,

        /// Override `created_at` (unix seconds)
        #[arg(long, value_name = "UNIX")]
        created_at: Option<i64>,
    },

    /// Verify an Authorization header against a request
    Verify {
        /// Header value (`Nostr <token>`, `Basic ...`, or a bare token)
        #[arg(value_name = "HEADER")]
        header: String,

        /// Request URL the header must be bound to
        #[arg(long)]
        url: String,

        /// Request method
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Request body the payload hash must match
        #[arg(long, value_name = "FILE")]
        body_file: Option<PathBuf>,

        /// Accept the `Basic` compatibility scheme
        #[arg(long)]
        allow_basic: bool,

        /// Accept a signed URL that is a path-boundary prefix of --url
        #[arg(long)]
        allow_prefix: bool,

        /// Accept `*` as the signed method
        #[arg(long)]
        allow_wildcard: bool,

        /// Verify against this clock reading instead of now (unix seconds)
        #[arg(long, value_name = "UNIX")]
        at: Option<i64>,
    },

    /// Print PRF salts
    Salt {
        /// Generate a fresh random 32-byte registration salt (base64url)
        #[arg(long)]
        random: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = utils::Output {
        quiet: cli.quiet,
        json: cli.json,
    };

    if let Err(err) = run(cli.command, output) {
        let exit = ExitCode::from_anyhow(&err);
        if let Some(message) = exit.message {
            eprintln!("Error: {message}");
        }
        std::process::exit(exit.code);
    }
}

fn run(command: Commands, output: utils::Output) -> Result<()> {
    match command {
        Commands::Derive { prf, show_secret } => {
            commands::derive::execute(&prf, show_secret, output)
        }
        Commands::Sign {
            url,
            method,
            body_file,
            key,
            basic,
            token_only,
            created_at,
        } => commands::sign::execute(
            commands::sign::SignArgs {
                url,
                method,
                body_file,
                key,
                basic,
                token_only,
                created_at,
            },
            output,
        ),
        Commands::Verify {
            header,
            url,
            method,
            body_file,
            allow_basic,
            allow_prefix,
            allow_wildcard,
            at,
        } => commands::verify::execute(
            commands::verify::VerifyArgs {
                header,
                url,
                method,
                body_file,
                allow_basic,
                allow_prefix,
                allow_wildcard,
                at,
            },
            output,
        ),
        Commands::Salt { random } => commands::salt::execute(random, output),
    }
}
