use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "djax", version, about = "Sync local content with Axilent")]
pub struct Cli {
    /// SQLite database holding content records, locks and auth tokens.
    #[arg(long, env = "DJAX_DATABASE", default_value = "djax.db", global = true)]
    pub database: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default if no subcommand given).
    Serve {
        #[arg(long, env = "DJAX_HOST", default_value = "0.0.0.0")]
        host: String,
        #[arg(long, env = "DJAX_PORT", default_value = "8000")]
        port: u16,
    },

    /// Run one sync pass against Axilent.
    Sync {
        /// Only sync this remote content type.
        #[arg(long)]
        content_type: Option<String>,

        /// Lock token to record for this pass (random if omitted).
        #[arg(long)]
        token: Option<String>,
    },

    /// Remove stale sync locks left by a crashed pass.
    ClearLocks,

    /// Create an auth token for the single-record sync endpoint.
    CreateToken {
        #[arg(long)]
        name: String,

        /// Only accept requests whose Origin/Referer host is this domain or a subdomain.
        #[arg(long)]
        origin_domain: Option<String>,
    },

    /// Print current configuration (redacted secrets).
    Config,
}

/// Keeps the first and last four characters of a secret.
pub fn redact(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}***{tail}")
}
