//! Command-line arguments.

use std::path::PathBuf;

use clap::Args;
use clap::Parser;
use clap::Subcommand;

use crate::config::Settings;

#[derive(Parser, Debug)]
#[command(name = "evebuddy", version, about = "EVE Online companion tools")]
pub struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (default: platform config dir)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in a character through EVE SSO and store the token
    Login {
        #[command(flatten)]
        sso: SsoArgs,

        /// Print the login URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,

        /// Token file (default: platform data dir)
        #[arg(long, value_name = "FILE")]
        token: Option<PathBuf>,
    },

    /// Refresh the stored token
    Refresh {
        #[command(flatten)]
        sso: SsoArgs,

        /// Token file (default: platform data dir)
        #[arg(long, value_name = "FILE")]
        token: Option<PathBuf>,
    },

    /// Generate rate limit tables from an ESI OpenAPI document
    GenRatelimit {
        /// OpenAPI JSON document
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Output Rust source (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Print a character asset listing as a tree
    Assets {
        /// JSON array from the character assets endpoint
        input: PathBuf,

        /// Show only top-level locations
        #[arg(long)]
        collapsed: bool,
    },
}

/// SSO options that override the config file.
#[derive(Args, Debug, Default)]
pub struct SsoArgs {
    /// Application client ID
    #[arg(long, env = "EVEBUDDY_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Application client secret
    #[arg(long, env = "EVEBUDDY_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Local callback port
    #[arg(long)]
    pub port: Option<u16>,

    /// Requested scope (repeatable)
    #[arg(long = "scope", value_name = "SCOPE")]
    pub scopes: Vec<String>,

    /// Seconds to wait for the SSO callback
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl SsoArgs {
    /// Applies the given options on top of `settings`.
    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(id) = &self.client_id {
            settings.client_id = Some(id.clone());
        }
        if let Some(secret) = &self.client_secret {
            settings.client_secret = Some(secret.clone());
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if !self.scopes.is_empty() {
            settings.scopes = self.scopes.clone();
        }
        if let Some(timeout) = self.timeout {
            settings.timeout_secs = timeout;
        }
        settings
    }
}
