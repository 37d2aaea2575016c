//! CLI-level errors (wraps library errors)

use std::path::PathBuf;

use evebuddy_lib::error::AuthError;
use evebuddy_lib::error::RateLimitError;
use evebuddy_lib::error::TreeError;
use thiserror::Error;

/// CLI errors are the top-level error type.
/// These are what get displayed to the user.
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no client ID configured (use --client-id, EVEBUDDY_CLIENT_ID or config.toml)")]
    MissingClientId,

    #[error("no token stored at {0} (run `evebuddy login` first)")]
    NoToken(PathBuf),

    #[error("cannot determine {0} directory")]
    NoDirectory(&'static str),
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CliError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        CliError::Json {
            path: path.into(),
            source,
        }
    }

    /// Exit code reported to the shell (sysexits values).
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::MissingClientId | CliError::Config { .. } => 78,
            CliError::NoToken(_) | CliError::Json { .. } => 65,
            CliError::Io { .. } | CliError::NoDirectory(_) => 74,
            CliError::Auth(AuthError::Network(_)) => 69,
            CliError::Auth(_) => 77,
            CliError::RateLimit(_) => 65,
            CliError::Tree(_) => 65,
        }
    }
}
