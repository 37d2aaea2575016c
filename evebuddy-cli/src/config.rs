//! User configuration loaded from `config.toml`.

use std::path::Path;
use std::time::Duration;

use evebuddy_lib::auth::SsoConfig;
use serde::Deserialize;

use crate::error::CliError;
use crate::error::CliResult;

fn default_port() -> u16 {
    8000
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_open_browser() -> bool {
    true
}

/// Settings read from the config file.
///
/// Every field has a default, so an empty or missing file is valid.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            port: default_port(),
            scopes: Vec::new(),
            timeout_secs: default_timeout_secs(),
            open_browser: default_open_browser(),
        }
    }
}

impl Settings {
    /// Loads settings from `path`.
    ///
    /// A missing file yields the defaults unless `required` is set.
    pub fn load(path: &Path, required: bool) -> CliResult<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                log::debug!("no config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(CliError::io(path, e)),
        };
        toml::from_str(&content).map_err(|source| CliError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Builds the SSO configuration. Requires a client ID.
    pub fn sso_config(&self) -> CliResult<SsoConfig> {
        let client_id = self
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(CliError::MissingClientId)?;

        let mut config = SsoConfig::new(client_id)
            .with_port(self.port)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_open_browser(self.open_browser);
        if let Some(secret) = &self.client_secret {
            config = config.with_client_secret(secret.clone());
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_optional_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("config.toml"), false).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_missing_required_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(&dir.path().join("config.toml"), true).unwrap_err();
        assert!(matches!(err, CliError::Io { .. }));
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "client_id = \"abc\"\nscopes = [\"esi-assets.read_assets.v1\"]\n",
        )
        .unwrap();

        let settings = Settings::load(&path, true).unwrap();
        assert_eq!(settings.client_id.as_deref(), Some("abc"));
        assert_eq!(settings.scopes, vec!["esi-assets.read_assets.v1"]);
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.timeout_secs, 300);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "clientid = \"abc\"\n").unwrap();
        assert!(matches!(
            Settings::load(&path, true),
            Err(CliError::Config { .. })
        ));
    }

    #[test]
    fn test_sso_config_requires_client_id() {
        assert!(matches!(
            Settings::default().sso_config(),
            Err(CliError::MissingClientId)
        ));

        let settings = Settings {
            client_id: Some("abc".to_string()),
            client_secret: Some("shh".to_string()),
            port: 0,
            timeout_secs: 10,
            ..Settings::default()
        };
        let config = settings.sso_config().unwrap();
        assert_eq!(config.client_id, "abc");
        assert_eq!(config.client_secret.as_deref(), Some("shh"));
        assert_eq!(config.port, 0);
        assert_eq!(config.timeout, Duration::from_secs(10));
    }
}
