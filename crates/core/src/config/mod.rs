//! Application configuration with layered loading.
//!
//! Sources, highest precedence first:
//!
//! 1. Environment variables (BOOTHMARK_*)
//! 2. TOML config file (if BOOTHMARK_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Environment variable prefix for every setting.
pub const ENV_PREFIX: &str = "BOOTHMARK_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// PostgREST base URL of the remote store (e.g. `https://xyz.supabase.co`).
    ///
    /// Set via BOOTHMARK_API_URL. Required only when talking to a real store.
    #[serde(default)]
    pub api_url: Option<String>,

    /// Project key sent as the `apikey` header.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Bearer token of the signed-in user. Falls back to the api key.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Opaque id of the signed-in user.
    ///
    /// Set via BOOTHMARK_USER_ID.
    #[serde(default)]
    pub user_id: Option<String>,

    /// SQLite file holding persisted preferences.
    #[serde(default = "default_prefs_path")]
    pub prefs_path: PathBuf,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_prefs_path() -> PathBuf {
    PathBuf::from("./boothmark-prefs.sqlite")
}

fn default_user_agent() -> String {
    "boothmark/0.1".into()
}

fn default_timeout_ms() -> u64 {
    15_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            access_token: None,
            user_id: None,
            prefs_path: default_prefs_path(),
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the config file or environment cannot be
    /// parsed, or validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::figment()
            .extract::<Self>()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("BOOTHMARK_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment.merge(
            Env::prefixed(ENV_PREFIX)
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        )
    }

    /// Base URL of the remote store (for deferred validation).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no API URL is configured.
    pub fn require_api_url(&self) -> Result<&str, ConfigError> {
        self.api_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing {
                field: "api_url".into(),
                hint: "Set BOOTHMARK_API_URL environment variable".into(),
            })
    }

    /// Id of the signed-in user (for deferred validation).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no user id is configured.
    pub fn require_user_id(&self) -> Result<&str, ConfigError> {
        self.user_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing {
                field: "user_id".into(),
                hint: "Set BOOTHMARK_USER_ID environment variable".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.prefs_path, PathBuf::from("./boothmark-prefs.sqlite"));
        assert_eq!(config.user_agent, "boothmark/0.1");
        assert_eq!(config.timeout_ms, 15_000);
        assert!(config.api_url.is_none());
        assert!(config.user_id.is_none());
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(15_000));
    }

    #[test]
    fn test_require_api_url() {
        let config = AppConfig::default();
        assert!(matches!(config.require_api_url(), Err(ConfigError::Missing { .. })));

        let config = AppConfig { api_url: Some("https://db.example.com".into()), ..Default::default() };
        assert_eq!(config.require_api_url().unwrap(), "https://db.example.com");
    }

    #[test]
    fn test_require_user_id_rejects_blank() {
        let config = AppConfig { user_id: Some("  ".into()), ..Default::default() };
        assert!(matches!(config.require_user_id(), Err(ConfigError::Missing { field, .. }) if field == "user_id"));
    }

    #[test]
    fn test_load_layers_env_over_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("boothmark.toml", "user_id = \"from-file\"\ntimeout_ms = 500\n")?;
            jail.set_env("BOOTHMARK_CONFIG_FILE", "boothmark.toml");
            jail.set_env("BOOTHMARK_USER_ID", "from-env");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.user_id.as_deref(), Some("from-env"));
            assert_eq!(config.timeout_ms, 500);
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_timeout() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("BOOTHMARK_TIMEOUT_MS", "10");
            assert!(matches!(AppConfig::load(), Err(ConfigError::Invalid { .. })));
            Ok(())
        });
    }
}
