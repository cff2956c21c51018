use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::auth::ApiKeyTable;
use crate::error::{Error, ErrorDetails};
use crate::usage_limit::FreeTierLimits;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub bind_address: Option<SocketAddr>,
    /// Expose internal error details in 5xx responses and enable debug logs
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub authentication: AuthenticationConfig,
    #[serde(default)]
    pub free_tier: FreeTierLimits,
    #[serde(default)]
    pub usage: UsageAccountingConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthenticationConfig {
    #[serde(default = "default_authentication_enabled")]
    pub enabled: bool,
    /// Identity attached to every request while authentication is disabled
    pub mock_user_id: Option<String>,
    /// Keyed by the hex SHA-256 of the prefixed API key, never the raw key
    #[serde(default)]
    pub api_keys: ApiKeyTable,
}

fn default_authentication_enabled() -> bool {
    true
}

impl Default for AuthenticationConfig {
    fn default() -> Self {
        Self {
            enabled: default_authentication_enabled(),
            mock_user_id: None,
            api_keys: ApiKeyTable::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UsageAccountingConfig {
    /// Flat number of build minutes charged for every accepted build
    #[serde(default = "default_build_minutes_per_build")]
    pub build_minutes_per_build: u64,
}

fn default_build_minutes_per_build() -> u64 {
    2
}

impl Default for UsageAccountingConfig {
    fn default() -> Self {
        Self {
            build_minutes_per_build: default_build_minutes_per_build(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_store_timeout_ms() -> u64 {
    500
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    pub async fn load_and_verify_from_path(path: &Path) -> Result<Config, Error> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Failed to read config file `{}`: {e}", path.display()),
            })
        })?;
        let config = Self::load_from_str(&contents).map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Invalid config file `{}`: {e}", path.display()),
            })
        })?;
        tracing::info!("Loaded config file `{}`", path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document. Errors are returned unlogged so callers can add context.
    pub fn load_from_str(contents: &str) -> Result<Config, Error> {
        let config: Config = toml::from_str(contents).map_err(|e| {
            Error::new_without_logging(ErrorDetails::Config {
                message: e.to_string(),
            })
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        let gateway = &self.gateway;
        if gateway.usage.build_minutes_per_build == 0 {
            return Err(Error::new_without_logging(ErrorDetails::Config {
                message: "`gateway.usage.build_minutes_per_build` must be greater than 0"
                    .to_string(),
            }));
        }
        if gateway.store.timeout_ms == 0 {
            return Err(Error::new_without_logging(ErrorDetails::Config {
                message: "`gateway.store.timeout_ms` must be greater than 0".to_string(),
            }));
        }
        for (hash, metadata) in &gateway.authentication.api_keys {
            if metadata.user_id.trim().is_empty() {
                return Err(Error::new_without_logging(ErrorDetails::Config {
                    message: format!(
                        "`gateway.authentication.api_keys.{hash}` must have a non-empty `user_id`"
                    ),
                }));
            }
        }
        if let Some(mock_user_id) = &gateway.authentication.mock_user_id {
            if mock_user_id.trim().is_empty() {
                return Err(Error::new_without_logging(ErrorDetails::Config {
                    message: "`gateway.authentication.mock_user_id` must not be empty".to_string(),
                }));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::load_from_str("").unwrap();
        let gateway = &config.gateway;
        assert_eq!(gateway.bind_address, None);
        assert!(!gateway.debug);
        assert!(gateway.authentication.enabled);
        assert!(gateway.authentication.api_keys.is_empty());
        assert_eq!(gateway.free_tier, FreeTierLimits::default());
        assert_eq!(gateway.free_tier.build_minutes, 100);
        assert_eq!(gateway.free_tier.ai_calls, 50);
        assert_eq!(gateway.usage.build_minutes_per_build, 2);
        assert_eq!(gateway.store.timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_full_config() {
        let config = Config::load_from_str(
            r#"
            [gateway]
            bind_address = "127.0.0.1:4000"
            debug = true

            [gateway.authentication]
            enabled = false
            mock_user_id = "dev-user"

            [gateway.authentication.api_keys]
            "abc123" = { user_id = "user-1" }

            [gateway.free_tier]
            build_minutes = 30
            ai_calls = 5

            [gateway.usage]
            build_minutes_per_build = 3

            [gateway.store]
            timeout_ms = 250
            "#,
        )
        .unwrap();
        let gateway = &config.gateway;
        assert_eq!(gateway.bind_address, Some("127.0.0.1:4000".parse().unwrap()));
        assert!(gateway.debug);
        assert!(!gateway.authentication.enabled);
        assert_eq!(
            gateway.authentication.mock_user_id.as_deref(),
            Some("dev-user")
        );
        assert_eq!(gateway.authentication.api_keys["abc123"].user_id, "user-1");
        assert_eq!(
            gateway.free_tier,
            FreeTierLimits {
                build_minutes: 30,
                ai_calls: 5
            }
        );
        assert_eq!(gateway.usage.build_minutes_per_build, 3);
        assert_eq!(gateway.store.timeout_ms, 250);
    }

    #[test]
    fn test_partial_free_tier_keeps_other_default() {
        let config = Config::load_from_str("[gateway.free_tier]\nai_calls = 10\n").unwrap();
        assert_eq!(config.gateway.free_tier.build_minutes, 100);
        assert_eq!(config.gateway.free_tier.ai_calls, 10);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = Config::load_from_str("[gateway]\nunknown = 1\n").unwrap_err();
        assert!(err.to_string().contains("unknown"), "{err}");

        assert!(Config::load_from_str("[gateway.free_tier]\nstorage_mb = 1\n").is_err());
        assert!(Config::load_from_str("[billing]\nenabled = true\n").is_err());
    }

    #[test]
    fn test_validation() {
        let err = Config::load_from_str("[gateway.usage]\nbuild_minutes_per_build = 0\n")
            .unwrap_err();
        assert!(err.to_string().contains("build_minutes_per_build"));

        let err = Config::load_from_str("[gateway.store]\ntimeout_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("timeout_ms"));

        let err = Config::load_from_str(
            "[gateway.authentication.api_keys]\n\"abc123\" = { user_id = \" \" }\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("abc123"));

        assert!(
            Config::load_from_str("[gateway.authentication]\nmock_user_id = \"\"\n").is_err()
        );
    }

    #[tokio::test]
    async fn test_load_and_verify_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gateway.free_tier]\nbuild_minutes = 7").unwrap();
        let config = Config::load_and_verify_from_path(file.path()).await.unwrap();
        assert_eq!(config.gateway.free_tier.build_minutes, 7);

        let missing = Config::load_and_verify_from_path(Path::new("/nonexistent/pocketcode.toml"))
            .await
            .unwrap_err();
        assert!(matches!(missing.get_details(), ErrorDetails::Config { .. }));
    }
}
