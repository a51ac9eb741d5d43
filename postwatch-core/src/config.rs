use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// When the scrape fallback runs after a primary fetch without posts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Whenever the primary fetch produced no posts, whatever the reason.
    #[default]
    OnEmpty,
    /// Only when the primary fetch was rate limited or failed.
    OnFailure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub accounts_file: PathBuf,
    pub cache_file: PathBuf,
    pub output_dir: PathBuf,
    pub poll_interval_secs: u64,
    pub lookback_minutes: u64,
    pub rate_limit_buffer_secs: u64,
    pub max_results: u32,
    pub fallback_cap: usize,
    pub fallback_policy: FallbackPolicy,
    pub download_concurrency: usize,
    pub request_timeout_secs: u64,
    pub search_api_base: String,
    pub scraper_base_url: String,
    pub bearer_token_env: String,
    pub user_agent: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            accounts_file: PathBuf::from("accounts.txt"),
            cache_file: PathBuf::from("cached_tweets.json"),
            output_dir: PathBuf::from("tweets"),
            poll_interval_secs: 900,
            lookback_minutes: 15,
            rate_limit_buffer_secs: 10,
            max_results: 100,
            fallback_cap: 100,
            fallback_policy: FallbackPolicy::OnEmpty,
            download_concurrency: 4,
            request_timeout_secs: 30,
            search_api_base: "https://api.twitter.com/2".to_string(),
            scraper_base_url: "https://nitter.net".to_string(),
            bearer_token_env: "BEARER_TOKEN".to_string(),
            user_agent: concat!("postwatch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl AppConfig {
    /// Reads the TOML config at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                return Err(ConfigError::PermissionDenied {
                    path: path.display().to_string(),
                })
            }
            Err(e) => {
                return Err(ConfigError::InvalidValue {
                    field: "config path".to_string(),
                    value: format!("{} ({})", path.display(), e),
                })
            }
        };

        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("poll_interval_secs", self.poll_interval_secs),
            ("lookback_minutes", self.lookback_minutes),
            ("fallback_cap", self.fallback_cap as u64),
            ("download_concurrency", self.download_concurrency as u64),
            ("request_timeout_secs", self.request_timeout_secs),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                });
            }
        }

        // The recent search endpoint only accepts 10..=100.
        if !(10..=100).contains(&self.max_results) {
            return Err(ConfigError::InvalidValue {
                field: "max_results".to_string(),
                value: self.max_results.to_string(),
            });
        }

        if self.bearer_token_env.trim().is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "bearer_token_env must name an environment variable".to_string(),
            });
        }

        Ok(())
    }

    /// The search API token, supplied through the environment.
    pub fn bearer_token(&self) -> Result<String, ConfigError> {
        std::env::var(&self.bearer_token_env)
            .ok()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvironmentVariable {
                var_name: self.bearer_token_env.clone(),
            })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_minutes * 60)
    }

    pub fn rate_limit_buffer(&self) -> Duration {
        Duration::from_secs(self.rate_limit_buffer_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(900));
        assert_eq!(config.lookback(), Duration::from_secs(15 * 60));
        assert_eq!(config.rate_limit_buffer(), Duration::from_secs(10));
        assert_eq!(config.fallback_cap, 100);
        assert_eq!(config.fallback_policy, FallbackPolicy::OnEmpty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            poll_interval_secs = 60
            fallback_policy = "on_failure"
            output_dir = "out"
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.fallback_policy, FallbackPolicy::OnFailure);
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.cache_file, PathBuf::from("cached_tweets.json"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = AppConfig::from_toml("download_concurrency = 0");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "download_concurrency"
        ));

        let result = AppConfig::from_toml("max_results = 500");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        let result = AppConfig::from_toml("poll_interval_secs = \"soon\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = env::temp_dir().join(format!("postwatch_{}.toml", uuid::Uuid::new_v4()));
        let config = AppConfig::load(&path).expect("missing config falls back to defaults");
        assert_eq!(config.poll_interval_secs, 900);
    }

    #[test]
    fn test_missing_bearer_token() {
        let config = AppConfig {
            bearer_token_env: format!("POSTWATCH_TEST_TOKEN_{}", uuid::Uuid::new_v4().simple()),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.bearer_token(),
            Err(ConfigError::MissingEnvironmentVariable { .. })
        ));
    }
}
