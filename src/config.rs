use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;

use crate::error::ConfigError;
use crate::extractor::ExtractionSchema;

pub const DEFAULT_BASE_URL: &str = "https://www.1tamilblasters.earth/";
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_token: Option<String>,
    pub telegram_api_url: String,
    pub base_url: String,
    pub request_delay: Duration,
    pub max_results: usize,
    /// Reserved for a result cache; nothing reads it yet.
    pub cache_time: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub schema: ExtractionSchema,
    pub log_level: tracing::Level,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            telegram_token: None,
            telegram_api_url: DEFAULT_TELEGRAM_API_URL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_delay: Duration::from_secs(2),
            max_results: 10,
            cache_time: Duration::from_secs(1800),
            request_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            schema: ExtractionSchema::default(),
            log_level: tracing::Level::INFO,
        }
    }
}

impl Config {
    /// Load `.env` if present, then read the process environment on top of
    /// the defaults.
    pub fn from_env() -> Result<Config, ConfigError> {
        dotenv().ok();
        let defaults = Config::default();
        let schema = defaults.schema;

        Ok(Config {
            telegram_token: get_env_opt("TELEGRAM_BOT_TOKEN"),
            telegram_api_url: get_env_or_default("TELEGRAM_API_URL", &defaults.telegram_api_url),
            base_url: get_env_or_default("SEARCH_BASE_URL", &defaults.base_url),
            request_delay: Duration::from_secs(get_parsed_or_default(
                "REQUEST_DELAY_SECS",
                defaults.request_delay.as_secs(),
            )?),
            max_results: get_parsed_or_default("MAX_RESULTS", defaults.max_results)?,
            cache_time: Duration::from_secs(get_parsed_or_default(
                "CACHE_TIME_SECS",
                defaults.cache_time.as_secs(),
            )?),
            request_timeout: Duration::from_secs(get_parsed_or_default(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            user_agent: get_env_or_default("USER_AGENT", &defaults.user_agent),
            schema: ExtractionSchema {
                entry: get_env_or_default("SELECTOR_ENTRY", &schema.entry),
                title: get_env_or_default("SELECTOR_TITLE", &schema.title),
                size: get_env_or_default("SELECTOR_SIZE", &schema.size),
                seeds: get_env_or_default("SELECTOR_SEEDS", &schema.seeds),
                date: get_env_or_default("SELECTOR_DATE", &schema.date),
                magnet: get_env_or_default("SELECTOR_MAGNET", &schema.magnet),
            },
            log_level: get_parsed_or_default("LOG_LEVEL", defaults.log_level)?,
        })
    }

    /// `<base-url>/search?query=`, tolerant of a trailing slash on the base.
    pub fn search_url(&self) -> String {
        format!("{}/search?query=", self.base_url.trim_end_matches('/'))
    }

    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.telegram_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))
    }
}

fn get_env_opt(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_parsed_or_default<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url_handles_trailing_slash() {
        let mut config = Config::default();
        assert_eq!(
            config.search_url(),
            "https://www.1tamilblasters.earth/search?query="
        );

        config.base_url = "http://localhost:8080".to_string();
        assert_eq!(config.search_url(), "http://localhost:8080/search?query=");
    }

    #[test]
    fn test_require_token_rejects_blank() {
        let mut config = Config::default();
        assert!(matches!(
            config.require_token(),
            Err(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))
        ));

        config.telegram_token = Some("   ".to_string());
        assert!(config.require_token().is_err());

        config.telegram_token = Some(" 123:abc ".to_string());
        assert_eq!(config.require_token().unwrap(), "123:abc");
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.request_delay, Duration::from_secs(2));
        assert_eq!(config.max_results, 10);
        assert_eq!(config.cache_time, Duration::from_secs(1800));
    }
}
