//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the fixed extractor policy constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application settings loaded from environment variables
#[derive(Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,
    /// YouTube Data API key used by the search path
    pub youtube_token: String,

    /// Outbound proxy URL (only used when `use_proxy` is set)
    pub proxy_url: Option<String>,
    /// Route Telegram and YouTube traffic through `proxy_url`
    #[serde(default)]
    pub use_proxy: bool,

    /// Maximum number of updates handled at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Root directory for per-chat download workspaces
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: String,

    /// Path or name of the yt-dlp compatible binary
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: String,
    /// Upper bound for a single extractor invocation
    #[serde(default = "default_extractor_timeout_secs")]
    pub extractor_timeout_secs: u64,
    /// How long a chat's search results are remembered
    #[serde(default = "default_candidate_cache_ttl_secs")]
    pub candidate_cache_ttl_secs: u64,
}

const fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_downloads_dir() -> String {
    "files".to_string()
}

fn default_ytdlp_path() -> String {
    "yt-dlp".to_string()
}

const fn default_extractor_timeout_secs() -> u64 {
    600
}

const fn default_candidate_cache_ttl_secs() -> u64 {
    3600
}

// Tokens never reach the logs, not even through `{:?}`.
impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("telegram_token", &"[MASKED]")
            .field("youtube_token", &"[MASKED]")
            .field("proxy_url", &self.proxy_url)
            .field("use_proxy", &self.use_proxy)
            .field("concurrency", &self.concurrency)
            .field("downloads_dir", &self.downloads_dir)
            .field("ytdlp_path", &self.ytdlp_path)
            .field("extractor_timeout_secs", &self.extractor_timeout_secs)
            .field("candidate_cache_ttl_secs", &self.candidate_cache_ttl_secs)
            .finish()
    }
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use oxide_tunes::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a value is invalid.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // This file shouldn't be checked into git
            .add_source(File::with_name("config/local").required(false))
            // Environment::default() maps UPPER_SNAKE_CASE to snake_case keys,
            // empty variables are treated as unset
            .add_source(
                Environment::default()
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check invariants that serde defaults cannot express
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Message` describing the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram_token.trim().is_empty() {
            return Err(ConfigError::Message("TELEGRAM_TOKEN is empty".into()));
        }
        if self.youtube_token.trim().is_empty() {
            return Err(ConfigError::Message("YOUTUBE_TOKEN is empty".into()));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Message(
                "CONCURRENCY must be at least 1".into(),
            ));
        }
        if self.use_proxy {
            let Some(url) = self.proxy_url.as_deref() else {
                return Err(ConfigError::Message(
                    "USE_PROXY is set but PROXY_URL is missing".into(),
                ));
            };
            reqwest::Proxy::all(url)
                .map_err(|e| ConfigError::Message(format!("parse proxy URL error: {e}")))?;
        }
        Ok(())
    }

    /// Proxy to route outbound HTTP traffic through, if enabled
    ///
    /// # Errors
    ///
    /// Returns an error if the configured proxy URL cannot be parsed.
    pub fn proxy(&self) -> Result<Option<reqwest::Proxy>, reqwest::Error> {
        match (self.use_proxy, self.proxy_url.as_deref()) {
            (true, Some(url)) => reqwest::Proxy::all(url).map(Some),
            _ => Ok(None),
        }
    }

    /// Absolute downloads root, resolved against the current directory
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn downloads_root(&self) -> std::io::Result<PathBuf> {
        Ok(std::env::current_dir()?.join(&self.downloads_dir))
    }

    /// Timeout applied to each extractor invocation
    #[must_use]
    pub const fn extractor_timeout(&self) -> Duration {
        Duration::from_secs(self.extractor_timeout_secs)
    }

    /// Time-to-live for cached search results
    #[must_use]
    pub const fn candidate_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.candidate_cache_ttl_secs)
    }
}

/// Default number of concurrently handled updates
pub const DEFAULT_CONCURRENCY: usize = 100;

// Search configuration
/// Number of candidates requested from the search provider
pub const SEARCH_MAX_RESULTS: u8 = 5;
/// HTTP timeout for search requests
pub const SEARCH_HTTP_TIMEOUT_SECS: u64 = 30;

// Extractor policy
/// Upper bound for the source audio stream selected by the extractor
pub const EXTRACTOR_MAX_SOURCE_MB: u32 = 10;
/// Network retries performed by the extractor itself
pub const EXTRACTOR_RETRIES: u32 = 5;
/// Audio container produced by the extractor
pub const EXTRACTOR_AUDIO_FORMAT: &str = "mp3";

/// Capacity of the per-chat search result cache
pub const CANDIDATE_CACHE_MAX_SIZE: u64 = 10_000;

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn settings() -> Settings {
        Settings {
            telegram_token: "123:abc".to_string(),
            youtube_token: "yt-key".to_string(),
            proxy_url: None,
            use_proxy: false,
            concurrency: DEFAULT_CONCURRENCY,
            downloads_dir: default_downloads_dir(),
            ytdlp_path: default_ytdlp_path(),
            extractor_timeout_secs: default_extractor_timeout_secs(),
            candidate_cache_ttl_secs: default_candidate_cache_ttl_secs(),
        }
    }

    // The only test in the crate that touches the process environment
    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        env::set_var("TELEGRAM_TOKEN", "dummy_token");
        env::set_var("YOUTUBE_TOKEN", "dummy_key");
        env::set_var("CONCURRENCY", "7");
        env::set_var("DOWNLOADS_DIR", "");

        let settings = Settings::new()?;
        assert_eq!(settings.telegram_token, "dummy_token");
        assert_eq!(settings.youtube_token, "dummy_key");
        assert_eq!(settings.concurrency, 7);
        // empty env var falls back to the default
        assert_eq!(settings.downloads_dir, "files");
        assert!(!settings.use_proxy);

        env::remove_var("TELEGRAM_TOKEN");
        env::remove_var("YOUTUBE_TOKEN");
        env::remove_var("CONCURRENCY");
        env::remove_var("DOWNLOADS_DIR");
        Ok(())
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut s = settings();
        s.concurrency = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_validate_proxy() {
        let mut s = settings();
        s.use_proxy = true;
        assert!(s.validate().is_err(), "proxy enabled without URL");

        s.proxy_url = Some("http://127.0.0.1:3128".to_string());
        assert!(s.validate().is_ok());
        assert!(matches!(s.proxy(), Ok(Some(_))));

        s.use_proxy = false;
        assert!(matches!(s.proxy(), Ok(None)));
    }

    #[test]
    fn test_debug_masks_tokens() {
        let rendered = format!("{:?}", settings());
        assert!(!rendered.contains("123:abc"));
        assert!(!rendered.contains("yt-key"));
        assert!(rendered.contains("[MASKED]"));
    }
}
