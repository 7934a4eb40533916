use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub session: SessionConfig,
    pub discovery: DiscoveryConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Site root; relative event links are resolved against it
    pub base_url: String,
    /// Path of the live-match listing page
    pub live_path: String,
    pub user_agent: String,
    /// Per-request timeout for event pages
    pub request_timeout_ms: u64,
    /// Timeout for fetching the listing page
    pub list_timeout_ms: u64,
    /// A fetched page is reused by extraction calls made within this window
    pub min_refetch_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.599.com".to_string(),
            live_path: "/live/".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            request_timeout_ms: 30_000,
            list_timeout_ms: 60_000,
            min_refetch_ms: 1_000,
        }
    }
}

impl SourceConfig {
    pub fn live_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.live_path)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Period between ticks of an active session
    pub poll_interval_secs: u64,
    /// Grace delay before closing a page that shows no event area
    pub no_event_grace_secs: u64,
    /// How long the no-score sentinel may persist before the session closes
    pub zero_score_timeout_secs: u64,
    /// Upper bound between two display refreshes of a quiet session
    pub display_refresh_secs: u64,
    /// Sleep after a tick that had a failing extraction
    pub error_backoff_secs: u64,
    /// Timeout applied to navigation and to every extraction call
    pub call_timeout_secs: u64,
    /// Score value meaning "nothing has happened yet"
    pub no_score_sentinel: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 3,
            no_event_grace_secs: 200,
            zero_score_timeout_secs: 200,
            display_refresh_secs: 10,
            error_backoff_secs: 3,
            call_timeout_secs: 30,
            no_score_sentinel: "0:0".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn no_event_grace(&self) -> Duration {
        Duration::from_secs(self.no_event_grace_secs)
    }

    pub fn zero_score_timeout(&self) -> Duration {
        Duration::from_secs(self.zero_score_timeout_secs)
    }

    pub fn display_refresh(&self) -> Duration {
        Duration::from_secs(self.display_refresh_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Period between discovery cycles (one extra cycle runs at startup)
    pub refresh_interval_secs: u64,
    /// Candidates whose status contains any of these are never monitored
    pub not_started_markers: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 300,
            not_started_markers: vec!["未开".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Corner snapshot, rewritten on every flush
    pub output_path: PathBuf,
    /// All-event archive, rewritten after discovery cycles and at shutdown
    pub archive_path: PathBuf,
    pub flush_interval_secs: u64,
    /// Substring attributing a corner description to the home side
    pub home_marker: String,
    /// Substring attributing a corner description to the away side
    pub away_marker: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("corner_only_data.json"),
            archive_path: PathBuf::from("match_events_data.json"),
            flush_interval_secs: 10,
            home_marker: "主队".to_string(),
            away_marker: "客队".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,
    /// Enable JSON formatted console logs
    pub json: bool,
    /// Directory for the daily rolling log file; file logging is skipped when unset
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info,cornerwatch=debug".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Bound on each drain phase
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", default_log_level())?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("CORNERWATCH_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (CORNERWATCH_SESSION__POLL_INTERVAL_SECS, etc.)
            .add_source(
                Environment::with_prefix("CORNERWATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.session.poll_interval_secs == 0 {
            errors.push("session.poll_interval_secs must be positive".to_string());
        }
        if self.session.call_timeout_secs == 0 {
            errors.push("session.call_timeout_secs must be positive".to_string());
        }
        if self.session.no_score_sentinel.trim().is_empty() {
            errors.push("session.no_score_sentinel must not be empty".to_string());
        }
        if self.discovery.refresh_interval_secs == 0 {
            errors.push("discovery.refresh_interval_secs must be positive".to_string());
        }
        if self.persistence.flush_interval_secs == 0 {
            errors.push("persistence.flush_interval_secs must be positive".to_string());
        }
        if self.persistence.home_marker.is_empty() || self.persistence.away_marker.is_empty() {
            errors.push("persistence side markers must not be empty".to_string());
        }
        if self.persistence.output_path == self.persistence.archive_path {
            errors.push("persistence.output_path and archive_path must differ".to_string());
        }
        if url::Url::parse(&self.source.base_url).is_err() {
            errors.push(format!("source.base_url is not a URL: {}", self.source.base_url));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.session.poll_interval(), Duration::from_secs(3));
        assert_eq!(cfg.session.zero_score_timeout(), Duration::from_secs(200));
        assert_eq!(cfg.discovery.refresh_interval_secs, 300);
        assert_eq!(cfg.source.live_url(), "https://www.599.com/live/");
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let mut cfg = AppConfig::default();
        cfg.session.poll_interval_secs = 0;
        cfg.persistence.archive_path = cfg.persistence.output_path.clone();
        cfg.source.base_url = "not a url".to_string();

        let errors = cfg.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("poll_interval_secs")));
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let dir = std::env::temp_dir().join("cornerwatch_config_test_missing");
        let cfg = AppConfig::load_from(&dir).unwrap();
        assert_eq!(cfg.session.no_score_sentinel, "0:0");
        assert_eq!(cfg.discovery.not_started_markers, vec!["未开".to_string()]);
    }

    #[test]
    fn test_env_overrides_nested_key() {
        let dir = std::env::temp_dir().join("cornerwatch_config_test_env");
        std::env::set_var("CORNERWATCH_SESSION__POLL_INTERVAL_SECS", "7");
        let loaded = AppConfig::load_from(&dir);
        std::env::remove_var("CORNERWATCH_SESSION__POLL_INTERVAL_SECS");

        let cfg = loaded.unwrap();
        assert_eq!(cfg.session.poll_interval_secs, 7);
        assert_eq!(cfg.session.no_score_sentinel, "0:0");
    }
}
