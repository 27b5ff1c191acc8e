//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use time::UtcOffset;
use url::Url;

use crate::error::ConfigError;
use crate::market::discovery::{default_sports, DEFAULT_BOOKMAKERS};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Odds Provider ===
    /// Provider base URL.
    #[serde(default = "default_odds_api_url")]
    pub odds_api_url: String,

    /// Minimum spacing between provider requests, in milliseconds.
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,

    /// Per-request HTTP timeout, in milliseconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_ms: u64,

    /// Region filter sent with odds requests.
    #[serde(default = "default_regions")]
    pub regions: String,

    /// Bookmaker filter (comma-separated, empty = all).
    #[serde(default = "default_bookmakers")]
    pub bookmakers: Vec<String>,

    /// Sport keys to scan (comma-separated, empty = built-in catalogue).
    #[serde(default)]
    pub sports: Vec<String>,

    /// Drop sports the provider reports inactive before the first cycle.
    #[serde(default)]
    pub discover_sports: bool,

    /// Also query player-prop markets through the per-event endpoint.
    #[serde(default)]
    pub scan_event_props: bool,

    // === Credentials ===
    /// Backing credential list.
    #[serde(default = "default_api_keys_file")]
    pub api_keys_file: PathBuf,

    /// Run the generation job when every credential is exhausted.
    #[serde(default = "default_true")]
    pub auto_generate_keys: bool,

    /// Generation job command line (whitespace-separated). Unset disables generation.
    #[serde(default)]
    pub key_generator_command: Option<String>,

    /// Display name passed to the generation job.
    #[serde(default = "default_display_name")]
    pub key_generator_display_name: String,

    /// Hard ceiling on a generation job, in seconds.
    #[serde(default = "default_generation_timeout")]
    pub key_generation_timeout_secs: u64,

    // === Scanner ===
    /// Alert dedup window, in minutes.
    #[serde(default = "default_cooldown")]
    pub cooldown_minutes: u64,

    /// Recent-opportunity ring buffer capacity.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Remaining-quota level below which a warning is sent.
    #[serde(default = "default_low_quota")]
    pub low_quota_threshold: u32,

    /// Backoff cap while awaiting a credential, in minutes.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_minutes: u64,

    /// Imminent-event window, in minutes.
    #[serde(default = "default_lineup_minutes")]
    pub lineup_alert_minutes: u32,

    /// Offset of the wall clock the slot table is expressed in.
    #[serde(default)]
    pub schedule_utc_offset_hours: i8,

    // === Server Configuration ===
    /// HTTP server port for health/status/metrics endpoints.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_odds_api_url() -> String {
    crate::market::client::DEFAULT_BASE_URL.to_string()
}

fn default_request_delay() -> u64 {
    3000
}

fn default_http_timeout() -> u64 {
    15_000
}

fn default_regions() -> String {
    "eu,fr".to_string()
}

fn default_bookmakers() -> Vec<String> {
    DEFAULT_BOOKMAKERS.iter().map(|b| b.to_string()).collect()
}

fn default_api_keys_file() -> PathBuf {
    PathBuf::from("api_keys.txt")
}

fn default_true() -> bool {
    true
}

fn default_display_name() -> String {
    "AutoBot".to_string()
}

fn default_generation_timeout() -> u64 {
    600
}

fn default_cooldown() -> u64 {
    5
}

fn default_history_limit() -> usize {
    1000
}

fn default_low_quota() -> u32 {
    50
}

fn default_max_backoff() -> u64 {
    10
}

fn default_lineup_minutes() -> u32 {
    60
}

fn default_port() -> u16 {
    8080
}

/// Filter used when verbose logging is requested.
pub const VERBOSE_LOG_DIRECTIVE: &str = "surebet_scanner=debug,info";

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            odds_api_url: default_odds_api_url(),
            request_delay_ms: default_request_delay(),
            http_timeout_ms: default_http_timeout(),
            regions: default_regions(),
            bookmakers: default_bookmakers(),
            sports: Vec::new(),
            discover_sports: false,
            scan_event_props: false,
            api_keys_file: default_api_keys_file(),
            auto_generate_keys: true,
            key_generator_command: None,
            key_generator_display_name: default_display_name(),
            key_generation_timeout_secs: default_generation_timeout(),
            cooldown_minutes: default_cooldown(),
            history_limit: default_history_limit(),
            low_quota_threshold: default_low_quota(),
            max_backoff_minutes: default_max_backoff(),
            lineup_alert_minutes: default_lineup_minutes(),
            schedule_utc_offset_hours: 0,
            port: default_port(),
            rust_log: default_log_level(),
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Ok(envy::from_env()?)
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Err(e) = Url::parse(&self.odds_api_url) {
            return Err(invalid("ODDS_API_URL", e.to_string()));
        }

        if self.cooldown_minutes == 0 {
            return Err(invalid("COOLDOWN_MINUTES", "must be at least 1"));
        }

        if self.history_limit == 0 {
            return Err(invalid("HISTORY_LIMIT", "must be at least 1"));
        }

        if !(-14..=14).contains(&self.schedule_utc_offset_hours) {
            return Err(invalid(
                "SCHEDULE_UTC_OFFSET_HOURS",
                format!("{} is outside -14..=14", self.schedule_utc_offset_hours),
            ));
        }

        if self.key_generation_timeout_secs == 0 {
            return Err(invalid("KEY_GENERATION_TIMEOUT_SECS", "must be at least 1"));
        }

        if self.max_backoff_minutes == 0 {
            return Err(invalid("MAX_BACKOFF_MINUTES", "must be at least 1"));
        }

        Ok(())
    }

    /// Tracing filter directive. Verbose (flag or `VERBOSE`) wins over `RUST_LOG`.
    pub fn log_directive(&self, verbose_flag: bool) -> String {
        if verbose_flag || self.verbose {
            VERBOSE_LOG_DIRECTIVE.to_string()
        } else {
            self.rust_log.clone()
        }
    }

    /// Minimum spacing between provider requests.
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// Per-request HTTP timeout.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Alert dedup window.
    pub fn cooldown(&self) -> time::Duration {
        time::Duration::minutes(self.cooldown_minutes as i64)
    }

    /// Generation job ceiling.
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.key_generation_timeout_secs)
    }

    /// Offset the slot table is evaluated in. Out-of-range values fall back to UTC.
    pub fn schedule_offset(&self) -> UtcOffset {
        UtcOffset::from_hms(self.schedule_utc_offset_hours, 0, 0).unwrap_or(UtcOffset::UTC)
    }

    /// Bookmaker query parameter, `None` when unfiltered.
    pub fn bookmakers_param(&self) -> Option<String> {
        let keys: Vec<&str> = self
            .bookmakers
            .iter()
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
            .collect();
        (!keys.is_empty()).then(|| keys.join(","))
    }

    /// Sports to scan, in configured order.
    pub fn sport_keys(&self) -> Vec<String> {
        let configured: Vec<String> = self
            .sports
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if configured.is_empty() {
            default_sports()
        } else {
            configured
        }
    }

    /// Generation job argv, `None` when generation is unavailable.
    pub fn key_generator_argv(&self) -> Option<Vec<String>> {
        if !self.auto_generate_keys {
            return None;
        }
        let argv: Vec<String> = self
            .key_generator_command
            .as_deref()?
            .split_whitespace()
            .map(str::to_string)
            .collect();
        (!argv.is_empty()).then_some(argv)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
