//! Engine Configuration Settings
//!
//! Configuration types for the DXLink options engine, loaded from
//! environment variables.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;

use crate::application::ports::OptionDataSource;
use crate::application::services::{ResolverConfig, RetryConfig, StrikeResolver};
use crate::domain::calendar::TradingCalendar;
use crate::infrastructure::dxlink::{ApiToken, ProtocolConfig};

/// DXLink session settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Interval between client keepalives.
    pub keepalive_interval: Duration,
    /// Keepalive timeout advertised in `SETUP`.
    pub keepalive_timeout: Duration,
    /// Symbols per `FEED_SUBSCRIPTION` message.
    pub subscription_batch_size: usize,
    /// Aggregation period requested in `FEED_SETUP`.
    pub aggregation_period: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Reconnection attempts before giving up; must be at least 1.
    pub max_reconnect_attempts: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            keepalive_interval: Duration::from_secs(30),
            keepalive_timeout: Duration::from_secs(60),
            subscription_batch_size: 45,
            aggregation_period: Duration::from_secs(60),
            reconnect_delay_initial: Duration::from_secs(1),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 3,
        }
    }
}

impl SessionSettings {
    /// Handshake parameters for the protocol machine.
    #[must_use]
    pub fn protocol_config(&self) -> ProtocolConfig {
        ProtocolConfig {
            keepalive_timeout_secs: self.keepalive_timeout.as_secs(),
            aggregation_period_secs: self.aggregation_period.as_secs(),
            batch_size: self.subscription_batch_size,
            ..ProtocolConfig::default()
        }
    }
}

/// Retrying query settings.
#[derive(Debug, Clone)]
pub struct QuerySettings {
    /// Retries after the first lookup.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub retry_delay: Duration,
    /// Double the delay after every retry.
    pub exponential_backoff: bool,
}

impl Default for QuerySettings {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            max_retries: retry.max_retries,
            retry_delay: retry.delay,
            exponential_backoff: retry.exponential_backoff,
        }
    }
}

impl From<&QuerySettings> for RetryConfig {
    fn from(settings: &QuerySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            delay: settings.retry_delay,
            exponential_backoff: settings.exponential_backoff,
        }
    }
}

/// Subscription filter settings used at startup.
#[derive(Debug, Clone)]
pub struct FilterSettings {
    /// Strike window around the underlying price, in percent.
    pub strike_range_pct: f64,
    /// Latest expiration subscribed, in trading days from today.
    pub max_expiration_days: u32,
    /// JSON file mapping each underlying to its option symbols.
    pub option_chain_file: Option<String>,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            strike_range_pct: 10.0,
            max_expiration_days: 45,
            option_chain_file: None,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// DXLink WebSocket URL.
    pub url: String,
    /// Quote streamer token.
    pub token: ApiToken,
    /// Underlyings streamed at startup.
    pub underlyings: Vec<String>,
    /// Market holidays.
    pub holidays: Vec<NaiveDate>,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
    /// Session settings.
    pub session: SessionSettings,
    /// Query settings.
    pub query: QuerySettings,
    /// Strike resolver bounds (`RESOLVER_MAX_ATTEMPTS`, `RESOLVER_MAX_STEPS`).
    ///
    /// The streaming binary never resolves strikes; applications embedding
    /// the crate get a configured resolver from [`EngineConfig::strike_resolver`].
    pub resolver: ResolverConfig,
    /// Startup subscription filter.
    pub filter: FilterSettings,
}

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or empty, a
    /// holiday date does not parse, or the reconnect budget is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = required_env("DXLINK_URL")?;
        let token = ApiToken::new(required_env("DXLINK_TOKEN")?);

        let holidays = parse_dates(&std::env::var("MARKET_HOLIDAYS").unwrap_or_default())?;

        let session_defaults = SessionSettings::default();
        let session = SessionSettings {
            keepalive_interval: parse_env_duration_secs(
                "DXLINK_KEEPALIVE_INTERVAL_SECS",
                session_defaults.keepalive_interval,
            ),
            keepalive_timeout: parse_env_duration_secs(
                "DXLINK_KEEPALIVE_TIMEOUT_SECS",
                session_defaults.keepalive_timeout,
            ),
            subscription_batch_size: parse_env(
                "DXLINK_SUBSCRIPTION_BATCH_SIZE",
                session_defaults.subscription_batch_size,
            ),
            aggregation_period: parse_env_duration_secs(
                "DXLINK_AGGREGATION_PERIOD_SECS",
                session_defaults.aggregation_period,
            ),
            reconnect_delay_initial: parse_env_duration_millis(
                "DXLINK_RECONNECT_DELAY_INITIAL_MS",
                session_defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                "DXLINK_RECONNECT_DELAY_MAX_SECS",
                session_defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_env(
                "DXLINK_RECONNECT_DELAY_MULTIPLIER",
                session_defaults.reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: non_zero(
                "DXLINK_MAX_RECONNECT_ATTEMPTS",
                parse_env(
                    "DXLINK_MAX_RECONNECT_ATTEMPTS",
                    session_defaults.max_reconnect_attempts,
                ),
            )?,
        };

        let query_defaults = QuerySettings::default();
        let query = QuerySettings {
            max_retries: parse_env("QUERY_MAX_RETRIES", query_defaults.max_retries),
            retry_delay: parse_env_duration_millis(
                "QUERY_RETRY_DELAY_MS",
                query_defaults.retry_delay,
            ),
            exponential_backoff: parse_env_bool(
                "QUERY_EXPONENTIAL_BACKOFF",
                query_defaults.exponential_backoff,
            ),
        };

        let resolver_defaults = ResolverConfig::default();
        let resolver = ResolverConfig {
            max_attempts: parse_env("RESOLVER_MAX_ATTEMPTS", resolver_defaults.max_attempts),
            max_steps: parse_env("RESOLVER_MAX_STEPS", resolver_defaults.max_steps),
        };

        let filter_defaults = FilterSettings::default();
        let filter = FilterSettings {
            strike_range_pct: parse_env("DXLINK_STRIKE_RANGE_PCT", filter_defaults.strike_range_pct),
            max_expiration_days: parse_env(
                "DXLINK_MAX_EXPIRATION_DAYS",
                filter_defaults.max_expiration_days,
            ),
            option_chain_file: std::env::var("DXLINK_OPTION_CHAIN_FILE")
                .ok()
                .filter(|path| !path.trim().is_empty()),
        };

        Ok(Self {
            url,
            token,
            underlyings: parse_list(&std::env::var("DXLINK_UNDERLYINGS").unwrap_or_default()),
            holidays,
            metrics_port: parse_env("METRICS_PORT", 9090),
            session,
            query,
            resolver,
            filter,
        })
    }

    /// Strike resolver over `source` using the configured holidays and
    /// resolver bounds.
    #[must_use]
    pub fn strike_resolver(&self, source: Arc<dyn OptionDataSource>) -> StrikeResolver {
        StrikeResolver::new(
            source,
            TradingCalendar::new(self.holidays.iter().copied()),
            self.resolver,
        )
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Value could not be parsed.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

fn non_zero(key: &str, value: u32) -> Result<u32, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn required_env(key: &str) -> Result<String, ConfigError> {
    let value = std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| match v.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" => Some(true),
            "0" | "false" | "no" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

/// Split a comma list, dropping blanks and upper-casing tickers.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .collect()
}

/// Parse a comma list of `YYYY-MM-DD` dates.
fn parse_dates(raw: &str) -> Result<Vec<NaiveDate>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| ConfigError::InvalidValue {
                key: "MARKET_HOLIDAYS".to_string(),
                value: s.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_settings_defaults() {
        let settings = SessionSettings::default();
        assert_eq!(settings.keepalive_interval, Duration::from_secs(30));
        assert_eq!(settings.keepalive_timeout, Duration::from_secs(60));
        assert_eq!(settings.subscription_batch_size, 45);
        assert_eq!(settings.max_reconnect_attempts, 3);
        assert!((settings.reconnect_delay_multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn protocol_config_from_session_settings() {
        let settings = SessionSettings {
            keepalive_timeout: Duration::from_secs(90),
            subscription_batch_size: 10,
            ..SessionSettings::default()
        };
        let protocol = settings.protocol_config();
        assert_eq!(protocol.keepalive_timeout_secs, 90);
        assert_eq!(protocol.aggregation_period_secs, 60);
        assert_eq!(protocol.batch_size, 10);
    }

    #[test]
    fn query_settings_convert_to_retry_config() {
        let settings = QuerySettings {
            max_retries: 5,
            retry_delay: Duration::from_millis(250),
            exponential_backoff: true,
        };
        let retry = RetryConfig::from(&settings);
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.delay, Duration::from_millis(250));
        assert!(retry.exponential_backoff);
    }

    #[test]
    fn zero_reconnect_budget_is_rejected() {
        assert!(matches!(
            non_zero("DXLINK_MAX_RECONNECT_ATTEMPTS", 0),
            Err(ConfigError::InvalidValue { key, .. }) if key == "DXLINK_MAX_RECONNECT_ATTEMPTS"
        ));
        assert_eq!(non_zero("DXLINK_MAX_RECONNECT_ATTEMPTS", 5).unwrap(), 5);
    }

    #[test]
    fn list_parsing_trims_and_uppercases() {
        assert_eq!(parse_list(" spy, qqq ,,IWM"), vec!["SPY", "QQQ", "IWM"]);
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn date_parsing() {
        let dates = parse_dates("2024-01-01, 2024-01-15").unwrap();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            ]
        );
        assert!(parse_dates("").unwrap().is_empty());
        assert!(matches!(
            parse_dates("2024-13-01"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    fn config() -> EngineConfig {
        EngineConfig {
            url: "wss://example.test".to_string(),
            token: ApiToken::new("very-secret"),
            underlyings: vec!["SPY".to_string()],
            holidays: Vec::new(),
            metrics_port: 0,
            session: SessionSettings::default(),
            query: QuerySettings::default(),
            resolver: ResolverConfig::default(),
            filter: FilterSettings::default(),
        }
    }

    #[test]
    fn token_is_redacted_in_config_debug() {
        assert!(!format!("{:?}", config()).contains("very-secret"));
    }

    #[test]
    fn strike_resolver_uses_configured_bounds_and_holidays() {
        let holiday = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let config = EngineConfig {
            holidays: vec![holiday],
            resolver: ResolverConfig {
                max_attempts: 4,
                max_steps: 30,
            },
            ..config()
        };
        let store = Arc::new(crate::SubscriptionStore::new());
        let query = crate::SnapshotQuery::new(store, RetryConfig::default());

        let resolver = config.strike_resolver(Arc::new(query));

        assert_eq!(resolver.config(), config.resolver);
        let monday = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
        assert_eq!(
            resolver.expiration(monday, 4),
            NaiveDate::from_ymd_opt(2024, 3, 18).unwrap()
        );
    }
}
