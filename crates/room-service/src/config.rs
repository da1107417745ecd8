//! Room service configuration.
//!
//! Configuration is loaded from environment variables. The store URL may
//! carry credentials and is redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default room lifetime in seconds.
pub const DEFAULT_ROOM_TTL_SECONDS: u64 = 600;

/// Shortest room lifetime accepted.
pub const MIN_ROOM_TTL_SECONDS: u64 = 60;

/// Longest room lifetime accepted (one day).
pub const MAX_ROOM_TTL_SECONDS: u64 = 86_400;

/// Default gateway requests per minute per client IP.
pub const DEFAULT_IP_RATE_LIMIT_PER_MINUTE: u32 = 50;

/// Default messages per minute per membership token.
pub const DEFAULT_MESSAGE_RATE_LIMIT_PER_MINUTE: u32 = 15;

/// Default edit/delete/react actions per minute per room.
pub const DEFAULT_ROOM_ACTION_RATE_LIMIT_PER_MINUTE: u32 = 20;

/// Default room creations per hour per client IP.
pub const DEFAULT_ROOM_CREATE_RATE_LIMIT_PER_HOUR: u32 = 10;

/// Default delay before a typing indicator clears itself.
pub const DEFAULT_TYPING_TIMEOUT_MS: u64 = 3_000;

/// Accepted range for the typing auto-clear delay.
pub const TYPING_TIMEOUT_RANGE_MS: std::ops::RangeInclusive<u64> = 3_000..=5_000;

/// Default graceful shutdown drain period.
pub const DEFAULT_DRAIN_SECONDS: u64 = 5;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text lines.
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::InvalidValue(format!(
                "LOG_FORMAT must be 'text' or 'json', got '{other}'"
            ))),
        }
    }
}

/// Room service configuration.
#[derive(Clone)]
pub struct Config {
    /// Shared store connection URL.
    pub redis_url: SecretString,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Whether issued cookies carry the `Secure` attribute.
    pub secure_cookies: bool,

    /// Whether `X-Forwarded-For` / `X-Real-IP` are trusted for the client IP.
    pub trust_proxy_headers: bool,

    /// Room lifetime used when a create request omits one.
    pub default_room_ttl_seconds: u64,

    /// Gateway requests per minute per client IP.
    pub ip_rate_limit_per_minute: u32,

    /// Messages per minute per membership token.
    pub message_rate_limit_per_minute: u32,

    /// Edit/delete/react actions per minute per room.
    pub room_action_rate_limit_per_minute: u32,

    /// Room creations per hour per client IP.
    pub room_create_rate_limit_per_hour: u32,

    /// Delay before a typing indicator clears itself.
    pub typing_timeout_ms: u64,

    /// Seconds to keep serving in-flight requests after a shutdown signal.
    pub drain_seconds: u64,

    /// Log output format.
    pub log_format: LogFormat,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("secure_cookies", &self.secure_cookies)
            .field("trust_proxy_headers", &self.trust_proxy_headers)
            .field("default_room_ttl_seconds", &self.default_room_ttl_seconds)
            .field("ip_rate_limit_per_minute", &self.ip_rate_limit_per_minute)
            .field(
                "message_rate_limit_per_minute",
                &self.message_rate_limit_per_minute,
            )
            .field(
                "room_action_rate_limit_per_minute",
                &self.room_action_rate_limit_per_minute,
            )
            .field(
                "room_create_rate_limit_per_hour",
                &self.room_create_rate_limit_per_hour,
            )
            .field("typing_timeout_ms", &self.typing_timeout_ms)
            .field("drain_seconds", &self.drain_seconds)
            .field("log_format", &self.log_format)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Invalid rate limit configuration: {0}")]
    InvalidRateLimit(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let redis_url = vars
            .get("REDIS_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("REDIS_URL".to_string()))?;
        let redis_url = SecretString::from(redis_url.clone());

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let secure_cookies = parse_bool(vars, "SECURE_COOKIES", true)?;
        let trust_proxy_headers = parse_bool(vars, "TRUST_PROXY_HEADERS", false)?;

        let default_room_ttl_seconds =
            parse_number(vars, "DEFAULT_ROOM_TTL_SECONDS", DEFAULT_ROOM_TTL_SECONDS)?;
        if !(MIN_ROOM_TTL_SECONDS..=MAX_ROOM_TTL_SECONDS).contains(&default_room_ttl_seconds) {
            return Err(ConfigError::InvalidValue(format!(
                "DEFAULT_ROOM_TTL_SECONDS must be between {MIN_ROOM_TTL_SECONDS} and \
                 {MAX_ROOM_TTL_SECONDS}, got {default_room_ttl_seconds}"
            )));
        }

        let ip_rate_limit_per_minute = parse_rate_limit(
            vars,
            "IP_RATE_LIMIT_PER_MINUTE",
            DEFAULT_IP_RATE_LIMIT_PER_MINUTE,
        )?;
        let message_rate_limit_per_minute = parse_rate_limit(
            vars,
            "MESSAGE_RATE_LIMIT_PER_MINUTE",
            DEFAULT_MESSAGE_RATE_LIMIT_PER_MINUTE,
        )?;
        let room_action_rate_limit_per_minute = parse_rate_limit(
            vars,
            "ROOM_ACTION_RATE_LIMIT_PER_MINUTE",
            DEFAULT_ROOM_ACTION_RATE_LIMIT_PER_MINUTE,
        )?;
        let room_create_rate_limit_per_hour = parse_rate_limit(
            vars,
            "ROOM_CREATE_RATE_LIMIT_PER_HOUR",
            DEFAULT_ROOM_CREATE_RATE_LIMIT_PER_HOUR,
        )?;

        let typing_timeout_ms = parse_number(vars, "TYPING_TIMEOUT_MS", DEFAULT_TYPING_TIMEOUT_MS)?;
        if !TYPING_TIMEOUT_RANGE_MS.contains(&typing_timeout_ms) {
            return Err(ConfigError::InvalidValue(format!(
                "TYPING_TIMEOUT_MS must be between {} and {}, got {typing_timeout_ms}",
                TYPING_TIMEOUT_RANGE_MS.start(),
                TYPING_TIMEOUT_RANGE_MS.end()
            )));
        }

        let drain_seconds = parse_number(vars, "DRAIN_SECONDS", DEFAULT_DRAIN_SECONDS)?;

        let log_format = vars
            .get("LOG_FORMAT")
            .map(|value| value.parse())
            .transpose()?
            .unwrap_or(LogFormat::Text);

        Ok(Config {
            redis_url,
            bind_address,
            secure_cookies,
            trust_proxy_headers,
            default_room_ttl_seconds,
            ip_rate_limit_per_minute,
            message_rate_limit_per_minute,
            room_action_rate_limit_per_minute,
            room_create_rate_limit_per_hour,
            typing_timeout_ms,
            drain_seconds,
            log_format,
        })
    }
}

fn parse_bool(
    vars: &HashMap<String, String>,
    name: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match vars.get(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "true" | "1" | "yes") => Ok(true),
        Some(v) if matches!(v.as_str(), "false" | "0" | "no") => Ok(false),
        Some(v) => Err(ConfigError::InvalidValue(format!(
            "{name} must be a boolean, got '{v}'"
        ))),
    }
}

fn parse_number<T>(vars: &HashMap<String, String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match vars.get(name) {
        None => Ok(default),
        Some(value_str) => value_str.parse().map_err(|e| {
            ConfigError::InvalidValue(format!(
                "{name} must be a valid non-negative integer, got '{value_str}': {e}"
            ))
        }),
    }
}

fn parse_rate_limit(
    vars: &HashMap<String, String>,
    name: &str,
    default: u32,
) -> Result<u32, ConfigError> {
    let value: u32 = parse_number(vars, name, default)
        .map_err(|e| ConfigError::InvalidRateLimit(e.to_string()))?;

    if value == 0 {
        return Err(ConfigError::InvalidRateLimit(format!(
            "{name} must be greater than 0"
        )));
    }

    Ok(value)
}
