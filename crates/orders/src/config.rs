//! Engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `GROCER_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `DATABASE_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `ORDER_NUMBER_PREFIX` - Prefix of order numbers (default: ORD)
//! - `NOTIFICATION_DEDUP_SECONDS` - Notification dedup window (default: 300)
//! - `UPLOAD_DIR` - Directory for uploaded images (default: uploads)
//! - `UPLOAD_URL_PREFIX` - Public url prefix of uploaded images, `/uploads/` or an origin followed by it (default: /uploads/)
//! - `UPLOAD_MAX_BYTES` - Largest accepted image upload (default: 10 MiB)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `LOG_FORMAT` - `pretty` or `json` (default: pretty)

use std::path::PathBuf;
use std::str::FromStr;

use secrecy::SecretString;
use thiserror::Error;

use grocer_core::image::{UPLOAD_PATH_MARKER, is_recoverable_url};
use grocer_core::{DEFAULT_ORDER_PREFIX, DedupWindow};

const DEFAULT_UPLOAD_MAX_BYTES: usize = 10 * 1024 * 1024;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("expected pretty or json, got {other:?}")),
        }
    }
}

/// Image upload settings.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Directory uploaded files are written to
    pub dir: PathBuf,
    /// Public url prefix under which `dir` is served
    pub url_prefix: String,
    /// Largest accepted upload in bytes
    pub max_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("uploads"),
            url_prefix: "/uploads/".to_owned(),
            max_bytes: DEFAULT_UPLOAD_MAX_BYTES,
        }
    }
}

/// Order engine configuration.
#[derive(Debug, Clone)]
pub struct OrdersConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// Maximum pooled connections
    pub max_connections: u32,
    /// Prefix of generated order numbers
    pub order_number_prefix: String,
    /// Notification deduplication window
    pub notification_dedup: DedupWindow,
    /// Image upload settings
    pub upload: UploadConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. production, staging)
    pub sentry_environment: Option<String>,
    /// Log output format
    pub log_format: LogFormat,
}

impl OrdersConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("GROCER_DATABASE_URL")?;
        let max_connections = parse_env("DATABASE_MAX_CONNECTIONS", "10")?;
        let order_number_prefix = validate_prefix(
            "ORDER_NUMBER_PREFIX",
            &get_env_or_default("ORDER_NUMBER_PREFIX", DEFAULT_ORDER_PREFIX),
        )?;
        let dedup_seconds: i64 = parse_env("NOTIFICATION_DEDUP_SECONDS", "300")?;
        let upload = UploadConfig {
            dir: PathBuf::from(get_env_or_default("UPLOAD_DIR", "uploads")),
            url_prefix: validate_url_prefix(
                "UPLOAD_URL_PREFIX",
                &get_env_or_default("UPLOAD_URL_PREFIX", "/uploads/"),
            )?,
            max_bytes: parse_env("UPLOAD_MAX_BYTES", &DEFAULT_UPLOAD_MAX_BYTES.to_string())?,
        };
        let log_format = parse_env("LOG_FORMAT", "pretty")?;

        Ok(Self {
            database_url,
            max_connections,
            order_number_prefix,
            notification_dedup: DedupWindow::from_seconds(dedup_seconds),
            upload,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            log_format,
        })
    }

    /// Configuration for a given database with every other setting at its
    /// default. Used by tests and tools that bring their own pool.
    #[must_use]
    pub fn with_database_url(database_url: SecretString) -> Self {
        Self {
            database_url,
            max_connections: 10,
            order_number_prefix: DEFAULT_ORDER_PREFIX.to_owned(),
            notification_dedup: DedupWindow::default(),
            upload: UploadConfig::default(),
            sentry_dsn: None,
            sentry_environment: None,
            log_format: LogFormat::default(),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable, treating blank as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, or its default.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(key, &get_env_or_default(key, default))
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Order number prefixes are non-empty and made of letters, digits and dashes.
fn validate_prefix(key: &str, prefix: &str) -> Result<String, ConfigError> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must not be empty".to_string(),
        ));
    }
    if !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "may only contain letters, digits and dashes".to_string(),
        ));
    }
    Ok(prefix.to_owned())
}

/// Ensure the prefix ends with exactly one slash.
fn normalize_url_prefix(prefix: &str) -> String {
    format!("{}/", prefix.trim().trim_end_matches('/'))
}

/// Upload urls must stay recoverable from damaged image strings, which only
/// recognize `[scheme://host[:port]]/uploads/` urls.
fn validate_url_prefix(key: &str, prefix: &str) -> Result<String, ConfigError> {
    let prefix = normalize_url_prefix(prefix);
    if !is_recoverable_url(&format!("{prefix}image.jpg")) {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("must be {UPLOAD_PATH_MARKER} or an origin followed by it"),
        ));
    }
    Ok(prefix)
}
