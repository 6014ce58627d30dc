//! Configuration management for the timetable service
//!
//! Configuration comes either from a TOML file or from environment
//! variables. Missing sections and fields fall back to defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Entity store configuration
    pub database: DatabaseConfig,

    /// Allocation notice delivery
    pub notifications: NotificationConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind, e.g. `0.0.0.0:8080`
    pub bind_address: String,

    /// Allow cross-origin requests
    pub enable_cors: bool,

    /// Trace every request
    pub enable_request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            enable_cors: true,
            enable_request_logging: true,
        }
    }
}

/// Which [`ScheduleStore`](crate::storage::ScheduleStore) backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Postgres,
    Memory,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(format!(
                "unknown database backend '{other}' (expected sqlite, postgres or memory)"
            )),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Backend to use
    pub backend: StoreBackend,

    /// SQLite database path
    pub sqlite_path: PathBuf,

    /// PostgreSQL connection string
    pub postgres_url: Option<String>,

    /// Maximum pool size
    pub pool_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            sqlite_path: PathBuf::from("data/class-organize.db"),
            postgres_url: None,
            pool_size: 10,
        }
    }
}

/// Where allocation notices go
///
/// Each channel is enabled by its credential: a webhook URL, a Resend key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub webhook_url: Option<String>,
    pub webhook_token: Option<String>,
    pub resend_api_key: Option<String>,
    pub resend_base_url: String,
    pub email_from: String,
    pub email_to: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_token: None,
            resend_api_key: None,
            resend_base_url: crate::notifications::channels::email::DEFAULT_RESEND_BASE_URL
                .to_string(),
            email_from: "Class Organize <noreply@example.com>".to_string(),
            email_to: "classorganizeapi@gmail.com".to_string(),
            timeout_secs: 10,
            max_retries: 3,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    match env_opt(key).map(|v| v.to_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

/// `DATABASE_URL`, or a URL assembled from `DB_HOST`/`DB_PORT`/`DB_USER`/`DB_PASSWORD`/`DB_NAME`
fn postgres_url_from_env() -> Option<String> {
    if let Some(url) = env_opt("DATABASE_URL") {
        return Some(url);
    }

    let host = env_opt("DB_HOST")?;
    let port = env_opt("DB_PORT").unwrap_or_else(|| "5432".to_string());
    let user = env_opt("DB_USER").unwrap_or_else(|| "postgres".to_string());
    let name = env_opt("DB_NAME").unwrap_or_else(|| "class_organize".to_string());

    let credentials = match env_opt("DB_PASSWORD") {
        Some(password) => format!("{user}:{password}"),
        None => user,
    };
    Some(format!("postgres://{credentials}@{host}:{port}/{name}"))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let backend = match env_opt("CLASS_ORGANIZE_DB_BACKEND") {
            Some(raw) => raw.parse::<StoreBackend>().map_err(anyhow::Error::msg)?,
            None => defaults.database.backend,
        };

        let pool_size = match env_opt("CLASS_ORGANIZE_DB_POOL_SIZE") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("CLASS_ORGANIZE_DB_POOL_SIZE is not a number: {raw}"))?,
            None => defaults.database.pool_size,
        };

        Ok(Self {
            server: ServerConfig {
                bind_address: env_opt("CLASS_ORGANIZE_BIND_ADDRESS")
                    .unwrap_or(defaults.server.bind_address),
                enable_cors: env_bool("CLASS_ORGANIZE_ENABLE_CORS", defaults.server.enable_cors),
                enable_request_logging: env_bool(
                    "CLASS_ORGANIZE_REQUEST_LOGGING",
                    defaults.server.enable_request_logging,
                ),
            },
            database: DatabaseConfig {
                backend,
                sqlite_path: env_opt("CLASS_ORGANIZE_SQLITE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.database.sqlite_path),
                postgres_url: postgres_url_from_env(),
                pool_size,
            },
            notifications: NotificationConfig {
                webhook_url: env_opt("CLASS_ORGANIZE_WEBHOOK_URL"),
                webhook_token: env_opt("CLASS_ORGANIZE_WEBHOOK_TOKEN"),
                resend_api_key: env_opt("RESEND_API_KEY"),
                resend_base_url: env_opt("RESEND_BASE_URL")
                    .unwrap_or(defaults.notifications.resend_base_url),
                email_from: env_opt("CLASS_ORGANIZE_EMAIL_FROM")
                    .unwrap_or(defaults.notifications.email_from),
                email_to: env_opt("CLASS_ORGANIZE_EMAIL_TO")
                    .unwrap_or(defaults.notifications.email_to),
                ..defaults.notifications
            },
            logging: LoggingConfig {
                level: env_opt("CLASS_ORGANIZE_LOG_LEVEL").unwrap_or(defaults.logging.level),
                format: env_opt("CLASS_ORGANIZE_LOG_FORMAT").unwrap_or(defaults.logging.format),
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// File when given, environment otherwise; validated either way
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.server
            .bind_address
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid bind_address: {}", self.server.bind_address))?;

        if self.database.pool_size == 0 {
            anyhow::bail!("pool_size must be greater than 0");
        }

        if self.database.backend == StoreBackend::Postgres && self.database.postgres_url.is_none()
        {
            anyhow::bail!("postgres backend requires postgres_url (or DATABASE_URL / DB_HOST)");
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!(
                "Unknown log format '{}' (expected text or json)",
                self.logging.format
            );
        }

        if self.notifications.timeout_secs == 0 {
            anyhow::bail!("notifications.timeout_secs must be greater than 0");
        }

        Ok(())
    }

    /// Bind address as a socket address
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind_address
            .parse()
            .with_context(|| format!("Invalid bind_address: {}", self.server.bind_address))
    }
}
