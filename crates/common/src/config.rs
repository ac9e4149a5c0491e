use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, ExecutionMode, Result, RetrySettings};

const DEFAULT_BASE_URL: &str = "https://api.bitget.com";
const NINETY_DAYS_MS: u64 = 90 * 24 * 60 * 60 * 1000;

/// Bitget API credentials. Read-only and shared by every worker.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
}

impl Credentials {
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
            passphrase: passphrase.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret", &"[REDACTED]")
            .field("passphrase", &"[REDACTED]")
            .finish()
    }
}

/// Which exchange backend the service talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeMode {
    Live,
    Paper,
}

impl std::fmt::Display for ExchangeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeMode::Live => write!(f, "live"),
            ExchangeMode::Paper => write!(f, "paper"),
        }
    }
}

/// Scheduling, pagination and retry limits for one extraction.
///
/// Example `config/extractor.toml`:
/// ```toml
/// max_concurrency = 10
/// deadline_ms = 60000
/// max_pages = 50
///
/// [retry]
/// max_attempts = 5
/// base_delay_ms = 250
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// Maximum shards in flight at once.
    pub max_concurrency: usize,
    /// Global per-request deadline.
    pub deadline_ms: u64,
    /// Safety bound on pages fetched for a single shard.
    pub max_pages: u32,
    /// Orders requested per page (Bitget caps this at 100).
    pub page_limit: u32,
    /// Longest window the exchange accepts in one query; longer windows are split.
    pub max_window_span_ms: u64,
    /// Per-HTTP-request timeout.
    pub request_timeout_ms: u64,
    pub retry: RetrySettings,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            deadline_ms: 60_000,
            max_pages: 50,
            page_limit: 100,
            max_window_span_ms: NINETY_DAYS_MS,
            request_timeout_ms: 10_000,
            retry: RetrySettings::default(),
        }
    }
}

impl ExtractionSettings {
    /// Load from a TOML file. Missing fields fall back to defaults.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("failed to parse settings at '{path}': {e}")))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(Error::Config("max_concurrency must be at least 1".into()));
        }
        if self.max_window_span_ms == 0 {
            return Err(Error::Config("max_window_span_ms must be positive".into()));
        }
        if self.page_limit == 0 || self.max_pages == 0 {
            return Err(Error::Config("page_limit and max_pages must be positive".into()));
        }
        Ok(())
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// All configuration loaded from environment variables at startup.
/// Built once in the binary and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub base_url: String,
    pub exchange_mode: ExchangeMode,

    pub port: u16,

    pub default_mode: ExecutionMode,
    pub remote_worker_url: Option<String>,

    pub extraction: ExtractionSettings,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Panics on any missing required variable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let exchange_mode = match optional_env("EXCHANGE_MODE")
            .unwrap_or_else(|| "live".to_string())
            .to_lowercase()
            .as_str()
        {
            "live" => ExchangeMode::Live,
            "paper" => ExchangeMode::Paper,
            other => panic!("ERROR: EXCHANGE_MODE must be 'live' or 'paper', got: '{other}'"),
        };

        let credentials = match exchange_mode {
            ExchangeMode::Live => Credentials::new(
                required_env("BITGET_API_KEY"),
                optional_env("BITGET_SECRET_KEY")
                    .or_else(|| optional_env("BITGET_API_SECRET"))
                    .unwrap_or_else(|| required_env("BITGET_SECRET_KEY")),
                required_env("BITGET_PASSPHRASE"),
            ),
            ExchangeMode::Paper => Credentials::new("paper", "paper", "paper"),
        };

        let default_mode = optional_env("EXECUTION_MODE")
            .map(|v| {
                v.parse::<ExecutionMode>()
                    .unwrap_or_else(|e| panic!("ERROR: EXECUTION_MODE: {e}"))
            })
            .unwrap_or_default();

        let extraction = match optional_env("EXTRACTOR_SETTINGS_PATH") {
            Some(path) => ExtractionSettings::load(&path)
                .unwrap_or_else(|e| panic!("Failed to load extractor settings: {e}")),
            None => ExtractionSettings::default(),
        };

        Config {
            credentials,
            base_url: optional_env("BITGET_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            exchange_mode,
            port: optional_env("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            default_mode,
            remote_worker_url: optional_env("REMOTE_WORKER_URL"),
            extraction,
        }
    }
}

fn required_env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        panic!("Required environment variable '{key}' is not set. Check your .env file.")
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
