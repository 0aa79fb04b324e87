//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Default number of recent emails kept for duplicate detection.
const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// Upper bound on the history size accepted from the environment.
pub const MAX_HISTORY_CAPACITY: usize = 10_000;

/// Default body-similarity threshold; a pair is a duplicate only above it.
const DEFAULT_DUPLICATE_THRESHOLD: f64 = 0.7;

/// Default delay before a ticket id is handed back.
const DEFAULT_TICKET_LATENCY_MS: u64 = 1000;

/// Default HTTP port.
const DEFAULT_PORT: u16 = 8080;

/// Classification pipeline configuration.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Maximum history entries before the oldest is evicted.
    pub history_capacity: usize,
    /// Jaccard similarity above which two bodies count as duplicates.
    pub duplicate_threshold: f64,
    /// Artificial delay before each classification returns (zero = none).
    pub model_latency: Duration,
    /// Artificial delay before a ticket is created.
    pub ticket_latency: Duration,
    /// Directory holding the `sentiment/` and `ner/` ONNX models.
    /// `None` selects the lexicon engine.
    pub model_dir: Option<PathBuf>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            duplicate_threshold: DEFAULT_DUPLICATE_THRESHOLD,
            model_latency: Duration::ZERO,
            ticket_latency: Duration::from_millis(DEFAULT_TICKET_LATENCY_MS),
            model_dir: None,
        }
    }
}

impl ClassifierConfig {
    /// Build from `EMAIL_TRIAGE_*` environment variables.
    ///
    /// Unset variables fall back to defaults; set-but-invalid ones are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let history_capacity = parse_or(
            &lookup,
            "EMAIL_TRIAGE_HISTORY_CAPACITY",
            defaults.history_capacity,
        )?;
        if !(1..=MAX_HISTORY_CAPACITY).contains(&history_capacity) {
            return Err(ConfigError::InvalidValue {
                key: "EMAIL_TRIAGE_HISTORY_CAPACITY".into(),
                message: format!("{history_capacity} is outside 1..={MAX_HISTORY_CAPACITY}"),
            });
        }

        let duplicate_threshold = parse_or(
            &lookup,
            "EMAIL_TRIAGE_DUPLICATE_THRESHOLD",
            defaults.duplicate_threshold,
        )?;
        if !(0.0..=1.0).contains(&duplicate_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "EMAIL_TRIAGE_DUPLICATE_THRESHOLD".into(),
                message: format!("{duplicate_threshold} is outside 0.0..=1.0"),
            });
        }

        let model_latency_ms: u64 = parse_or(&lookup, "EMAIL_TRIAGE_MODEL_LATENCY_MS", 0)?;
        let ticket_latency_ms: u64 = parse_or(
            &lookup,
            "EMAIL_TRIAGE_TICKET_LATENCY_MS",
            DEFAULT_TICKET_LATENCY_MS,
        )?;

        let model_dir = lookup("EMAIL_TRIAGE_MODEL_DIR")
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            history_capacity,
            duplicate_threshold,
            model_latency: Duration::from_millis(model_latency_ms),
            ticket_latency: Duration::from_millis(ticket_latency_ms),
            model_dir,
        })
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let lookup = |key: &str| std::env::var(key).ok();
        Ok(Self {
            port: parse_or(&lookup, "EMAIL_TRIAGE_PORT", DEFAULT_PORT)?,
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
