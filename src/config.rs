//! Application configuration loaded from environment variables.
//!
//! Values are read once at startup; every knob of the reconciliation engine
//! has a default matching production behaviour.

use chrono::{Duration, FixedOffset};
use std::env;

/// Which store backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// In-process store (local development, tests).
    Memory,
    /// Google Cloud Firestore.
    Firestore,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Service ---
    /// Frontend URL for CORS
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Store backend
    pub store: StoreKind,

    // --- Engine ---
    pub engine: EngineConfig,
}

/// Reconciliation tunables.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Offset of the users' local calendar day from UTC, in minutes
    pub utc_offset_minutes: i32,
    /// How long a watch reading keeps phone/manual movement suppressed
    pub suppression_window_secs: i64,
    /// Phone reports once every this many counted steps
    pub phone_batch_size: u64,
    /// Accelerometer delta (m/s², summed over axes) above which a step is counted
    pub step_delta_threshold: f64,
    /// Stride length used to derive phone distance
    pub stride_meters: f64,
    /// Compare-and-set attempts before giving up on a write
    pub max_write_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            suppression_window_secs: 60,
            phone_batch_size: 10,
            step_delta_threshold: 6.0,
            stride_meters: 0.76,
            max_write_attempts: 8,
        }
    }
}

impl EngineConfig {
    pub fn suppression_window(&self) -> Duration {
        Duration::seconds(self.suppression_window_secs)
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or(ConfigError::Invalid("UTC_OFFSET_MINUTES"))
    }
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            store: StoreKind::Memory,
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let defaults = EngineConfig::default();

        let store = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "memory" => StoreKind::Memory,
            "firestore" => StoreKind::Firestore,
            _ => return Err(ConfigError::Invalid("STORE_BACKEND")),
        };

        let engine = EngineConfig {
            utc_offset_minutes: parse_or("UTC_OFFSET_MINUTES", defaults.utc_offset_minutes)?,
            suppression_window_secs: parse_or(
                "SUPPRESSION_WINDOW_SECS",
                defaults.suppression_window_secs,
            )?,
            phone_batch_size: parse_or("PHONE_BATCH_SIZE", defaults.phone_batch_size)?,
            step_delta_threshold: parse_or("STEP_DELTA_THRESHOLD", defaults.step_delta_threshold)?,
            stride_meters: parse_or("STRIDE_METERS", defaults.stride_meters)?,
            max_write_attempts: parse_or("MAX_WRITE_ATTEMPTS", defaults.max_write_attempts)?,
        };

        // Reject offsets chrono cannot represent up front.
        engine.utc_offset()?;
        if engine.phone_batch_size == 0 {
            return Err(ConfigError::Invalid("PHONE_BATCH_SIZE"));
        }
        if engine.max_write_attempts == 0 {
            return Err(ConfigError::Invalid("MAX_WRITE_ATTEMPTS"));
        }

        let gcp_project_id = match (store, env::var("GCP_PROJECT_ID")) {
            (_, Ok(project)) => project,
            (StoreKind::Memory, Err(_)) => "local-dev".to_string(),
            (StoreKind::Firestore, Err(_)) => return Err(ConfigError::Missing("GCP_PROJECT_ID")),
        };

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            store,
            engine,
        })
    }
}

/// Read `name`, falling back to `default` when unset.
fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
