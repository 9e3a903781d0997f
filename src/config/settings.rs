//! Runtime settings from the environment (and `.env`, when present).

use crate::error::ConfigError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    /// Document collections persisted to the redb file at `DOCUMENT_PATH`.
    Document,
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "document" => Ok(StorageBackend::Document),
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            other => Err(ConfigError::Validation(format!("unknown STORAGE_BACKEND '{}'", other))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub bind_addr: String,
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub document_path: PathBuf,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    pub resource_config: PathBuf,
    /// Replaces the resource file's `base_path` when set.
    pub api_base_path: Option<String>,
}

impl Settings {
    /// Reads `.env` if present, then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let number = |key: &str, default: u64| -> Result<u64, ConfigError> {
            match get(key) {
                None => Ok(default),
                Some(v) => v
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::Validation(format!("{} must be a number, got '{}'", key, v))),
            }
        };
        let storage_backend = match get("STORAGE_BACKEND") {
            Some(v) => v.parse()?,
            None => StorageBackend::Document,
        };
        let database_url = get("DATABASE_URL").filter(|s| !s.trim().is_empty());
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Validation("DATABASE_URL is required for the postgres backend".into()));
        }
        Ok(Settings {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:3000".into()),
            storage_backend,
            database_url,
            document_path: PathBuf::from(get("DOCUMENT_PATH").unwrap_or_else(|| "data/documents.redb".into())),
            db_max_connections: number("DB_MAX_CONNECTIONS", 5)? as u32,
            db_acquire_timeout: Duration::from_secs(number("DB_ACQUIRE_TIMEOUT_SECS", 5)?),
            resource_config: PathBuf::from(get("RESOURCE_CONFIG").unwrap_or_else(|| "resources.json".into())),
            api_base_path: get("API_BASE_PATH"),
        })
    }
}
