use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{EtlError, Result};

pub const ENV_DATABASE_PATH: &str = "RETAIL_ETL_DATABASE_PATH";
pub const ENV_CHUNK_SIZE: &str = "RETAIL_ETL_CHUNK_SIZE";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub data_dir: PathBuf,
    pub raw_file: String,
    pub cleaned_file: String,
    pub transformed_file: String,
    pub log_dir: PathBuf,
    pub loader: LoaderConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Documents per bulk insert
    pub chunk_size: usize,
    /// Batches in flight at once; 1 keeps loading sequential
    pub workers: usize,
    pub batch_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_path: PathBuf,
    pub collection: String,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            raw_file: RAW_FILE.to_string(),
            cleaned_file: CLEANED_FILE.to_string(),
            transformed_file: TRANSFORMED_FILE.to_string(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            loader: LoaderConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: DEFAULT_WORKERS,
            batch_timeout_secs: DEFAULT_BATCH_TIMEOUT_SECS,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

impl LoaderConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(EtlError::Config("loader.chunk_size must be at least 1".to_string()));
        }
        if self.workers == 0 {
            return Err(EtlError::Config("loader.workers must be at least 1".to_string()));
        }
        if self.batch_timeout_secs == 0 {
            return Err(EtlError::Config(
                "loader.batch_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl EtlConfig {
    /// Load configuration from a TOML file, then apply environment overrides.
    ///
    /// With no path, `retail_etl.toml` in the working directory is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Path::new("retail_etl.toml");
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: EtlConfig = toml::from_str(&content)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(db) = std::env::var(ENV_DATABASE_PATH) {
            if !db.trim().is_empty() {
                self.store.database_path = PathBuf::from(db.trim());
            }
        }
        if let Ok(size) = std::env::var(ENV_CHUNK_SIZE) {
            self.loader.chunk_size = size.trim().parse().map_err(|_| {
                EtlError::Config(format!("{ENV_CHUNK_SIZE} is not a positive integer: {size}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.loader.validate()?;
        if self.store.collection.trim().is_empty() {
            return Err(EtlError::Config("store.collection must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn raw_path(&self) -> PathBuf {
        self.data_dir.join(&self.raw_file)
    }

    pub fn cleaned_path(&self) -> PathBuf {
        self.data_dir.join(&self.cleaned_file)
    }

    pub fn transformed_path(&self) -> PathBuf {
        self.data_dir.join(&self.transformed_file)
    }
}
