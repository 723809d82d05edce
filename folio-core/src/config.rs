//! Configuration loading for the circulation engine.
//!
//! Values are composed from three layers, strongest first: environment
//! variables, an optional TOML file, and built-in defaults. The file is
//! looked up at `folio.toml` or `config/folio.toml` unless an explicit
//! path is supplied.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use once_cell::sync::Lazy;
use serde::Deserialize;
use thiserror::Error;

use crate::policy::LendingPolicy;

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("folio.toml"),
        PathBuf::from("config/folio.toml"),
    ]
});

const DEFAULT_RECONCILER_INTERVAL_SECS: u64 = 6 * 60 * 60;

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub database: FileDatabaseConfig,
    #[serde(default)]
    pub policy: LendingPolicy,
    #[serde(default)]
    pub reconciler: FileReconcilerConfig,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileDatabaseConfig {
    pub url: Option<String>,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileReconcilerConfig {
    pub interval_secs: Option<u64>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub database_url: Option<String>,
    pub database_max_connections: Option<u32>,
    pub database_min_connections: Option<u32>,
    pub reconciler_interval_secs: Option<u64>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        let mut env_config = Self::default();

        env_config.config_path =
            std::env::var("FOLIO_CONFIG").ok().map(PathBuf::from);
        env_config.database_url = std::env::var("DATABASE_URL").ok();
        env_config.database_max_connections =
            std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok());
        env_config.database_min_connections =
            std::env::var("DB_MIN_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok());
        env_config.reconciler_interval_secs =
            std::env::var("FOLIO_RECONCILER_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok());

        env_config
    }
}

/// Fully composed runtime configuration.
#[derive(Debug, Clone)]
pub struct CirculationConfig {
    /// Connection string for the Postgres backend. `None` means the
    /// caller intends to run on the in-memory backend.
    pub database_url: Option<String>,
    pub database_max_connections: Option<u32>,
    pub database_min_connections: Option<u32>,
    pub policy: LendingPolicy,
    /// Cadence of the overdue sweep and waitlist refresh.
    pub reconciler_interval: Duration,
}

impl Default for CirculationConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: None,
            database_min_connections: None,
            policy: LendingPolicy::default(),
            reconciler_interval: Duration::from_secs(
                DEFAULT_RECONCILER_INTERVAL_SECS,
            ),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn load(&self) -> Result<CirculationConfig, ConfigLoadError> {
        let env_config = EnvConfig::gather();
        let file_config = self.load_file_config(&env_config)?;
        Ok(Self::compose(file_config, env_config))
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<Option<FileConfig>, ConfigLoadError> {
        // An explicitly named file must exist; fallback locations are
        // allowed to be absent.
        if let Some(explicit) = self
            .options
            .config_path
            .as_ref()
            .or(env_config.config_path.as_ref())
        {
            if !explicit.exists() {
                return Err(ConfigLoadError::MissingConfig {
                    path: explicit.clone(),
                });
            }
            return Self::parse_file(explicit).map(Some);
        }

        match DEFAULT_CONFIG_LOCATIONS
            .iter()
            .find(|candidate| candidate.exists())
        {
            Some(path) => Self::parse_file(path).map(Some),
            None => Ok(None),
        }
    }

    fn parse_file(path: &Path) -> Result<FileConfig, ConfigLoadError> {
        let contents =
            fs::read_to_string(path).map_err(|err| ConfigLoadError::Io {
                path: path.to_path_buf(),
                source: err,
            })?;
        toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
            path: path.to_path_buf(),
            source: err,
        })
    }

    fn compose(
        file: Option<FileConfig>,
        env: EnvConfig,
    ) -> CirculationConfig {
        let file = file.unwrap_or_default();

        let reconciler_interval_secs = env
            .reconciler_interval_secs
            .or(file.reconciler.interval_secs)
            .unwrap_or(DEFAULT_RECONCILER_INTERVAL_SECS);

        CirculationConfig {
            database_url: env.database_url.or(file.database.url),
            database_max_connections: env
                .database_max_connections
                .or(file.database.max_connections),
            database_min_connections: env
                .database_min_connections
                .or(file.database.min_connections),
            policy: file.policy,
            reconciler_interval: Duration::from_secs(reconciler_interval_secs),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
