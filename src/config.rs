// src/config.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::sources::{Source, SourceRegistry};

/// Env var naming the config file.
pub const CONFIG_PATH_ENV: &str = "COVID_INGEST_CONFIG";
/// Env var that overrides the MySQL password.
pub const PASSWORD_ENV: &str = "COVID_INGEST_DB_PASSWORD";
pub const DEFAULT_CONFIG_PATH: &str = "covid_ingest.yaml";
pub const DEFAULT_TABLE: &str = "time_series_data";

/// Everything a run needs, read once at startup.
///
/// ```yaml
/// table: time_series_data
/// sources:
///   - label: confirmed
///     locator: https://example.org/confirmed.csv
/// sink:
///   kind: mysql
///   host: localhost
///   database: covid_19
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_sources")]
    pub sources: Vec<Source>,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default)]
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    Mysql(MySqlOptions),
    Duckdb(FileOptions),
    Parquet(FileOptions),
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Mysql(MySqlOptions::default())
    }
}

/// Target of a file-backed sink.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileOptions {
    pub path: PathBuf,
}

/// Connection target of the MySQL sink.
#[derive(Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MySqlOptions {
    pub host: String,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
    pub port: u16,
    pub charset: String,
}

impl Default for MySqlOptions {
    fn default() -> Self {
        MySqlOptions {
            host: "localhost".to_string(),
            user: "root".to_string(),
            password: None,
            database: "covid_19".to_string(),
            port: 3306,
            charset: "utf8mb4".to_string(),
        }
    }
}

impl fmt::Debug for MySqlOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlOptions")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("port", &self.port)
            .field("charset", &self.charset)
            .finish()
    }
}

fn default_sources() -> Vec<Source> {
    SourceRegistry::default().iter().cloned().collect()
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sources: default_sources(),
            table: default_table(),
            sink: SinkConfig::default(),
        }
    }
}

impl Config {
    /// Load from `$COVID_INGEST_CONFIG`, else `covid_ingest.yaml`, then
    /// apply `$COVID_INGEST_DB_PASSWORD`.
    pub fn from_env() -> Result<Config> {
        let path = env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut config = Config::load(&path)?;
        config.override_password(env::var(PASSWORD_ENV).ok());
        Ok(config)
    }

    /// Read a YAML config file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Config::parse(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        debug!(path = %path.display(), ?config, "loaded config");
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Config> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn override_password(&mut self, password: Option<String>) {
        if let (SinkConfig::Mysql(options), Some(password)) = (&mut self.sink, password) {
            options.password = Some(password);
        }
    }

    pub fn registry(&self) -> Result<SourceRegistry, PipelineError> {
        SourceRegistry::from_sources(self.sources.iter().cloned())
    }
}
