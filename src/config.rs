use crate::constants::{
    DEFAULT_DB_PATH, DEFAULT_LOG_DIR, DEFAULT_PORT, DEFAULT_TIMEOUT_SECONDS, WORKBOOK_URL,
};
use crate::error::{IngestError, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub url: String,
    pub timeout_seconds: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: WORKBOOK_URL.to_string(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory of the daily rolling JSON log.
    pub dir: PathBuf,
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_LOG_DIR),
            level: "inflation_ingest=info".to_string(),
        }
    }
}

impl Config {
    /// Load `config.toml` from the working directory, falling back to defaults
    /// when it is absent, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::from_file("config.toml")?;
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = env::var("INFLATION_SOURCE_URL") {
            self.source.url = url;
        }
        if let Ok(path) = env::var("INFLATION_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(port) = env::var("INFLATION_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| IngestError::Config(format!("INFLATION_PORT '{port}' is not a port")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [database]
            path = "/tmp/cpi.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.database.path, PathBuf::from("/tmp/cpi.db"));
        assert_eq!(config.source.url, WORKBOOK_URL);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.logging.dir, PathBuf::from(DEFAULT_LOG_DIR));
    }

    #[test]
    fn test_logging_section() {
        let config = Config::from_toml("[logging]\nlevel = \"debug\"").unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let err = Config::from_toml("[server]\nport = \"eighty\"").unwrap_err();
        assert!(matches!(err, IngestError::Toml(_)));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_file(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.source.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);
    }
}
