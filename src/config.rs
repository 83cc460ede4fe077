use serde::Deserialize;
use std::net::IpAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Server configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port to listen on
    pub port: u16,
    /// Address to bind to
    pub bind_address: IpAddr,
    /// Path to the SQLite database
    pub database_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            bind_address: IpAddr::from([0, 0, 0, 0]),
            database_path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("farmdata-server")
                .join("farmdata.db"),
        }
    }
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    fn load_with_env(
        config_path: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = config_path
            .or_else(|| env("FARMDATA_CONFIG").map(PathBuf::from))
            .unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::Read(path.clone(), e))?;
            config = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::Parse(path.clone(), e))?;
        }

        if let Some(port) = env("FARMDATA_PORT") {
            config.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidEnv("FARMDATA_PORT", port))?;
        }
        if let Some(addr) = env("FARMDATA_BIND_ADDRESS") {
            config.bind_address = addr
                .parse()
                .map_err(|_| ConfigError::InvalidEnv("FARMDATA_BIND_ADDRESS", addr))?;
        }
        if let Some(db_path) = env("FARMDATA_DATABASE_PATH") {
            config.database_path = PathBuf::from(db_path);
        }

        Ok(config)
    }

    /// Default config file path: <config dir>/farmdata-server/config.yaml
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("farmdata-server")
            .join("config.yaml")
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    Read(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    Parse(PathBuf, #[source] serde_yaml::Error),
    #[error("Invalid value for {0}: '{1}'")]
    InvalidEnv(&'static str, String),
}
