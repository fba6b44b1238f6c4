use std::path::{Path, PathBuf};

use docqa_core::{ConfigError, ConfigOptions};
use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming the config file.
pub const CONFIG_PATH_VAR: &str = "DOCQA_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "docqa.toml";

/// Contents of `docqa.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ListenConfig,
    pub adapter: ConfigOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// `0` picks a free port.
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl ServerConfig {
    pub fn from_toml(src: &str) -> Result<Self, ServerConfigError> {
        toml::from_str(src).map_err(|e| ServerConfigError::Config(ConfigError::from(e)))
    }

    /// Read the file named by `DOCQA_CONFIG`, or `docqa.toml`. A missing
    /// file yields the defaults.
    pub fn load() -> Result<Self, ServerConfigError> {
        let path = std::env::var_os(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ServerConfigError> {
        match std::fs::read_to_string(path) {
            Ok(src) => Self::from_toml(&src),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ServerConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerConfigError {
    #[error("failed to read {path}: {source}", path = path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}
