use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_TITLE: &str = "File Server Started!";

/// Settings fixed at startup and handed to every component that needs them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Port to listen on (all interfaces)
    pub port: u16,
    /// Directory to serve files from
    pub root_dir: PathBuf,
    /// Headline printed in the connection banner
    pub title: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            root_dir: PathBuf::from("."),
            title: DEFAULT_TITLE.to_string(),
        }
    }
}

/// Optional TOML config file. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub port: Option<u16>,
    pub root: Option<PathBuf>,
    pub title: Option<String>,
}

impl FileConfig {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub port: Option<u16>,
    pub root: Option<PathBuf>,
    pub title: Option<String>,
}

impl ServerConfig {
    /// Layer defaults, then the config file, then the overrides.
    pub fn layered(file: FileConfig, overrides: Overrides) -> Self {
        let defaults = Self::default();
        Self {
            port: overrides.port.or(file.port).unwrap_or(defaults.port),
            root_dir: overrides.root.or(file.root).unwrap_or(defaults.root_dir),
            title: overrides.title.or(file.title).unwrap_or(defaults.title),
        }
    }

    /// Resolve the root directory to an absolute path and check it is a directory.
    pub fn canonicalize_root(mut self) -> Result<Self, ConfigError> {
        let root_dir = self
            .root_dir
            .canonicalize()
            .map_err(|_| ConfigError::RootMissing(self.root_dir.clone()))?;

        if !root_dir.is_dir() {
            return Err(ConfigError::RootNotADirectory(root_dir));
        }

        self.root_dir = root_dir;
        Ok(self)
    }
}
