//! YAML configuration file with server coordinates and credentials.
//!
//! ```yaml
//! server: https://octane.example.com:8080
//! sharedspace: 1001
//! workspace: 1002
//! user: ci-user
//! password: secret
//! proxy_host: proxy.example.com
//! proxy_port: 3128
//! ```
//!
//! Command-line flags override every value read from the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Looked up in the working directory when `--config-file` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "resultpush.yaml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: Option<String>,
    pub sharedspace: Option<u64>,
    pub workspace: Option<u64>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub proxy_host: Option<String>,
    pub proxy_port: Option<u16>,
    pub proxy_user: Option<String>,
    pub proxy_password: Option<String>,
}

impl FileConfig {
    /// Load `explicit`, or the default file if it exists.
    ///
    /// A missing explicit file is an error; a missing default file yields an
    /// empty configuration.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    tracing::info!(
                        path = DEFAULT_CONFIG_FILE,
                        "no configuration file, using command-line arguments only"
                    );
                    return Ok(Self::default());
                }
                default
            }
        };
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("can not read configuration file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("invalid configuration file: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }
}
