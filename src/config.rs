//! Configuration file for tarcel.
//!
//! The configuration is a TOML file holding the default compression level
//! and, optionally, the remote object store tarballs are exchanged with.
//! Nothing here is global: the loaded [`Config`] is handed to
//! [`crate::Tarcel::from_config`].

use crate::compress::CompressionLevel;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Package name.
pub(crate) const PKG_NAME: &str = env!("CARGO_PKG_NAME");
/// Default configuration file name.
pub(crate) const CONFIG_NAME: &str = "config.toml";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// Configuration file version.
    pub version: String,
    /// Compression level used by `pack`.
    #[serde(default)]
    pub level: CompressionLevel,
    /// Remote object store, if any.
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            level: CompressionLevel::default(),
            remote: None,
        }
    }
}

/// Where the remote store lives and how to reach it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Bucket (or container) holding the tarballs.
    pub bucket: String,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    /// Base URL under which uploaded objects are publicly reachable.
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
    /// Root directory of the `local` backend; the bucket is a directory
    /// below it.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

impl RemoteConfig {
    pub fn new(bucket: impl Into<String>, backend: Backend) -> Self {
        Self {
            bucket: bucket.into(),
            backend,
            region: None,
            endpoint: None,
            credentials: None,
            public_url: None,
            allow_http: false,
            root: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    S3,
    Local,
    Memory,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Config {
    /// Reads the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let toml_str = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file '{}': {e}", path.display()))
        })?;
        Ok(toml::from_str(&toml_str)?)
    }

    /// Reads the configuration file at `path`, or returns the default
    /// configuration when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Writes the configuration to `path` in TOML format.
    ///
    /// Creates the parent directory if it does not exist.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(path)?;
        let mut writer = io::BufWriter::new(file);
        let toml_str = toml::to_string_pretty(self)?;
        writer.write_all(toml_str.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// The remote section, or a config error naming what is missing.
    pub fn remote(&self) -> Result<&RemoteConfig> {
        self.remote
            .as_ref()
            .ok_or_else(|| Error::Config("no [remote] section in configuration".to_string()))
    }
}

/// Returns the absolute path to the default configuration file.
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_NAME))
}

/// Returns the configuration directory for the application, platform-specific.
#[cfg(not(target_os = "macos"))]
fn config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| Error::Config("couldn't locate the config directory".to_string()))?;
    Ok(config_dir.join(PKG_NAME))
}

/// Returns the configuration directory for the application, platform-specific.
#[cfg(target_os = "macos")]
fn config_dir() -> Result<PathBuf> {
    let home_dir = dirs::home_dir()
        .ok_or_else(|| Error::Config("couldn't locate the home directory".to_string()))?;
    Ok(home_dir.join(".config").join(PKG_NAME))
}
