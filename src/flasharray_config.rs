//! Pod clone configuration.
//!
//! Unique responsibility: resolve array connection settings and the optional
//! client rule override from a JSON config file, falling back to environment
//! variables.
//!
//! Config file keys (all optional in the file itself):
//!
//! ```text
//! {
//!   "flash_array_host": "array01.example.com",     // env: FA_HOST
//!   "flash_array_api_token": "xxxxxxxx-...",       // env: API_TOKEN
//!   "flash_array_api_version": "2.21",             // env: FA_API_VERSION
//!   "flash_array_verify_tls": false,               // env: FA_VERIFY_TLS
//!   "rules": [ { "client": "10.0.0.0/24", "permission": "rw" } ]
//! }
//! ```
//!
//! File values win over the environment. Host and token must come from one
//! of the two.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::flasharray_client::{DEFAULT_API_VERSION, FlashArrayClientConfig};

/// Env var holding the array address.
pub const ENV_HOST: &str = "FA_HOST";
/// Env var holding the API token.
pub const ENV_API_TOKEN: &str = "API_TOKEN";
/// Env var holding the REST API version.
pub const ENV_API_VERSION: &str = "FA_API_VERSION";
/// Env var toggling TLS certificate verification.
pub const ENV_VERIFY_TLS: &str = "FA_VERIFY_TLS";

/// Raw contents of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    /// Array address.
    #[serde(default)]
    pub flash_array_host: Option<String>,
    /// API token.
    #[serde(default)]
    pub flash_array_api_token: Option<String>,
    /// REST API version.
    #[serde(default)]
    pub flash_array_api_version: Option<String>,
    /// Verify the array TLS certificate.
    #[serde(default)]
    pub flash_array_verify_tls: Option<bool>,
    /// Client rule set applied to every cloned policy.
    #[serde(default)]
    pub rules: Option<serde_json::Value>,
}

impl ConfigFile {
    /// Read and parse a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Resolved configuration for one clone run.
#[derive(Clone, Debug)]
pub struct PodCloneConfig {
    /// Array address.
    pub host: String,
    /// API token.
    pub api_token: String,
    /// REST API version.
    pub api_version: String,
    /// Verify the array TLS certificate.
    pub verify_tls: bool,
    /// Client rule override; `None` copies the source rules as-is.
    pub rules: Option<serde_json::Value>,
}

impl PodCloneConfig {
    /// Load the config file at `path` and fill gaps from the environment.
    ///
    /// In local dev, this will also attempt to load `.env` from the current directory.
    /// If `.env` is missing, it does not fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or invalid, or if host or
    /// token are defined nowhere.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let file = ConfigFile::read(path)?;
        Self::from_sources(file, |key| env::var(key).ok())
    }

    /// Merge a parsed config file with an environment lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if host or token are missing from both sources, or if
    /// `FA_VERIFY_TLS` is not a boolean.
    pub fn from_sources<F>(file: ConfigFile, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        let host = non_empty(file.flash_array_host).or_else(|| non_empty(lookup(ENV_HOST)));
        let api_token =
            non_empty(file.flash_array_api_token).or_else(|| non_empty(lookup(ENV_API_TOKEN)));

        let (Some(host), Some(api_token)) = (host, api_token) else {
            return Err(ConfigError::MissingCredentials);
        };

        let api_version = non_empty(file.flash_array_api_version)
            .or_else(|| non_empty(lookup(ENV_API_VERSION)))
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

        let verify_tls = match file.flash_array_verify_tls {
            Some(v) => v,
            None => parse_bool(ENV_VERIFY_TLS, lookup(ENV_VERIFY_TLS))?,
        };

        Ok(Self {
            host,
            api_token,
            api_version,
            verify_tls,
            rules: file.rules.filter(|r| !r.is_null()),
        })
    }

    /// Connection settings for the array client.
    #[must_use]
    pub fn client_config(&self) -> FlashArrayClientConfig {
        let mut cfg = FlashArrayClientConfig::new(self.host.clone(), self.api_token.clone());
        cfg.api_version.clone_from(&self.api_version);
        cfg.verify_tls = self.verify_tls;
        cfg
    }
}

fn parse_bool(key: &'static str, value: Option<String>) -> Result<bool, ConfigError> {
    let Some(v) = value else {
        return Ok(false);
    };
    match v.trim().to_lowercase().as_str() {
        "" | "false" | "0" | "no" => Ok(false),
        "true" | "1" | "yes" => Ok(true),
        _ => Err(ConfigError::InvalidEnv {
            key,
            value: v,
            reason: "expected a boolean",
        }),
    }
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid JSON.
    #[error("invalid JSON format in {}: {source}", path.display())]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// Neither the file nor the environment names the array.
    #[error(
        "flash_array_host and flash_array_api_token need to be defined in the config file or environment variables"
    )]
    MissingCredentials,
    /// Invalid environment variable value.
    #[error("invalid env var {key}={value:?}: {reason}")]
    InvalidEnv {
        /// The environment variable key.
        key: &'static str,
        /// The environment variable value.
        value: String,
        /// The reason for invalidity.
        reason: &'static str,
    },
}
