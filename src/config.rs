//! Configuration file support.
//!
//! `nest` reads an optional TOML file:
//!
//! ```toml
//! build_dir = "/var/tmp/nest"
//! cache_dir = "/var/cache/nest"
//! prefix = "/opt/local"
//! jobs = 8
//!
//! [fetch]
//! timeout_secs = 120
//! retries = 3
//! ```
//!
//! Every key is optional. Unknown keys are an error so typos don't pass
//! silently. Command-line flags are merged on top with [`Config::merge`].

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::executor::Context;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config {path}: `jobs` must be at least 1")]
    ZeroJobs { path: PathBuf },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub build_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub prefix: Option<PathBuf>,
    pub jobs: Option<usize>,
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// The `[fetch]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchConfig {
    pub timeout_secs: Option<u64>,
    pub retries: Option<u32>,
}

impl Config {
    /// Parse config text. `path` is only used in error messages.
    pub fn parse(input: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(input).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if config.jobs == Some(0) {
            return Err(ConfigError::ZeroJobs {
                path: path.to_path_buf(),
            });
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&input, path)
    }

    /// `$XDG_CONFIG_HOME/nest/config.toml`, falling back to the platform
    /// config directory.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("XDG_CONFIG_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(dirs::config_dir)
            .map(|dir| dir.join("nest/config.toml"))
    }

    /// Load the default config file, or an empty config if there is none.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Overlay `other` on top of `self`; keys set in `other` win.
    pub fn merge(&mut self, other: Config) {
        if other.build_dir.is_some() {
            self.build_dir = other.build_dir;
        }
        if other.cache_dir.is_some() {
            self.cache_dir = other.cache_dir;
        }
        if other.prefix.is_some() {
            self.prefix = other.prefix;
        }
        if other.jobs.is_some() {
            self.jobs = other.jobs;
        }
        if other.fetch.timeout_secs.is_some() {
            self.fetch.timeout_secs = other.fetch.timeout_secs;
        }
        if other.fetch.retries.is_some() {
            self.fetch.retries = other.fetch.retries;
        }
    }

    /// Apply the keys that are set to `ctx`, leaving the rest untouched.
    pub fn apply(&self, mut ctx: Context) -> Context {
        if let Some(dir) = &self.build_dir {
            ctx.build_dir = dir.clone();
        }
        if let Some(dir) = &self.cache_dir {
            ctx.cache_dir = dir.clone();
        }
        if let Some(prefix) = &self.prefix {
            ctx.prefix = prefix.clone();
        }
        if self.jobs.is_some() {
            ctx.jobs = self.jobs;
        }
        if let Some(secs) = self.fetch.timeout_secs {
            ctx.http_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = self.fetch.retries {
            ctx.fetch_retries = retries;
        }
        ctx
    }

    pub fn into_context(self) -> Context {
        self.apply(Context::default())
    }
}
