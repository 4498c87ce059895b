use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::message::{ApiAuth, ProtocolVersion};
use crate::sink::{RetryPolicy, DEFAULT_TIMEOUT};

const DEFAULT_CONFIG_NAME: &str = "rc-notify.toml";
const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

/// Named defaults; every key can be overridden from the command line.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    pub uri: Option<String>,
    pub channel: Option<String>,
    pub user: Option<String>,
    pub alias: Option<String>,
    pub emoji: Option<String>,
    #[serde(default)]
    pub protocol: ProtocolVersion,
    pub timeout_secs: Option<u64>,
    pub retry_backoff_ms: Option<Vec<u64>>,
    pub auth: Option<ApiAuth>,
}

impl Profile {
    pub fn timeout(&self) -> Duration {
        self.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry_backoff_ms
            .as_deref()
            .map(RetryPolicy::from_millis)
            .unwrap_or_default()
    }
}

impl Config {
    /// Load configuration from an explicit path, or search upward from the
    /// current dir and then the user config dir. No file at all is fine.
    pub fn load(path_override: Option<PathBuf>) -> Result<Self> {
        let path = match path_override {
            Some(p) => p,
            None => match find_upwards(DEFAULT_CONFIG_NAME).or_else(user_config) {
                Some(p) => p,
                None => {
                    tracing::debug!("no config file found, using built-in defaults");
                    return Ok(Self::default());
                }
            },
        };

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Reading config file {}", path.display()))?;
        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Parsing TOML config {}", path.display()))?;
        tracing::debug!(path = %path.display(), profiles = cfg.profiles.len(), "loaded config");
        Ok(cfg)
    }

    pub fn profile(&self, name: &str) -> Result<&Profile> {
        self.profiles
            .get(name)
            .with_context(|| format!("Profile '{}' not found in config", name))
    }

    /// The named profile, or `default` (possibly empty) when none was asked for.
    pub fn select(&self, name: Option<&str>) -> Result<Profile> {
        match name {
            Some(name) => self.profile(name).cloned(),
            None => Ok(self.profiles.get(DEFAULT_PROFILE).cloned().unwrap_or_default()),
        }
    }
}

fn find_upwards(file_name: &str) -> Option<PathBuf> {
    let mut dir = std::env::current_dir().ok()?;
    loop {
        let candidate = dir.join(file_name);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            break;
        }
    }
    None
}

fn user_config() -> Option<PathBuf> {
    let candidate = dirs::config_dir()?.join("rc-notify").join("config.toml");
    candidate.exists().then_some(candidate)
}
