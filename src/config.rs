use crate::cli::Args;
use crate::duration::parse_duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_EXECUTABLE: &str = "k6";

/// Settings handed to the dispatcher and executor for one invocation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AdapterConfig {
    /// Overrides where k6 lives. `None` means `k6` resolved through PATH.
    #[serde(default)]
    pub executable_path: Option<PathBuf>,
    #[serde(default = "default_duration")]
    pub default_duration: String,
    #[serde(default = "default_vus")]
    pub default_vus: u32,
    /// Upper bound on a real run, e.g. `10m`.
    #[serde(default)]
    pub timeout: Option<String>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub legacy_error_channel: bool,
}

fn default_duration() -> String { "30s".to_string() }
fn default_vus() -> u32 { 10 }

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            executable_path: None,
            default_duration: default_duration(),
            default_vus: default_vus(),
            timeout: None,
            seed: None,
            legacy_error_channel: false,
        }
    }
}

impl AdapterConfig {
    /// Builds the effective configuration: built-in defaults, then the config
    /// file if one is given, then command-line flags and environment variables.
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => load_config(path)?,
            None => AdapterConfig::default(),
        };

        if let Some(bin) = &args.k6_bin {
            config.executable_path = Some(bin.clone());
        }
        if let Some(duration) = &args.default_duration {
            config.default_duration = duration.clone();
        }
        if let Some(vus) = args.default_vus {
            config.default_vus = vus;
        }
        if let Some(timeout) = &args.timeout {
            config.timeout = Some(timeout.clone());
        }
        if args.seed.is_some() {
            config.seed = args.seed;
        }
        if args.legacy_error_channel {
            config.legacy_error_channel = true;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        parse_duration(&self.default_duration)
            .with_context(|| format!("default_duration '{}'", self.default_duration))?;
        if self.default_vus == 0 {
            anyhow::bail!("default_vus must be at least 1");
        }
        self.timeout()?;
        if let Some(path) = &self.executable_path {
            if path.as_os_str().is_empty() {
                anyhow::bail!("executable_path must not be empty");
            }
        }
        Ok(())
    }

    /// The executable to invoke: the configured override or the bare default name.
    pub fn executable(&self) -> PathBuf {
        self.executable_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EXECUTABLE))
    }

    pub fn timeout(&self) -> Result<Option<Duration>> {
        match &self.timeout {
            Some(t) => {
                let d = parse_duration(t).with_context(|| format!("timeout '{}'", t))?;
                Ok(Some(d))
            }
            None => Ok(None),
        }
    }
}

fn load_config(path: &Path) -> Result<AdapterConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;

    if path.extension().and_then(|s| s.to_str()) == Some("json") {
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    } else {
        serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}
