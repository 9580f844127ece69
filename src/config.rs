use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::events::DEFAULT_API_HOST;
use crate::providers::{buildkite, circleci};
use crate::watch::DEFAULT_CONFIRMATIONS;

/// Configuration file structure for buildevents.
///
/// Holds defaults that sit below command-line flags and environment
/// variables. Loaded from the current directory or an explicit path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Telemetry destination
    #[serde(default)]
    pub honeycomb: HoneycombConfig,

    /// Watch loop tuning
    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub circleci: CircleCiConfig,

    #[serde(default)]
    pub buildkite: BuildkiteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HoneycombConfig {
    /// Honeycomb API key; events go to stdout when unset
    pub api_key: Option<String>,

    #[serde(default = "default_api_host")]
    pub api_host: String,

    /// Deprecated in favour of `service-name` for environment keys
    pub dataset: Option<String>,

    pub service_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WatchConfig {
    /// Give up waiting after this many minutes
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,

    /// Quiet polls required before trusting a finished verdict
    #[serde(default = "default_confirmations")]
    pub confirmations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CircleCiConfig {
    #[serde(default = "default_circleci_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildkiteConfig {
    #[serde(default = "default_buildkite_base_url")]
    pub base_url: String,
}

impl Default for HoneycombConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_host: default_api_host(),
            dataset: None,
            service_name: None,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: default_timeout_minutes(),
            confirmations: default_confirmations(),
        }
    }
}

impl Default for CircleCiConfig {
    fn default() -> Self {
        Self {
            base_url: default_circleci_base_url(),
        }
    }
}

impl Default for BuildkiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_buildkite_base_url(),
        }
    }
}

fn default_api_host() -> String {
    DEFAULT_API_HOST.to_string()
}

fn default_timeout_minutes() -> u64 {
    10
}

fn default_confirmations() -> u32 {
    DEFAULT_CONFIRMATIONS
}

fn default_circleci_base_url() -> String {
    circleci::DEFAULT_BASE_URL.to_string()
}

fn default_buildkite_base_url() -> String {
    buildkite::DEFAULT_BASE_URL.to_string()
}

const CANDIDATES: [&str; 4] = [
    "buildevents.toml",
    "buildevents.json",
    "buildevents.yaml",
    "buildevents.yml",
];

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./buildevents.toml
    /// 3. ./buildevents.json
    /// 4. ./buildevents.yaml
    /// 5. ./buildevents.yml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load_from_dir(Path::new(".")),
        }
    }

    fn load_from_dir(dir: &Path) -> Result<Self> {
        for candidate in &CANDIDATES {
            let path = dir.join(candidate);
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }
}
