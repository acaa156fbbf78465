// Configuration module

mod signing;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{DEFAULT_LOG_LEVEL, DEFAULT_PRESET_NAME};
use crate::options::PresetTable;

pub use signing::{SecretKey, SigningConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Prefix for relative source URLs (empty: relative URLs are base64)
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub signing: SigningConfig,
    #[serde(default)]
    pub presets: PresetConfig,
    #[serde(default)]
    pub negotiation: NegotiationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(skip)]
    pub generation: u64, // Config version, bumped by whoever reloads it
}

/// Preset definitions and how requests may use them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresetConfig {
    /// Only `preset` instructions are honored; everything else is ignored
    #[serde(default)]
    pub only_presets: bool,
    /// Unknown preset names are skipped instead of failing the request
    #[serde(default)]
    pub ignore_unknown: bool,
    #[serde(default)]
    pub definitions: PresetTable,
}

impl PresetConfig {
    /// Whether a `default` preset is defined
    pub fn has_default(&self) -> bool {
        self.definitions.contains(DEFAULT_PRESET_NAME)
    }
}

/// Header-driven content negotiation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NegotiationConfig {
    /// Prefer WebP when `Accept` lists `image/webp`
    #[serde(default)]
    pub enable_webp_detection: bool,
    /// Always prefer WebP, regardless of `Accept`
    #[serde(default)]
    pub enforce_webp: bool,
    /// Honor `Width`, `Viewport-Width` and `DPR` request headers
    #[serde(default)]
    pub enable_client_hints: bool,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level filter; `RUST_LOG` takes precedence when set
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

impl Config {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, String> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").map_err(|e| e.to_string())?;

        let mut missing = Vec::new();
        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| {
                missing.push(var_name.to_string());
                String::new()
            })
        });

        if let Some(var_name) = missing.first() {
            return Err(format!(
                "Environment variable '{}' is referenced but not set",
                var_name
            ));
        }

        let mut config: Config = serde_yaml::from_str(&substituted).map_err(|e| e.to_string())?;
        config.generation = 0; // Initialize generation to 0

        // Trailing slash would double up when joined with a relative path
        while config.base_url.ends_with('/') {
            config.base_url.pop();
        }

        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        Self::from_yaml_with_env(&yaml)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.signing.validate()?;

        if !self.base_url.is_empty() && !self.base_url.contains("://") {
            return Err(format!(
                "base_url '{}' must be an absolute URL with a scheme",
                self.base_url
            ));
        }

        if self.presets.only_presets && self.presets.definitions.is_empty() {
            return Err("presets.only_presets is enabled but no presets are defined".to_string());
        }

        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(format!(
                "logging.level '{}' must be one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            ));
        }

        Ok(())
    }
}
