//! Loading the kernel configuration from a file.
//!
//! The format is picked from the file extension: `.json` always, `.yaml`/`.yml`
//! with the `yaml-config` feature and `.toml` with the `toml-config` feature.
use std::fs;
use std::path::{Path, PathBuf};

use modhost_core::KernelConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported config file extension for '{}' (expected {})", path.display(), ConfigFormat::supported())]
    UnsupportedFormat { path: PathBuf },

    #[error("Invalid {format} config: {message}")]
    Parse { format: &'static str, message: String },
}

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON format (.json)
    Json,
    /// YAML format (.yaml, .yml) - requires "yaml-config" feature
    #[cfg(feature = "yaml-config")]
    Yaml,
    /// TOML format (.toml) - requires "toml-config" feature
    #[cfg(feature = "toml-config")]
    Toml,
}

impl ConfigFormat {
    pub fn name(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => "yaml",
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => "toml",
        }
    }

    /// Determine format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                #[cfg(feature = "yaml-config")]
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                #[cfg(feature = "toml-config")]
                "toml" => Some(ConfigFormat::Toml),
                _ => None,
            })
    }

    fn supported() -> &'static str {
        match (cfg!(feature = "yaml-config"), cfg!(feature = "toml-config")) {
            (true, true) => ".json, .yaml, .yml or .toml",
            (true, false) => ".json, .yaml or .yml",
            (false, true) => ".json or .toml",
            (false, false) => ".json",
        }
    }

    /// Parse `text` into a kernel configuration
    pub fn parse(&self, text: &str) -> Result<KernelConfig, ConfigError> {
        let parse_err = |message: String| ConfigError::Parse {
            format: self.name(),
            message,
        };
        match self {
            ConfigFormat::Json => serde_json::from_str(text).map_err(|e| parse_err(e.to_string())),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::from_str(text).map_err(|e| parse_err(e.to_string())),
            #[cfg(feature = "toml-config")]
            ConfigFormat::Toml => toml::from_str(text).map_err(|e| parse_err(e.to_string())),
        }
    }
}

/// Read and parse the config file at `path`.
pub fn load(path: &Path) -> Result<KernelConfig, ConfigError> {
    let format = ConfigFormat::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = format.parse(&text)?;
    log::debug!("Loaded {} config from {}", format.name(), path.display());
    Ok(config)
}
