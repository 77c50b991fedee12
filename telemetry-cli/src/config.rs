//! Configuration loading and parsing

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use telemetry_decoder::{ExtractConfig, ReplayConfig};

/// Application configuration (loaded from a TOML file via `--config`)
///
/// Every section is optional; command line flags override what is set here.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Directory for multi-topic extraction output
    pub output_dir: Option<PathBuf>,
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .extract
        .validate()
        .with_context(|| format!("Invalid [extract] section in {:?}", path))?;
    config
        .replay
        .synthesizer
        .validate()
        .with_context(|| format!("Invalid [replay.synthesizer] section in {:?}", path))?;

    Ok(config)
}

/// Load `path` if given, otherwise use defaults
pub fn load_or_default(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(p) => {
            log::info!("Loading configuration from: {:?}", p);
            load_config(p)
        }
        None => Ok(AppConfig::default()),
    }
}
