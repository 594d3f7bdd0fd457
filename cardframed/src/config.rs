//! Runtime configuration loading
//!
//! Wraps the static configuration with where it came from. The file is read
//! once at startup; a missing file is created with defaults.

use cardframe_core::{CardFrameError, Result, StaticConfig};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Static configuration plus its source path
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    static_config: StaticConfig,
    path: PathBuf,
}

impl RuntimeConfig {
    /// Load and validate the configuration at `config_path`
    ///
    /// If the file doesn't exist, it is written with defaults (parent
    /// directories included) and the defaults are returned.
    pub async fn load(config_path: &Path) -> Result<Self> {
        info!("Loading configuration from: {}", config_path.display());

        let static_config = if config_path.exists() {
            let content = fs::read_to_string(config_path).await.map_err(|e| {
                CardFrameError::Config(format!("Failed to read config file: {}", e))
            })?;
            StaticConfig::parse(&content)?
        } else {
            Self::write_defaults(config_path).await?
        };

        info!(
            "Configuration loaded: {} chassis, {} card(s)",
            static_config.chassis.len(),
            static_config
                .chassis
                .iter()
                .map(|c| c.cards.len())
                .sum::<usize>()
        );

        Ok(Self {
            static_config,
            path: config_path.to_path_buf(),
        })
    }

    async fn write_defaults(path: &Path) -> Result<StaticConfig> {
        info!(
            "Config not found at {}. Creating with defaults.",
            path.display()
        );

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                CardFrameError::Config(format!(
                    "Failed to create config directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let config = StaticConfig::default();
        let toml_str = config
            .to_toml()
            .map_err(|e| CardFrameError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, &toml_str)
            .await
            .map_err(|e| CardFrameError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(config)
    }

    pub fn static_config(&self) -> &StaticConfig {
        &self.static_config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
