//! Application configuration
//!
//! A single JSON file under the data directory. Secrets for the upstream
//! services live here too; an empty key simply disables the corresponding
//! collaborator at wiring time.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const CONFIG_FILE: &str = "tastemap.json";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Config schema version
    pub version: u32,

    /// Data directory path
    pub data_dir: PathBuf,

    /// Logging level
    pub log_level: String,

    /// Places provider settings
    pub places: PlacesConfig,

    /// Text-completion settings
    pub completion: CompletionConfig,

    /// Cache lifetimes
    pub cache: CacheConfig,

    /// Recommendation-bot tunables
    pub bot: BotConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacesConfig {
    pub api_key: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub api_key: String,
    pub model: String,
    /// Request timeout in seconds; generation is slow
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Verified-token cache lifetime in seconds
    pub token_ttl_secs: u64,
    /// Geo-search dedup cache lifetime in seconds
    pub geo_dedup_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: 3600,
            geo_dedup_ttl_secs: 86400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub max_attempts: u32,
    pub search_radius_m: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            search_radius_m: 1000,
        }
    }
}

impl AppConfig {
    const CURRENT_VERSION: u32 = 1;

    /// Load configuration from a data directory, creating the default file
    /// if none exists
    pub fn load_or_create(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(CONFIG_FILE);

        if config_path.exists() {
            info!("Loading config from {:?}", config_path);
            let json = fs::read_to_string(&config_path)?;
            let config: AppConfig = serde_json::from_str(&json)?;
            if config.version > Self::CURRENT_VERSION {
                return Err(anyhow!("Unknown config version: {}", config.version));
            }
            Ok(config)
        } else {
            warn!("No config found, creating default at {:?}", config_path);
            let config = Self::default_with_dir(data_dir.to_path_buf());
            config.save()?;
            Ok(config)
        }
    }

    /// Create default configuration with a specific data directory
    pub fn default_with_dir(data_dir: PathBuf) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            data_dir,
            log_level: "info".to_string(),
            places: PlacesConfig::default(),
            completion: CompletionConfig::default(),
            cache: CacheConfig::default(),
            bot: BotConfig::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;

        let config_path = self.data_dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, json)?;
        info!("Saved config to {:?}", config_path);
        Ok(())
    }

    /// Path of the sqlite database file
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("tastemap.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_a_default_file_then_reloads_it() {
        let dir = TempDir::new().unwrap();

        let created = AppConfig::load_or_create(dir.path()).unwrap();
        assert_eq!(created.version, AppConfig::CURRENT_VERSION);
        assert!(dir.path().join(CONFIG_FILE).exists());

        let reloaded = AppConfig::load_or_create(dir.path()).unwrap();
        assert_eq!(reloaded.completion.model, created.completion.model);
        assert_eq!(reloaded.bot.max_attempts, 5);
    }

    #[test]
    fn rejects_a_config_from_the_future() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default_with_dir(dir.path().to_path_buf());
        config.version = 99;
        config.save().unwrap();

        assert!(AppConfig::load_or_create(dir.path()).is_err());
    }
}
