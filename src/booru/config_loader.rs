use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

// Define error types for config loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// Result type alias for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Index endpoint settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Api {
    pub base_url: String,
    pub user_agent: String,
    pub page_size: usize,
    pub max_pages: usize,
    pub request_timeout_secs: u64,
}

/// Binary fetch settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Download {
    pub directory: String,
    pub max_concurrent_downloads: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Logging {
    pub log_level: String,
    pub log_format: String,
    pub log_to_file: bool,
    pub log_directory: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    pub api: Api,
    pub download: Download,
    pub logging: Logging,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: Api {
                base_url: "https://api.rule34.xxx/index.php".to_string(),
                user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36".to_string(),
                page_size: 100,
                // The endpoint refuses pid values past 2000
                max_pages: 2000,
                request_timeout_secs: 30,
            },
            download: Download {
                directory: ".".to_string(),
                max_concurrent_downloads: 10,
                timeout_secs: 120,
            },
            logging: Logging {
                log_level: "info".to_string(),
                log_format: "line".to_string(),
                log_to_file: true,
                log_directory: "./logs".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Checks the values that would otherwise break the pipeline at runtime.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(1..=1000).contains(&self.api.page_size) {
            return Err(ConfigError::Invalid(format!(
                "api.page_size must be between 1 and 1000, got {}",
                self.api.page_size
            )));
        }
        if self.api.max_pages == 0 {
            return Err(ConfigError::Invalid("api.max_pages must be at least 1".to_string()));
        }
        if self.download.max_concurrent_downloads == 0 {
            return Err(ConfigError::Invalid(
                "download.max_concurrent_downloads must be at least 1".to_string(),
            ));
        }
        if self.api.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "api.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.download.timeout_secs == 0 {
            return Err(ConfigError::Invalid("download.timeout_secs must be at least 1".to_string()));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api.base_url must not be empty".to_string()));
        }
        Ok(())
    }
}

// Config manager to handle the configuration file
pub struct ConfigManager {
    app_config: AppConfig,
    config_dir: PathBuf,
}

impl ConfigManager {
    // Create a new ConfigManager instance
    pub fn new(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        // Create the directory if it doesn't exist
        if !config_dir.exists() {
            info!("Creating config directory: {}", config_dir.display());
            fs::create_dir_all(&config_dir)?;
        }

        let app_config = Self::load_app_config(&config_dir)?;
        app_config.validate()?;

        let manager = Self {
            app_config,
            config_dir,
        };

        // Create default config file if it doesn't exist
        manager.create_default_config()?;

        Ok(manager)
    }

    // Load app config from config.toml
    fn load_app_config(config_dir: &Path) -> ConfigResult<AppConfig> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            warn!("Config file not found: {}", config_path.display());
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&config_path)?;
        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                error!("Failed to parse {}: {}", CONFIG_FILE_NAME, e);
                info!("Backing up old config and creating new one with default values");

                // Backup the old config file
                if let Err(backup_err) = fs::rename(&config_path, config_path.with_extension("toml.backup")) {
                    warn!("Failed to backup old config: {}", backup_err);
                }

                Ok(AppConfig::default())
            }
        }
    }

    // Get app config
    pub fn get_app_config(&self) -> &AppConfig {
        &self.app_config
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    // Write the in-memory config to disk if no file exists yet
    fn create_default_config(&self) -> ConfigResult<()> {
        let config_path = self.config_path();
        if config_path.exists() {
            return Ok(());
        }

        let toml_string = toml::to_string_pretty(&self.app_config)
            .map_err(|e| ConfigError::TomlSer(e.to_string()))?;
        fs::write(&config_path, toml_string)?;
        info!("Created {} with default values", config_path.display());

        Ok(())
    }
}

// Helper function to create a ConfigManager instance
pub fn init_config(config_dir: impl AsRef<Path>) -> ConfigResult<ConfigManager> {
    ConfigManager::new(config_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_config_writes_defaults() {
        let dir = tempdir().unwrap();
        let manager = init_config(dir.path()).unwrap();

        assert!(dir.path().join(CONFIG_FILE_NAME).exists());
        let config = manager.get_app_config();
        assert_eq!(*config, AppConfig::default());
        assert_eq!(config.api.page_size, 100);
        assert_eq!(config.download.max_concurrent_downloads, 10);
    }

    #[test]
    fn test_existing_config_is_loaded() {
        let dir = tempdir().unwrap();
        init_config(dir.path()).unwrap();

        let mut config = AppConfig::default();
        config.download.directory = "/srv/media".to_string();
        config.api.max_pages = 5;
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            toml::to_string_pretty(&config).unwrap(),
        )
        .unwrap();

        let reloaded = init_config(dir.path()).unwrap().get_app_config().clone();
        assert_eq!(reloaded.download.directory, "/srv/media");
        assert_eq!(reloaded.api.max_pages, 5);
    }

    #[test]
    fn test_corrupted_config_is_backed_up() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "this is = = not toml").unwrap();

        let manager = init_config(dir.path()).unwrap();

        assert!(dir.path().join("config.toml.backup").exists());
        assert_eq!(*manager.get_app_config(), AppConfig::default());
        // A fresh default file replaces the broken one
        let content = fs::read_to_string(dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert!(toml::from_str::<AppConfig>(&content).is_ok());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = AppConfig::default();
        config.download.max_concurrent_downloads = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = AppConfig::default();
        config.api.page_size = 5000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = AppConfig::default();
        config.api.max_pages = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_timeouts_are_rejected() {
        let mut config = AppConfig::default();
        config.api.request_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(ref msg)) if msg.contains("request_timeout_secs")));

        let mut config = AppConfig::default();
        config.download.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(ref msg)) if msg.contains("download.timeout_secs")));

        let dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.download.timeout_secs = 0;
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            toml::to_string_pretty(&config).unwrap(),
        )
        .unwrap();
        assert!(matches!(init_config(dir.path()), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_file_values_fail_startup() {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.api.page_size = 0;
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            toml::to_string_pretty(&config).unwrap(),
        )
        .unwrap();

        assert!(matches!(init_config(dir.path()), Err(ConfigError::Invalid(_))));
    }
}
