// Configuration Storage Service
// Handles config file read/write, threshold validation and version backup

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::errors::{GuardError, GuardResult};
use crate::models::{DisplayLang, ZoneThresholds};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: String,
    pub proxy: Option<ProxyConfig>,
    #[serde(default)]
    pub chat: EndpointConfig,
    #[serde(default)]
    pub moderation: EndpointConfig,
    #[serde(default)]
    pub zoning: ZoneThresholds,
    /// Language used when the classifier's detected language is missing or unsupported.
    #[serde(default)]
    pub default_lang: DisplayLang,
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            proxy: None,
            chat: EndpointConfig::default(),
            moderation: EndpointConfig::default(),
            zoning: ZoneThresholds::default(),
            default_lang: DisplayLang::default(),
            api_keys: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub enabled: bool,
    pub http: Option<String>,
    pub https: Option<String>,
}

impl ProxyConfig {
    pub fn active_url(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.https.as_deref().or(self.http.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("toxiguard"))
    }

    /// Ensure config directory exists
    pub fn ensure_dir(&self) -> GuardResult<()> {
        fs::create_dir_all(&self.config_dir)
            .map_err(|e| GuardError::config(format!("Failed to create config dir: {}", e)))
    }

    /// Load configuration from file. A missing file yields the defaults;
    /// a file with out-of-range thresholds is rejected.
    pub fn load(&self) -> GuardResult<AppConfig> {
        if !self.config_file.exists() {
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_file)
            .map_err(|e| GuardError::config(format!("Failed to read config: {}", e)))?;

        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| GuardError::config(format!("Failed to parse config: {}", e)))?;
        config.zoning.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config: &AppConfig) -> GuardResult<()> {
        config.zoning.validate()?;
        self.ensure_dir()?;

        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| GuardError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&self.config_file, content)
            .map_err(|e| GuardError::config(format!("Failed to write config: {}", e)))
    }

    fn create_backup(&self) -> GuardResult<()> {
        let backup_dir = self.config_dir.join("backups");
        fs::create_dir_all(&backup_dir)
            .map_err(|e| GuardError::config(format!("Failed to create backup dir: {}", e)))?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%3f");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));

        fs::copy(&self.config_file, &backup_file)
            .map_err(|e| GuardError::config(format!("Failed to create backup: {}", e)))?;

        self.cleanup_old_backups(&backup_dir, 10)
    }

    /// Remove old backups, keeping only the most recent N
    fn cleanup_old_backups(&self, backup_dir: &Path, keep: usize) -> GuardResult<()> {
        let mut entries: Vec<_> = fs::read_dir(backup_dir)
            .map_err(|e| GuardError::config(format!("Failed to read backup dir: {}", e)))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            .collect();

        if entries.len() <= keep {
            return Ok(());
        }

        // Oldest first
        entries.sort_by_key(|e| {
            e.metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        });

        for entry in entries.iter().take(entries.len() - keep) {
            let _ = fs::remove_file(entry.path());
        }

        Ok(())
    }

    pub fn get_api_key(&self, provider: &str) -> GuardResult<Option<String>> {
        let config = self.load()?;
        Ok(config.api_keys.get(provider).cloned())
    }

    pub fn set_api_key(&self, provider: &str, key: &str) -> GuardResult<()> {
        let mut config = self.load()?;
        config.api_keys.insert(provider.to_string(), key.to_string());
        self.save(&config)
    }

    pub fn delete_api_key(&self, provider: &str) -> GuardResult<()> {
        let mut config = self.load()?;
        config.api_keys.remove(provider);
        self.save(&config)
    }

    /// Persist a new zoning table. Invalid tables leave the file untouched.
    pub fn set_zoning(&self, zoning: ZoneThresholds) -> GuardResult<()> {
        zoning.validate()?;
        let mut config = self.load()?;
        config.zoning = zoning;
        self.save(&config)
    }
}
