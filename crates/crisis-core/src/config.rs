use crate::error::{CrisisError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file. Relative paths are resolved against `.crisis/`.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(paths::DEFAULT_STORE_FILE)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// TriggerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Drain the change feed right after each CLI write.
    #[serde(default = "default_inline")]
    pub inline: bool,
    /// Deliveries per change before it is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Changes read from the feed per drain pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Worker sleep between drain passes.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_inline() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_batch_size() -> usize {
    100
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            inline: default_inline(),
            max_attempts: default_max_attempts(),
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// HistoryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Attribute transitions to the principal the store captured at write
    /// time when one is present, instead of the `last_updated_by_*` fields.
    #[serde(default = "default_prefer_principal")]
    pub prefer_principal: bool,
}

fn default_prefer_principal() -> bool {
    true
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            prefer_principal: default_prefer_principal(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: u32,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub triggers: TriggerConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            store: StoreConfig::default(),
            triggers: TriggerConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(CrisisError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn store_path(&self, root: &Path) -> PathBuf {
        paths::store_path(root, &self.store.path)
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.store.path.as_os_str().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "store.path is empty".to_string(),
            });
        }
        if self.triggers.max_attempts == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "triggers.max_attempts must be at least 1".to_string(),
            });
        }
        if self.triggers.batch_size == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "triggers.batch_size must be at least 1".to_string(),
            });
        }
        if !self.triggers.inline && self.triggers.poll_interval_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "triggers.poll_interval_ms is 0: the worker will spin".to_string(),
            });
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_without_config_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(CrisisError::NotInitialized)
        ));
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.triggers.max_attempts = 9;
        cfg.history.prefer_principal = false;
        cfg.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.triggers.max_attempts, 9);
        assert!(!loaded.history.prefer_principal);
        assert_eq!(loaded.store.path, PathBuf::from("crisis.redb"));
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let cfg: Config = serde_yaml::from_str("version: 1\n").unwrap();
        assert!(cfg.triggers.inline);
        assert_eq!(cfg.triggers.max_attempts, 5);
        assert_eq!(cfg.triggers.batch_size, 100);
        assert!(cfg.history.prefer_principal);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn validate_flags_zero_limits() {
        let mut cfg = Config::default();
        cfg.triggers.max_attempts = 0;
        cfg.triggers.batch_size = 0;
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| w.level == WarnLevel::Error));
    }
}
