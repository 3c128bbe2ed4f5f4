//! Engine configuration.
//!
//! ## Learning: Serde for Serialization
//!
//! `#[derive(Serialize, Deserialize)]` generates the TOML conversion, and
//! `#[serde(default)]` fills missing fields from `Default`, so partial
//! config files stay valid as new settings are added.
//!
//! ## Validation
//!
//! Every field has an accepted range. Files are validated after parsing,
//! and [`ConfigManager::update`] validates a whole [`ConfigPatch`] before
//! applying any of it.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::listener::{ListenerList, Subscription, invoke_isolated};

const MIB: usize = 1024 * 1024;

const HISTORY_SIZE_RANGE: RangeInclusive<usize> = 1..=10_000;
const TABLE_ROWS_RANGE: RangeInclusive<usize> = 1..=1000;
const TABLE_COLS_RANGE: RangeInclusive<usize> = 1..=100;
const IMAGE_SIZE_RANGE: RangeInclusive<usize> = 1..=100 * MIB;
const IMAGE_DIMENSION_RANGE: RangeInclusive<usize> = 1..=16_384;

/// Main engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Undo history settings
    pub history: HistoryConfig,

    /// Table editing limits
    pub table: TableConfig,

    /// Floating image limits
    pub image: ImageConfig,
}

impl Config {
    /// Loads config from the default location, falling back to defaults.
    pub fn load() -> Self {
        match Self::load_from_default_path() {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(error = %err, "Using default config");
                Self::default()
            }
        }
    }

    /// Loads and validates config from a file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_default_path() -> Result<Self, ConfigError> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Returns the default config file path.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("folio").join("config.toml"))
    }

    /// Saves the config to a file, creating parent directories.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Saves the config to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::default_path()?)
    }

    /// Checks every field against its accepted range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check("history.max_size", self.history.max_size, HISTORY_SIZE_RANGE)?;
        check("table.max_rows", self.table.max_rows, TABLE_ROWS_RANGE)?;
        check("table.max_cols", self.table.max_cols, TABLE_COLS_RANGE)?;
        check("image.max_size", self.image.max_size, IMAGE_SIZE_RANGE)?;
        check("image.max_width", self.image.max_width, IMAGE_DIMENSION_RANGE)?;
        check("image.max_height", self.image.max_height, IMAGE_DIMENSION_RANGE)?;
        Ok(())
    }
}

fn check(field: &str, value: usize, range: RangeInclusive<usize>) -> Result<(), ConfigError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Validation {
            field: field.to_string(),
            reason: format!(
                "{value} is outside {}..={}",
                range.start(),
                range.end()
            ),
        })
    }
}

/// Converts a signed patch value, rejecting anything out of range.
fn checked(field: &str, value: i64, range: RangeInclusive<usize>) -> Result<usize, ConfigError> {
    let converted = usize::try_from(value).map_err(|_| ConfigError::Validation {
        field: field.to_string(),
        reason: format!("{value} must not be negative"),
    })?;
    check(field, converted, range)?;
    Ok(converted)
}

/// Undo history configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Entries kept behind the current one
    pub max_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_size: crate::history::DEFAULT_MAX_PAST,
        }
    }
}

/// Table limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub max_rows: usize,
    pub max_cols: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            max_rows: 100,
            max_cols: 30,
        }
    }
}

/// Floating image limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Maximum decoded size of inline image data, in bytes
    pub max_size: usize,
    /// Maximum width in pixels
    pub max_width: usize,
    /// Maximum height in pixels
    pub max_height: usize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_size: 5 * MIB,
            max_width: 4096,
            max_height: 4096,
        }
    }
}

/// A set of changes to apply atomically.
///
/// Values are signed so that invalid input such as `-1` reaches
/// validation instead of failing at the type level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub history_max_size: Option<i64>,
    pub table_max_rows: Option<i64>,
    pub table_max_cols: Option<i64>,
    pub image_max_size: Option<i64>,
    pub image_max_width: Option<i64>,
    pub image_max_height: Option<i64>,
}

impl ConfigPatch {
    /// Returns a patched copy of `config`, or the first validation error.
    pub fn apply_to(&self, config: &Config) -> Result<Config, ConfigError> {
        let mut next = config.clone();
        if let Some(value) = self.history_max_size {
            next.history.max_size = checked("history.max_size", value, HISTORY_SIZE_RANGE)?;
        }
        if let Some(value) = self.table_max_rows {
            next.table.max_rows = checked("table.max_rows", value, TABLE_ROWS_RANGE)?;
        }
        if let Some(value) = self.table_max_cols {
            next.table.max_cols = checked("table.max_cols", value, TABLE_COLS_RANGE)?;
        }
        if let Some(value) = self.image_max_size {
            next.image.max_size = checked("image.max_size", value, IMAGE_SIZE_RANGE)?;
        }
        if let Some(value) = self.image_max_width {
            next.image.max_width = checked("image.max_width", value, IMAGE_DIMENSION_RANGE)?;
        }
        if let Some(value) = self.image_max_height {
            next.image.max_height = checked("image.max_height", value, IMAGE_DIMENSION_RANGE)?;
        }
        Ok(next)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

type ConfigListener = dyn Fn(&Config, &Config) -> anyhow::Result<()>;

/// Owns the active config and notifies listeners of changes.
pub struct ConfigManager {
    config: Config,
    listeners: ListenerList<ConfigListener>,
}

impl ConfigManager {
    /// Wraps an already validated config.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            listeners: ListenerList::new(),
        })
    }

    pub fn get(&self) -> &Config {
        &self.config
    }

    /// Validates and applies a patch; nothing changes on error.
    pub fn update(&mut self, patch: &ConfigPatch) -> Result<(), ConfigError> {
        let next = patch.apply_to(&self.config)?;
        self.apply(next);
        Ok(())
    }

    /// Replaces the config wholesale after validating it.
    pub fn replace(&mut self, config: Config) -> Result<(), ConfigError> {
        config.validate()?;
        self.apply(config);
        Ok(())
    }

    /// Restores defaults.
    pub fn reset(&mut self) {
        self.apply(Config::default());
    }

    /// Registers a listener called with `(new, old)` after every change.
    pub fn subscribe(
        &self,
        listener: impl Fn(&Config, &Config) -> anyhow::Result<()> + 'static,
    ) -> Subscription {
        self.listeners.add(Rc::new(listener))
    }

    fn apply(&mut self, next: Config) {
        if next == self.config {
            return;
        }
        let old = std::mem::replace(&mut self.config, next);
        tracing::debug!("Config updated");
        for (id, listener) in self.listeners.snapshot() {
            if self.listeners.contains(id) {
                invoke_isolated("config", || listener(&self.config, &old));
            }
        }
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self {
            config: Config::default(),
            listeners: ListenerList::new(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config directory not found")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for {field}: {reason}")]
    Validation { field: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.history.max_size, 50);
        assert_eq!(config.table.max_rows, 100);
        assert_eq!(config.table.max_cols, 30);
        assert_eq!(config.image.max_size, 5 * MIB);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_value_rejected_atomically() {
        let mut manager = ConfigManager::default();
        manager
            .update(&ConfigPatch {
                table_max_rows: Some(20),
                ..ConfigPatch::default()
            })
            .unwrap();
        let before = manager.get().clone();

        let result = manager.update(&ConfigPatch {
            table_max_cols: Some(10),
            history_max_size: Some(-1),
            ..ConfigPatch::default()
        });

        assert!(matches!(
            result,
            Err(ConfigError::Validation { ref field, .. }) if field == "history.max_size"
        ));
        assert_eq!(manager.get(), &before);
        assert_eq!(manager.get().table.max_rows, 20);
        assert_eq!(manager.get().table.max_cols, 30);
    }

    #[test]
    fn test_upper_bounds_rejected() {
        let patch = ConfigPatch {
            image_max_width: Some(16_385),
            ..ConfigPatch::default()
        };
        assert!(patch.apply_to(&Config::default()).is_err());
    }

    #[test]
    fn test_listeners_notified_on_change_only() {
        let mut manager = ConfigManager::default();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = manager.subscribe(move |new, old| {
            sink.borrow_mut()
                .push((old.history.max_size, new.history.max_size));
            Ok(())
        });

        manager
            .update(&ConfigPatch {
                history_max_size: Some(10),
                ..ConfigPatch::default()
            })
            .unwrap();
        manager.update(&ConfigPatch::default()).unwrap();
        manager.reset();

        assert_eq!(*seen.borrow(), vec![(50, 10), (10, 50)]);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.table.max_cols = 12;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[history]\nmax_size = 5\n").unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.history.max_size, 5);
        assert_eq!(loaded.table, TableConfig::default());
    }

    #[test]
    fn test_invalid_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[table]\nmax_rows = 0\n").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Validation { .. })
        ));
    }
}
