use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::record::KeyStrategy;
use crate::error::{Error, Result};

pub const DEFAULT_HISTORY_FILE: &str = ".rollcall-history.jsonl";

/// Parameters of one detection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub strategy: KeyStrategy,
    pub threshold_minutes: i64,
    pub use_exact_keys: bool,
}

impl DetectionConfig {
    pub fn for_strategy(strategy: KeyStrategy) -> Self {
        Self {
            strategy,
            threshold_minutes: strategy.default_threshold_minutes(),
            use_exact_keys: true,
        }
    }

    pub fn with_threshold_minutes(mut self, minutes: i64) -> Self {
        self.threshold_minutes = minutes;
        self
    }

    pub fn threshold(&self) -> Result<TimeDelta> {
        if self.threshold_minutes < 0 {
            return Err(Error::InvalidThreshold {
                minutes: self.threshold_minutes,
            });
        }
        Ok(TimeDelta::minutes(self.threshold_minutes))
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self::for_strategy(KeyStrategy::default())
    }
}

/// Persistent settings, read from `config.json` under the user config dir.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub strategy: KeyStrategy,
    pub names_threshold_minutes: i64,
    pub fiscal_code_threshold_minutes: i64,
    pub use_exact_keys: bool,
    pub history_file_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            strategy: KeyStrategy::Names,
            names_threshold_minutes: KeyStrategy::Names.default_threshold_minutes(),
            fiscal_code_threshold_minutes: KeyStrategy::FiscalCode.default_threshold_minutes(),
            use_exact_keys: true,
            history_file_name: DEFAULT_HISTORY_FILE.to_string(),
        }
    }
}

impl AppConfig {
    /// `<config dir>/rollcall/config.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rollcall").join("config.json"))
    }

    /// Load from `path`, or from [`AppConfig::default_path`] when `None`.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => return Ok(Self::default()),
        };
        if !path.exists() {
            log::debug!("no config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let text = fs::read_to_string(&path)?;
        let config = serde_json::from_str(&text).map_err(|source| Error::ConfigParse {
            path: path.clone(),
            source,
        })?;
        log::debug!("loaded config from {:?}", path);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn threshold_for(&self, strategy: KeyStrategy) -> i64 {
        match strategy {
            KeyStrategy::Names => self.names_threshold_minutes,
            KeyStrategy::FiscalCode => self.fiscal_code_threshold_minutes,
        }
    }

    /// Resolve a detection config, letting command-line values win.
    pub fn detection(
        &self,
        strategy: Option<KeyStrategy>,
        threshold_minutes: Option<i64>,
        no_exact: bool,
    ) -> DetectionConfig {
        let strategy = strategy.unwrap_or(self.strategy);
        DetectionConfig {
            strategy,
            threshold_minutes: threshold_minutes.unwrap_or_else(|| self.threshold_for(strategy)),
            use_exact_keys: self.use_exact_keys && !no_exact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = AppConfig::load(Some(&temp_dir.path().join("nope.json"))).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"strategy": "fiscal-code", "fiscal_code_threshold_minutes": 15}"#)
            .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.strategy, KeyStrategy::FiscalCode);
        assert_eq!(config.fiscal_code_threshold_minutes, 15);
        assert_eq!(config.names_threshold_minutes, 120);
        assert_eq!(config.history_file_name, DEFAULT_HISTORY_FILE);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            AppConfig::load(Some(&path)),
            Err(Error::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.json");
        let config = AppConfig {
            use_exact_keys: false,
            ..AppConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(AppConfig::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_cli_values_override() {
        let config = AppConfig::default();
        let detection = config.detection(None, None, false);
        assert_eq!(detection, DetectionConfig::for_strategy(KeyStrategy::Names));

        let detection = config.detection(Some(KeyStrategy::FiscalCode), None, true);
        assert_eq!(detection.threshold_minutes, 10);
        assert!(!detection.use_exact_keys);

        let detection = config.detection(None, Some(45), false);
        assert_eq!(detection.threshold_minutes, 45);
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let config = DetectionConfig::default().with_threshold_minutes(-1);
        assert!(matches!(
            config.threshold(),
            Err(Error::InvalidThreshold { minutes: -1 })
        ));
        assert_eq!(
            DetectionConfig::default().threshold().unwrap(),
            TimeDelta::minutes(120)
        );
    }
}
