use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;
use crate::error::{GripError, Result};

pub const DEFAULT_BODY_WEIGHT_KG: f64 = 70.0;
pub const DEFAULT_AUTO_START_THRESHOLD_KG: f64 = 2.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub body_weight_kg: f64,
    pub audio_enabled: bool,
    pub haptic_enabled: bool,
    pub auto_start_enabled: bool,
    /// Force that starts a prepared test when auto start is on
    pub auto_start_threshold_kg: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            body_weight_kg: DEFAULT_BODY_WEIGHT_KG,
            audio_enabled: true,
            haptic_enabled: true,
            auto_start_enabled: false,
            auto_start_threshold_kg: DEFAULT_AUTO_START_THRESHOLD_KG,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if !self.body_weight_kg.is_finite() || self.body_weight_kg <= 0.0 {
            return Err(GripError::config(format!(
                "body weight must be a positive number of kg, got {}",
                self.body_weight_kg
            )));
        }
        if !self.auto_start_threshold_kg.is_finite() || self.auto_start_threshold_kg < 0.0 {
            return Err(GripError::config(format!(
                "auto start threshold must be a non-negative number of kg, got {}",
                self.auto_start_threshold_kg
            )));
        }
        Ok(())
    }
}

pub trait SettingsStore {
    fn load(&self) -> Settings;
    fn save(&self, settings: &Settings) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path()
            .unwrap_or_else(|| PathBuf::from("gripmeter_settings.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileSettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore for FileSettingsStore {
    /// Missing, unreadable or invalid files all fall back to defaults.
    fn load(&self) -> Settings {
        let Ok(bytes) = fs::read(&self.path) else {
            return Settings::default();
        };
        match serde_json::from_slice::<Settings>(&bytes) {
            Ok(settings) if settings.validate().is_ok() => settings,
            Ok(_) | Err(_) => {
                tracing::warn!(path = %self.path.display(), "ignoring invalid settings file");
                Settings::default()
            }
        }
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        settings.validate()?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(settings)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_settings() {
        let dir = tempdir().unwrap();
        let store = FileSettingsStore::with_path(dir.path().join("settings.json"));
        let settings = Settings::default();
        store.save(&settings).unwrap();
        assert_eq!(store.load(), settings);
    }

    #[test]
    fn save_and_load_custom_settings() {
        let dir = tempdir().unwrap();
        let store = FileSettingsStore::with_path(dir.path().join("nested/settings.json"));
        let settings = Settings {
            body_weight_kg: 82.5,
            audio_enabled: false,
            haptic_enabled: true,
            auto_start_enabled: true,
            auto_start_threshold_kg: 3.5,
        };
        store.save(&settings).unwrap();
        assert_eq!(store.load(), settings);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let store = FileSettingsStore::with_path(dir.path().join("absent.json"));
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn corrupt_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, b"{ not json").unwrap();
        assert_eq!(FileSettingsStore::with_path(&path).load(), Settings::default());

        fs::write(&path, br#"{"body_weight_kg": -4}"#).unwrap();
        assert_eq!(FileSettingsStore::with_path(&path).load(), Settings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, br#"{"audio_enabled": false}"#).unwrap();
        let loaded = FileSettingsStore::with_path(&path).load();
        assert!(!loaded.audio_enabled);
        assert_eq!(loaded.body_weight_kg, DEFAULT_BODY_WEIGHT_KG);
        assert!(!loaded.auto_start_enabled);
        assert_eq!(loaded.auto_start_threshold_kg, DEFAULT_AUTO_START_THRESHOLD_KG);
    }

    #[test]
    fn auto_start_defaults_off_at_two_kg() {
        let settings = Settings::default();
        assert!(!settings.auto_start_enabled);
        assert_eq!(settings.auto_start_threshold_kg, 2.0);
    }

    #[test]
    fn auto_start_fields_are_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = FileSettingsStore::with_path(&path);
        let settings = Settings {
            auto_start_enabled: true,
            auto_start_threshold_kg: 4.0,
            ..Default::default()
        };
        store.save(&settings).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"auto_start_enabled\": true"));
        assert!(raw.contains("\"auto_start_threshold_kg\": 4.0"));
        assert_eq!(store.load(), settings);
    }

    #[test]
    fn negative_auto_start_threshold_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = FileSettingsStore::with_path(&path);
        let settings = Settings {
            auto_start_threshold_kg: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            store.save(&settings),
            Err(GripError::Configuration(_))
        ));

        fs::write(&path, br#"{"auto_start_threshold_kg": -1}"#).unwrap();
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn invalid_body_weight_is_rejected_on_save() {
        let dir = tempdir().unwrap();
        let store = FileSettingsStore::with_path(dir.path().join("settings.json"));
        let settings = Settings {
            body_weight_kg: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            store.save(&settings),
            Err(GripError::Configuration(_))
        ));
        assert!(!store.path().exists());
    }
}
