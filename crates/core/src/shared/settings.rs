use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::session::session_config::{SessionConfig, MIN_TICK_INTERVAL};
use crate::shared::constants::{AUTH_BASE_URL, IDEAL_HEIGHT, IDEAL_WIDTH, SNAPSHOT_QUALITY};
use crate::shared::model_resolver::ModelLocation;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Session timing as stored on disk (milliseconds keep the JSON readable).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub tick_ms: u64,
    pub timeout_secs: u64,
    pub min_capture_gap_ms: u64,
    pub confidence_threshold: f64,
    pub max_consecutive_failures: u32,
    pub required_frame_count: usize,
}

impl From<&SessionConfig> for SessionSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            tick_ms: config.tick_interval.as_millis() as u64,
            timeout_secs: config.session_timeout.as_secs(),
            min_capture_gap_ms: config.min_capture_gap.as_millis() as u64,
            confidence_threshold: config.confidence_threshold,
            max_consecutive_failures: config.max_consecutive_failures,
            required_frame_count: config.required_frame_count,
        }
    }
}

impl From<&SessionSettings> for SessionConfig {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            tick_interval: Duration::from_millis(settings.tick_ms).max(MIN_TICK_INTERVAL),
            session_timeout: Duration::from_secs(settings.timeout_secs),
            min_capture_gap: Duration::from_millis(settings.min_capture_gap_ms),
            confidence_threshold: settings.confidence_threshold,
            max_consecutive_failures: settings.max_consecutive_failures.max(1),
            required_frame_count: settings.required_frame_count.max(1),
        }
    }
}

impl SessionSettings {
    pub fn login() -> Self {
        Self::from(&SessionConfig::login())
    }

    pub fn register() -> Self {
        Self::from(&SessionConfig::register())
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::register()
    }
}

/// A partial `login` block only overrides what it names; the rest comes
/// from the login preset rather than the registration one.
fn login_section<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SessionSettings, D::Error> {
    let overrides = Map::<String, Value>::deserialize(deserializer)?;
    let mut merged = serde_json::to_value(SessionSettings::login()).map_err(D::Error::custom)?;
    if let Value::Object(base) = &mut merged {
        base.extend(overrides);
    }
    serde_json::from_value(merged).map_err(D::Error::custom)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server_url: String,
    pub device: String,
    pub capture_width: u32,
    pub capture_height: u32,
    pub snapshot_quality: u8,
    pub model_name: String,
    pub model_url: String,
    pub model_dir: Option<PathBuf>,
    pub overlay: bool,
    #[serde(deserialize_with = "login_section")]
    pub login: SessionSettings,
    pub register: SessionSettings,
}

fn default_device() -> String {
    #[cfg(target_os = "macos")]
    {
        "0".to_string()
    }
    #[cfg(target_os = "windows")]
    {
        "video=Integrated Camera".to_string()
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        "/dev/video0".to_string()
    }
}

impl Default for Settings {
    fn default() -> Self {
        let model = ModelLocation::default();
        Self {
            server_url: AUTH_BASE_URL.to_string(),
            device: default_device(),
            capture_width: IDEAL_WIDTH,
            capture_height: IDEAL_HEIGHT,
            snapshot_quality: SNAPSHOT_QUALITY,
            model_name: model.name,
            model_url: model.url,
            model_dir: None,
            overlay: false,
            login: SessionSettings::login(),
            register: SessionSettings::register(),
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("FaceGate").join("settings.json"))
    }

    /// Loads the user's settings, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|e| {
                log::warn!("{e}; using default settings");
                Self::default()
            }),
            _ => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let json = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(io_err)
    }

    pub fn model_location(&self) -> ModelLocation {
        ModelLocation {
            name: self.model_name.clone(),
            url: self.model_url.clone(),
            bundled_dir: self.model_dir.clone(),
        }
    }

    pub fn login_config(&self) -> SessionConfig {
        SessionConfig::from(&self.login)
    }

    pub fn register_config(&self) -> SessionConfig {
        SessionConfig::from(&self.register)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_session_presets() {
        let settings = Settings::default();
        assert_eq!(settings.login_config(), SessionConfig::login());
        assert_eq!(settings.register_config(), SessionConfig::register());
        assert_eq!(settings.snapshot_quality, 90);
        assert_eq!((settings.capture_width, settings.capture_height), (640, 480));
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "server_url": "https://auth.example.test/v1", "login": { "timeout_secs": 10 } }"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();

        assert_eq!(settings.server_url, "https://auth.example.test/v1");
        assert_eq!(settings.login.timeout_secs, 10);
        assert_eq!(settings.login.max_consecutive_failures, 5);
        assert_eq!(settings.login.tick_ms, 200);
        assert_eq!(settings.register, Settings::default().register);
    }

    #[test]
    fn test_saved_settings_load_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("settings.json");
        let settings = Settings {
            device: "/dev/video2".to_string(),
            overlay: true,
            ..Settings::default()
        };

        settings.save_to(&path).unwrap();

        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            Settings::load_from(&path),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            Settings::load_from(&tmp.path().join("absent.json")),
            Err(SettingsError::Io { .. })
        ));
    }

    #[test]
    fn test_zero_values_are_clamped_when_converting() {
        let stored = SessionSettings {
            tick_ms: 0,
            max_consecutive_failures: 0,
            required_frame_count: 0,
            ..SessionSettings::default()
        };
        let config = SessionConfig::from(&stored);
        assert_eq!(config.tick_interval, Duration::from_millis(1));
        assert_eq!(config.max_consecutive_failures, 1);
        assert_eq!(config.required_frame_count, 1);
    }

    #[test]
    fn test_model_location_uses_configured_dir() {
        let settings = Settings {
            model_dir: Some(PathBuf::from("/opt/facegate/models")),
            ..Settings::default()
        };
        let loc = settings.model_location();
        assert_eq!(loc.bundled_dir, Some(PathBuf::from("/opt/facegate/models")));
        assert_eq!(loc.name, settings.model_name);
    }
}
