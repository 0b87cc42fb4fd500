use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use log::info;
use serde_derive::Deserialize;

use crate::gateway::{
    DEFAULT_DATA_WINDOW, DEFAULT_DELETION_BLINK, DEFAULT_REGISTRATION_BLINK, DEFAULT_RSSI_THRESHOLD,
    DEFAULT_WAKE_INTERVAL, GatewaySettings,
};
use crate::messages::BlinkRate;

const DEFAULT_RETAINED_PATH: &str = "retained.json";

#[derive(Deserialize, Debug, Default, Clone)]
pub struct AppConfig {
    pub radio: Option<RadioConfig>,
    pub sleep: Option<SleepConfig>,
    pub indicator: Option<IndicatorConfig>,
    pub storage: Option<StorageConfig>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct RadioConfig {
    pub rssi_threshold: Option<i16>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct SleepConfig {
    pub wake_interval_seconds: Option<u64>,
    pub data_window_ms: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct IndicatorConfig {
    pub registration_blink_ms: Option<u64>,
    pub deletion_blink_ms: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct StorageConfig {
    pub retained_path: Option<PathBuf>,
}

impl AppConfig {
    /// Reads `path`, falling back to the defaults when it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(AppConfig::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::de::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn settings(&self) -> GatewaySettings {
        let radio = self.radio.clone().unwrap_or_default();
        let sleep = self.sleep.clone().unwrap_or_default();
        let indicator = self.indicator.clone().unwrap_or_default();

        GatewaySettings {
            rssi_threshold: radio.rssi_threshold.unwrap_or(DEFAULT_RSSI_THRESHOLD),
            wake_interval: sleep
                .wake_interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_WAKE_INTERVAL),
            data_window: sleep
                .data_window_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_DATA_WINDOW),
            registration_blink: indicator
                .registration_blink_ms
                .map(BlinkRate::symmetric)
                .unwrap_or(DEFAULT_REGISTRATION_BLINK),
            deletion_blink: indicator
                .deletion_blink_ms
                .map(BlinkRate::symmetric)
                .unwrap_or(DEFAULT_DELETION_BLINK),
        }
    }

    pub fn retained_path(&self) -> PathBuf {
        self.storage
            .as_ref()
            .and_then(|s| s.retained_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RETAINED_PATH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config() {
        let config_str = r#"
            [radio]
            rssi_threshold = -65

            [sleep]
            wake_interval_seconds = 60
            data_window_ms = 2500

            [storage]
            retained_path = "/var/lib/vitals-gateway/retained.json"
        "#;
        let config: AppConfig = toml::de::from_str(&config_str).unwrap();
        let settings = config.settings();
        assert!(settings.rssi_threshold == -65);
        assert!(settings.wake_interval == Duration::from_secs(60));
        assert!(settings.data_window == Duration::from_millis(2500));
        assert!(settings.registration_blink == DEFAULT_REGISTRATION_BLINK);
        assert!(
            config.retained_path() == PathBuf::from("/var/lib/vitals-gateway/retained.json")
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::de::from_str("").unwrap();
        assert!(config.settings() == GatewaySettings::default());
        assert!(config.retained_path() == PathBuf::from(DEFAULT_RETAINED_PATH));
    }

    #[test]
    fn test_indicator_rates() {
        let config_str = r#"
            [indicator]
            registration_blink_ms = 50
            deletion_blink_ms = 1000
        "#;
        let config: AppConfig = toml::de::from_str(config_str).unwrap();
        let settings = config.settings();
        assert!(settings.registration_blink == BlinkRate::symmetric(50));
        assert!(settings.deletion_blink == BlinkRate::symmetric(1000));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert!(config.radio.is_none());
    }
}
