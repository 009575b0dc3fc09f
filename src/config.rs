//! File configuration
//!
//! Everything adjustable without a rebuild lives in one TOML file. A default file is
//! written on first start; values are validated before any hardware is touched.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::controller::axis_discretizer::AxisSettings;
use crate::controller::edge_monitor::EdgeMonitorSettings;
use crate::controller::facade::DriveSettings;
use crate::controller::input_state::LogicalButton;
use crate::controller::pin_map::{PinMap, SYNTHETIC_BASE};
use crate::hw::ads1015::{AdcChannel, DEFAULT_ADDRESS};
use crate::mapping::KeyMap;
use crate::mqtt::publisher::{PublishSettings, DEFAULT_TOPIC};
use crate::mqtt::MqttConfig;

pub const CONFIG_ENV: &str = "JOYBONNET_CONFIG";
const CONFIG_DIR: &str = "joybonnet";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No configuration directory on this system, set JOYBONNET_CONFIG")]
    NoConfigDir,

    #[error("Failed to access {}: {reason}", path.display())]
    Io { path: PathBuf, reason: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Physical pin of each digital button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonPins {
    pub a: u16,
    pub b: u16,
    pub x: u16,
    pub y: u16,
    pub select: u16,
    pub start: u16,
    pub player1: u16,
    pub player2: u16,
}

impl Default for ButtonPins {
    fn default() -> Self {
        Self {
            a: 12,
            b: 6,
            x: 16,
            y: 13,
            select: 20,
            start: 26,
            player1: 23,
            player2: 22,
        }
    }
}

impl ButtonPins {
    pub fn entries(&self) -> [(u16, LogicalButton); 8] {
        [
            (self.a, LogicalButton::A),
            (self.b, LogicalButton::B),
            (self.x, LogicalButton::X),
            (self.y, LogicalButton::Y),
            (self.select, LogicalButton::Select),
            (self.start, LogicalButton::Start),
            (self.player1, LogicalButton::Player1),
            (self.player2, LogicalButton::Player2),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    pub debounce_ms: u64,
    pub pins: ButtonPins,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 10,
            pins: ButtonPins::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdcConfig {
    pub i2c_bus: u8,
    pub address: u16,
    pub conversion_timeout_ms: u64,
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            address: DEFAULT_ADDRESS,
            conversion_timeout_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisConfig {
    pub poll_interval_ms: u64,
    pub calibration_center: i32,
    pub activate_threshold: i32,
    pub release_threshold: i32,
    pub x_channel: u8,
    pub y_channel: u8,
    pub invert_y: bool,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            calibration_center: 800,
            activate_threshold: 600,
            release_threshold: 600,
            x_channel: 1,
            y_channel: 0,
            invert_y: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardConfig {
    /// Without a virtual keyboard, key events are only logged
    pub enabled: bool,
    pub device_name: String,
    pub codes: KeyMap,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device_name: "retrogame".to_string(),
            codes: KeyMap::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub interval_ms: u64,
    pub topic: String,
    /// Add throttle, angle, mode and recording to every payload
    pub include_drive: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            topic: DEFAULT_TOPIC.to_string(),
            include_drive: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BonnetConfig {
    pub gpio: GpioConfig,
    pub adc: AdcConfig,
    pub axis: AxisConfig,
    pub keyboard: KeyboardConfig,
    pub publish: PublishConfig,
    pub mqtt: MqttConfig,
    pub drive: DriveSettings,
}

impl BonnetConfig {
    /// `$JOYBONNET_CONFIG`, otherwise `<config dir>/joybonnet/config.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        Ok(path)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| io_error(path, e))?;
        let config = Self::from_toml(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Write the default configuration to `path` unless a file is already there
    ///
    /// Returns whether a file was written.
    pub async fn ensure_default_config(path: &Path) -> Result<bool, ConfigError> {
        if tokio::fs::try_exists(path)
            .await
            .map_err(|e| io_error(path, e))?
        {
            debug!("Configuration file {} exists", path.display());
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }
        tokio::fs::write(path, Self::default().to_toml()?)
            .await
            .map_err(|e| io_error(path, e))?;
        info!("Wrote default configuration to {}", path.display());
        Ok(true)
    }

    pub async fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        Self::ensure_default_config(path).await?;
        Self::load(path).await
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (pin, button) in self.gpio.pins.entries() {
            if pin >= SYNTHETIC_BASE || u8::try_from(pin).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "pin {} of button {} is not a GPIO number",
                    pin, button
                )));
            }
            if !seen.insert(pin) {
                return Err(ConfigError::Invalid(format!(
                    "pin {} is assigned to more than one button",
                    pin
                )));
            }
        }

        for channel in [self.axis.x_channel, self.axis.y_channel] {
            AdcChannel::try_from(channel).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        if self.axis.x_channel == self.axis.y_channel {
            return Err(ConfigError::Invalid(format!(
                "x and y axis share ADC channel {}",
                self.axis.x_channel
            )));
        }
        // Opposite directions of one axis must never both be latched
        if self.axis.activate_threshold <= 0 {
            return Err(ConfigError::Invalid(format!(
                "activation threshold {} must be positive",
                self.axis.activate_threshold
            )));
        }
        if self.axis.release_threshold < 0 {
            return Err(ConfigError::Invalid(format!(
                "release threshold {} must not be negative",
                self.axis.release_threshold
            )));
        }
        if self.axis.release_threshold > self.axis.activate_threshold {
            return Err(ConfigError::Invalid(format!(
                "release threshold {} above activation threshold {}",
                self.axis.release_threshold, self.axis.activate_threshold
            )));
        }

        for (name, value) in [
            ("axis.poll_interval_ms", self.axis.poll_interval_ms),
            ("publish.interval_ms", self.publish.interval_ms),
            ("adc.conversion_timeout_ms", self.adc.conversion_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must not be zero", name)));
            }
        }
        if self.mqtt.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "mqtt.queue_capacity must not be zero".to_string(),
            ));
        }
        if self.publish.topic.is_empty() {
            return Err(ConfigError::Invalid("publish.topic is empty".to_string()));
        }
        Ok(())
    }

    /// Physical pins from the file plus the four analog directions
    pub fn pin_map(&self) -> Result<PinMap, ConfigError> {
        let mut pins = PinMap::with_analog_directions();
        for (pin, button) in self.gpio.pins.entries() {
            let pin = u8::try_from(pin).map_err(|e| ConfigError::Invalid(e.to_string()))?;
            pins.bind_gpio(pin, button)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(pins)
    }

    pub fn edge_settings(&self) -> EdgeMonitorSettings {
        EdgeMonitorSettings {
            debounce: Duration::from_millis(self.gpio.debounce_ms),
        }
    }

    pub fn axis_settings(&self) -> Result<AxisSettings, ConfigError> {
        let channel = |index: u8| {
            AdcChannel::try_from(index).map_err(|e| ConfigError::Invalid(e.to_string()))
        };
        Ok(AxisSettings {
            poll_interval: Duration::from_millis(self.axis.poll_interval_ms),
            calibration_center: self.axis.calibration_center,
            activate_threshold: self.axis.activate_threshold,
            release_threshold: self.axis.release_threshold,
            x_channel: channel(self.axis.x_channel)?,
            y_channel: channel(self.axis.y_channel)?,
            invert_y: self.axis.invert_y,
        })
    }

    pub fn conversion_timeout(&self) -> Duration {
        Duration::from_millis(self.adc.conversion_timeout_ms)
    }

    pub fn publish_settings(&self) -> PublishSettings {
        PublishSettings {
            interval: Duration::from_millis(self.publish.interval_ms),
            topic: self.publish.topic.clone(),
        }
    }
}

fn io_error(path: &Path, e: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::facade::SteeringDerivation;
    use crate::controller::pin_map::PinId;

    #[test]
    fn defaults_match_the_bonnet_wiring() {
        let config = BonnetConfig::default();
        config.validate().unwrap();

        let pins = config.pin_map().unwrap();
        assert_eq!(pins.button_for(PinId::gpio(12)), Some(LogicalButton::A));
        assert_eq!(pins.button_for(PinId::gpio(22)), Some(LogicalButton::Player2));
        assert_eq!(pins.button_for(PinId::ANALOG_RIGHT), Some(LogicalButton::Right));
        assert_eq!(pins.len(), 12);

        assert_eq!(config.adc.address, 0x48);
        assert_eq!(config.edge_settings().debounce, Duration::from_millis(10));
        assert_eq!(config.publish_settings().interval, Duration::from_secs(1));
        assert_eq!(config.publish.topic, "real/agent/loader/joystick/json");
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let config = BonnetConfig::from_toml(
            r#"
            [axis]
            activate_threshold = 500
            release_threshold = 400

            [drive]
            steering = "literal"
            throttle_scale = 0.5
            "#,
        )
        .unwrap();

        let axis = config.axis_settings().unwrap();
        assert_eq!(axis.activate_threshold, 500);
        assert_eq!(axis.release_threshold, 400);
        assert_eq!(axis.calibration_center, 800);
        assert_eq!(config.drive.steering, SteeringDerivation::Literal);
        assert_eq!(config.drive.throttle_dir, 1.0);
        assert_eq!(config.gpio.pins, ButtonPins::default());
    }

    #[test]
    fn duplicate_pin_is_rejected() {
        let err = BonnetConfig::from_toml("[gpio.pins]\nb = 12\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn synthetic_range_pin_is_rejected() {
        let err = BonnetConfig::from_toml("[gpio.pins]\nstart = 1001\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn axis_channels_are_checked() {
        assert!(matches!(
            BonnetConfig::from_toml("[axis]\nx_channel = 4\n").unwrap_err(),
            ConfigError::Invalid(_)
        ));
        assert!(matches!(
            BonnetConfig::from_toml("[axis]\nx_channel = 0\n").unwrap_err(),
            ConfigError::Invalid(_)
        ));
    }

    #[test]
    fn release_above_activation_is_rejected() {
        let err = BonnetConfig::from_toml("[axis]\nrelease_threshold = 700\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn non_positive_activation_threshold_is_rejected() {
        for activate in [0, -100] {
            let err = BonnetConfig::from_toml(&format!(
                "[axis]\nactivate_threshold = {}\nrelease_threshold = -200\n",
                activate
            ))
            .unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "activate = {}", activate);
        }
    }

    #[test]
    fn negative_release_threshold_is_rejected() {
        let err = BonnetConfig::from_toml("[axis]\nrelease_threshold = -700\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_release_threshold_is_accepted() {
        let config = BonnetConfig::from_toml("[axis]\nrelease_threshold = 0\n").unwrap();
        assert_eq!(config.axis_settings().unwrap().release_threshold, 0);
    }

    #[test]
    fn zero_publish_interval_is_rejected() {
        let err = BonnetConfig::from_toml("[publish]\ninterval_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = BonnetConfig::from_toml("[gpio\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[tokio::test]
    async fn default_file_is_written_once_and_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        assert!(BonnetConfig::ensure_default_config(&path).await.unwrap());
        assert!(!BonnetConfig::ensure_default_config(&path).await.unwrap());

        let loaded = BonnetConfig::load(&path).await.unwrap();
        assert_eq!(loaded, BonnetConfig::default());
    }

    #[tokio::test]
    async fn existing_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        tokio::fs::write(&path, "[publish]\ninterval_ms = 250\n")
            .await
            .unwrap();

        let config = BonnetConfig::load_or_create(&path).await.unwrap();
        assert_eq!(config.publish.interval_ms, 250);
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = BonnetConfig::load(&dir.path().join("absent.toml"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
