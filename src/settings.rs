use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::io::slcan::codec::{find_bitrate_command, MAX_STD_ID};
use crate::io::slcan::framer::DEFAULT_MAX_LINE_LEN;
use crate::io::IoError;
use crate::sensor::{SENSOR_DATA_ID, START_COMMAND_ID, STOP_COMMAND_ID};

/// Session configuration for one sensor on one adapter.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// port = "/dev/ttyACM0"
/// sensor_id = 0x01C
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SensorConfig {
    /// Serial port path (e.g., "/dev/ttyACM0", "COM6")
    #[serde(default = "default_port")]
    pub port: String,
    /// Serial baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// CAN bus bitrate in bits/second
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
    /// Remote frame id that starts measurements
    #[serde(default = "default_start_id")]
    pub start_id: u32,
    /// Remote frame id that stops measurements
    #[serde(default = "default_stop_id")]
    pub stop_id: u32,
    /// Id the sensor publishes measurements on
    #[serde(default = "default_sensor_id")]
    pub sensor_id: u32,
    /// Longest unterminated line kept before a framing error
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,
    /// Serial read timeout; bounds how long the read thread takes to notice shutdown
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Consumer event queue depth
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_port() -> String {
    if cfg!(target_os = "windows") {
        "COM6".to_string()
    } else {
        "/dev/ttyACM0".to_string()
    }
}
fn default_baud_rate() -> u32 {
    1_000_000
}
fn default_bitrate() -> u32 {
    1_000_000 // AFBR-S50 CAN application runs at 1 Mbit/s
}
fn default_start_id() -> u32 {
    START_COMMAND_ID
}
fn default_stop_id() -> u32 {
    STOP_COMMAND_ID
}
fn default_sensor_id() -> u32 {
    SENSOR_DATA_ID
}
fn default_max_line_len() -> usize {
    DEFAULT_MAX_LINE_LEN
}
fn default_read_timeout_ms() -> u64 {
    50
}
fn default_event_capacity() -> usize {
    256
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            bitrate: default_bitrate(),
            start_id: default_start_id(),
            stop_id: default_stop_id(),
            sensor_id: default_sensor_id(),
            max_line_len: default_max_line_len(),
            read_timeout_ms: default_read_timeout_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl SensorConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, IoError> {
        let config: SensorConfig = toml::from_str(content)
            .map_err(|e| IoError::configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file
    pub fn load(path: &Path) -> Result<Self, IoError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IoError::configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load the user config file if one exists, defaults otherwise
    pub fn load_or_default() -> Result<Self, IoError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/tofcan/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tofcan").join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), IoError> {
        for (name, id) in [
            ("start_id", self.start_id),
            ("stop_id", self.stop_id),
            ("sensor_id", self.sensor_id),
        ] {
            if id > MAX_STD_ID {
                return Err(IoError::configuration(format!(
                    "{} 0x{:X} does not fit an 11-bit CAN id",
                    name, id
                )));
            }
        }
        find_bitrate_command(self.bitrate)?;
        if self.max_line_len == 0 {
            return Err(IoError::configuration("max_line_len must be non-zero"));
        }
        if self.event_capacity == 0 {
            return Err(IoError::configuration("event_capacity must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_sensor() {
        let config = SensorConfig::default();
        assert_eq!(config.start_id, 0x08);
        assert_eq!(config.stop_id, 0x09);
        assert_eq!(config.sensor_id, 0x01C);
        assert_eq!(config.bitrate, 1_000_000);
        assert_eq!(config.max_line_len, 512);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = SensorConfig::from_toml_str(
            r#"
            port = "/dev/ttyUSB1"
            sensor_id = 0x01D
            "#,
        )
        .unwrap();
        assert_eq!(config.port, "/dev/ttyUSB1");
        assert_eq!(config.sensor_id, 0x01D);
        assert_eq!(config.start_id, 0x08);
        assert_eq!(config.read_timeout_ms, 50);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(SensorConfig::from_toml_str("").unwrap(), SensorConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(SensorConfig::from_toml_str("sensor_id = 0x800").is_err());
        assert!(SensorConfig::from_toml_str("bitrate = 123456").is_err());
        assert!(SensorConfig::from_toml_str("max_line_len = 0").is_err());
        assert!(SensorConfig::from_toml_str("port = 5").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("tofcan-config-{}.toml", std::process::id()));
        std::fs::write(&path, "bitrate = 500000\nmax_line_len = 128\n").unwrap();
        let config = SensorConfig::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.bitrate, 500_000);
        assert_eq!(config.max_line_len, 128);
    }

    #[test]
    fn test_load_missing_file() {
        let err = SensorConfig::load(Path::new("/nonexistent/tofcan.toml")).unwrap_err();
        assert!(matches!(err, IoError::Configuration(_)));
    }
}
