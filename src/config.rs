//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every field has a default matching the supported vehicle, so an empty
//! file (or no file at all) yields a working configuration.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::can::driver::{FrameFilter, DEFAULT_BITRATE, SUPPORTED_BITRATES};
use crate::can::socket::DEFAULT_INTERFACE;
use crate::decoder::dispatch::Dispatcher;
use crate::decoder::signals::{default_decoders, SignalDecoder};
use crate::error::{JoystickError, Result};
use crate::uinput::device::UINPUT_MAX_NAME_SIZE;

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "CAN_JOYSTICK_CONFIG";

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub can: CanConfig,

    #[serde(default = "default_decoders")]
    pub decoders: Vec<SignalDecoder>,
}

/// Virtual device identity
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    #[serde(default = "default_device_name")]
    pub name: String,

    #[serde(default = "default_id_component")]
    pub vendor: u16,

    #[serde(default = "default_id_component")]
    pub product: u16,

    #[serde(default = "default_id_component")]
    pub version: u16,
}

/// CAN bus configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct CanConfig {
    #[serde(default = "default_interface")]
    pub interface: String,

    #[serde(default)]
    pub device_id: u32,

    #[serde(default)]
    pub bus_id: u32,

    #[serde(default = "default_bitrate")]
    pub bitrate: u32,

    #[serde(default)]
    pub filters: Vec<FrameFilter>,
}

// Default value functions
fn default_device_name() -> String { "Cadillac ELR".to_string() }
fn default_id_component() -> u16 { 1 }

fn default_interface() -> String { DEFAULT_INTERFACE.to_string() }
fn default_bitrate() -> u32 { DEFAULT_BITRATE }

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: default_device_name(),
            vendor: default_id_component(),
            product: default_id_component(),
            version: default_id_component(),
        }
    }
}

impl Default for CanConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            device_id: 0,
            bus_id: 0,
            bitrate: default_bitrate(),
            filters: Vec::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            can: CanConfig::default(),
            decoders: default_decoders(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use can_joystick::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the file named by `CAN_JOYSTICK_CONFIG`, or use defaults.
    ///
    /// Returns the path that was loaded, if any.
    pub fn from_env() -> Result<(Self, Option<String>)> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.is_empty() => Ok((Self::load(&path)?, Some(path))),
            _ => Ok((Self::default(), None)),
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Validate device identity
        if self.device.name.is_empty() {
            return Err(JoystickError::InvalidConfig(
                "device name cannot be empty".to_string(),
            ));
        }

        if self.device.name.len() >= UINPUT_MAX_NAME_SIZE {
            return Err(JoystickError::InvalidConfig(format!(
                "device name must be shorter than {} bytes",
                UINPUT_MAX_NAME_SIZE
            )));
        }

        if self.device.name.contains('\0') {
            return Err(JoystickError::InvalidConfig(
                "device name cannot contain NUL".to_string(),
            ));
        }

        // Validate CAN bus
        if self.can.interface.is_empty() {
            return Err(JoystickError::InvalidConfig(
                "CAN interface cannot be empty".to_string(),
            ));
        }

        if !SUPPORTED_BITRATES.contains(&self.can.bitrate) {
            return Err(JoystickError::InvalidConfig(format!(
                "bitrate must be one of: {:?}",
                SUPPORTED_BITRATES
            )));
        }

        for filter in &self.can.filters {
            if filter.mask == 0 {
                return Err(JoystickError::InvalidConfig(format!(
                    "filter for id 0x{:X} has an empty mask",
                    filter.id
                )));
            }
        }

        // Validate decoder table
        if self.decoders.is_empty() {
            return Err(JoystickError::InvalidConfig(
                "at least one decoder is required".to_string(),
            ));
        }

        // Per-decoder checks and identifier uniqueness
        Dispatcher::new(self.decoders.clone())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::signals::{brake, Extractor};
    use crate::decoder::Axis;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.device.name, "Cadillac ELR");
        assert_eq!(
            (config.device.vendor, config.device.product, config.device.version),
            (1, 1, 1)
        );
        assert_eq!(config.can.interface, "can0");
        assert_eq!(config.can.bitrate, 500_000);
        assert!(config.can.filters.is_empty());
        assert_eq!(config.decoders.len(), 4);
    }

    #[test]
    fn test_empty_toml_equals_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[device]
name = "Test Wheel"
vendor = 0x1234

[can]
interface = "vcan0"
filters = [{ id = 0x1a1, mask = 0x7ff }]
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.device.name, "Test Wheel");
        assert_eq!(config.device.vendor, 0x1234);
        assert_eq!(config.device.product, 1);
        assert_eq!(config.can.interface, "vcan0");
        assert_eq!(config.can.filters, vec![FrameFilter { id: 0x1a1, mask: 0x7ff }]);
        assert_eq!(config.decoders, default_decoders());
    }

    #[test]
    fn test_shipped_default_file_matches_builtin() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/can-joystick.toml");
        assert!(matches!(result, Err(JoystickError::Io(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::from_toml("[device\nname = ");
        assert!(matches!(result, Err(JoystickError::Config(_))));
    }

    #[test]
    fn test_custom_decoder_table() {
        let toml_content = r#"
[[decoders]]
name = "brake"
can_id = 0x0f1
dlc = 6
malformed = "Malformed brake position"
extract = { kind = "unsigned8", byte = 1, axis = "brake" }
"#;
        let config = Config::from_toml(toml_content).unwrap();
        assert_eq!(config.decoders, vec![brake()]);
    }

    #[test]
    fn test_unknown_extractor_kind() {
        let toml_content = r#"
[[decoders]]
name = "x"
can_id = 0x100
dlc = 2
malformed = "bad"
extract = { kind = "float32", byte = 0, axis = "gas" }
"#;
        assert!(matches!(Config::from_toml(toml_content), Err(JoystickError::Config(_))));
    }

    fn create_valid_config() -> Config {
        Config::default()
    }

    #[test]
    fn test_empty_device_name() {
        let mut config = create_valid_config();
        config.device.name = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_device_name_too_long() {
        let mut config = create_valid_config();
        config.device.name = "x".repeat(80);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_device_name_max_length() {
        let mut config = create_valid_config();
        config.device.name = "x".repeat(79);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_device_name_with_nul() {
        let mut config = create_valid_config();
        config.device.name = "Cadillac\0ELR".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_interface() {
        let mut config = create_valid_config();
        config.can.interface = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_bitrate() {
        let mut config = create_valid_config();
        config.can.bitrate = 33_333;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_bitrates() {
        for &bitrate in SUPPORTED_BITRATES {
            let mut config = create_valid_config();
            config.can.bitrate = bitrate;
            assert!(config.validate().is_ok(), "Bitrate {} should be valid", bitrate);
        }
    }

    #[test]
    fn test_filter_with_empty_mask() {
        let mut config = create_valid_config();
        config.can.filters = vec![FrameFilter { id: 0x1a1, mask: 0 }];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_no_decoders() {
        let mut config = create_valid_config();
        config.decoders.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_decoder_ids() {
        let mut config = create_valid_config();
        let mut copy = brake();
        copy.name = "brake_copy".to_string();
        config.decoders.push(copy);

        match config.validate().unwrap_err() {
            JoystickError::InvalidConfig(msg) => {
                assert!(msg.contains("'brake' and 'brake_copy'"), "got: {}", msg)
            }
            other => panic!("Expected InvalidConfig error, got: {:?}", other),
        }
    }

    #[test]
    fn test_extended_decoder_from_toml() {
        let toml_content = r#"
[[decoders]]
name = "brake"
can_id = 0x0f1
dlc = 6
malformed = "Malformed brake position"
extract = { kind = "unsigned8", byte = 1, axis = "brake" }

[[decoders]]
name = "brake_ext"
can_id = 0x0f1
extended = true
dlc = 6
malformed = "Malformed brake position"
extract = { kind = "unsigned8", byte = 1, axis = "brake" }
"#;
        let config = Config::from_toml(toml_content).unwrap();
        assert!(!config.decoders[0].extended);
        assert!(config.decoders[1].extended);
    }

    #[test]
    fn test_standard_decoder_id_over_11_bits() {
        let mut config = create_valid_config();
        config.decoders[0].can_id = 0x18fe_f100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_decoder() {
        let mut config = create_valid_config();
        config.decoders[0].extract = Extractor::Unsigned8 { byte: 7, axis: Axis::Gas };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_device_name(), "Cadillac ELR");
        assert_eq!(default_id_component(), 1);
        assert_eq!(default_interface(), "can0");
        assert_eq!(default_bitrate(), 500_000);
        assert_eq!(CONFIG_ENV_VAR, "CAN_JOYSTICK_CONFIG");
    }
}
