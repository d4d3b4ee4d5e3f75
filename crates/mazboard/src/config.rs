//! Configuration file support for mazboard
//!
//! Configuration is stored in TOML format at:
//! - Linux: `~/.config/mazboard/config.toml`
//!
//! Only the device selection and MIDI output are configurable. The key to
//! note table is fixed (see [`crate::keymap`]).

use crate::device::{DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID};
use crate::error::{Error, Result};
use crate::keymap::DEFAULT_VELOCITY;
use crate::midi::MidiBackend;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which keyboard to read
    pub device: DeviceSettings,
    /// MIDI configuration
    pub midi: MidiSettings,
}

impl Config {
    /// Load configuration from the default config file location
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Err(Error::Config(format!("Config file not found at {:?}", path)))
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration or return default if not found
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(Error::Config(msg)) => {
                log::debug!("{}, using defaults", msg);
                Self::default()
            }
            Err(e) => {
                log::warn!("Ignoring unreadable config: {}", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the default config file location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = ProjectDirs::from("", "", "mazboard") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            Err(Error::Config("Could not determine config directory".to_string()))
        }
    }

    /// Create a default config file with comments
    pub fn create_default_config_file() -> Result<PathBuf> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, DEFAULT_CONFIG)?;
        Ok(path)
    }
}

const DEFAULT_CONFIG: &str = r#"# mazboard configuration file

[device]
# USB ids of the keyboard to turn into a MIDI controller
vendor_id = 0x258a
product_id = 0x0026

# Open this event node instead of searching by id (optional)
# path = "/dev/input/event3"

[midi]
# Output backend: "alsa" (virtual port), "jack" or "none"
backend = "alsa"

# Client and port name other applications see
client_name = "mazboard"
port_name = "MazboardPrototype"

# MIDI channel (0-15)
channel = 0

# Note-on velocity (1-127)
velocity = 64
"#;

/// Device selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// USB vendor id
    pub vendor_id: u16,
    /// USB product id
    pub product_id: u16,
    /// Explicit event node, bypasses the id search
    pub path: Option<PathBuf>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            vendor_id: DEFAULT_VENDOR_ID,
            product_id: DEFAULT_PRODUCT_ID,
            path: None,
        }
    }
}

/// MIDI settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiSettings {
    /// Output backend
    pub backend: MidiBackend,
    /// Client name
    pub client_name: String,
    /// MIDI output port name
    pub port_name: String,
    /// MIDI channel (0-15)
    pub channel: u8,
    /// Note-on velocity (1-127)
    pub velocity: u8,
}

impl Default for MidiSettings {
    fn default() -> Self {
        Self {
            backend: MidiBackend::Alsa,
            client_name: "mazboard".to_string(),
            port_name: "MazboardPrototype".to_string(),
            channel: 0,
            velocity: DEFAULT_VELOCITY,
        }
    }
}
