//! Error types for mazboard

use thiserror::Error;

/// Result type alias for mazboard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in mazboard
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No input device matched the configured vendor/product id
    #[error("Keyboard device not found (vendor {vendor_id:#06x}, product {product_id:#06x})")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },

    /// The OS refused the exclusive grab (typing stays enabled)
    #[error("Error disabling typing: {0}")]
    Grab(#[source] std::io::Error),

    /// The OS refused to release the grab (typing stays disabled)
    #[error("Error enabling typing: {0}")]
    Ungrab(#[source] std::io::Error),

    /// Writing an LED event to the device failed
    #[error("LED error: {0}")]
    Led(#[source] std::io::Error),

    /// MIDI backend error
    #[error("MIDI error: {0}")]
    Midi(String),

    /// JACK connection error
    #[error("JACK error: {0}")]
    Jack(#[from] jack::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}
