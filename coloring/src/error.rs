//! Error types for palette and coloring configuration.
//!
//! The per-element coloring routines themselves cannot fail; mismatched
//! buffer lengths are programming errors and panic. `ColoringError` covers
//! building palettes, looking them up, and loading mapping configuration.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ColoringError {
    /// Palette control points are missing or out of range
    #[error("Invalid palette '{name}': {message}")]
    InvalidPalette { name: String, message: String },

    #[error("Unknown palette '{name}'")]
    UnknownPalette { name: String },

    /// Mapping configuration values are inconsistent
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ColoringError {
    pub fn invalid_palette(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPalette {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn unknown_palette(name: impl Into<String>) -> Self {
        Self::UnknownPalette { name: name.into() }
    }

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ColoringError>;
