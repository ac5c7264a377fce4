//! Error types for loading, configuring and writing merges.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort loading an exposure stack. No partial stack is kept.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("No input files provided")]
    NoInputs,

    #[error("Failed to decode raw file '{path}': {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Raw file '{path}' has a different format than '{reference}'")]
    FormatMismatch { path: PathBuf, reference: PathBuf },

    #[error("Invalid load configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Errors writing merge results.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to create output file '{path}': {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to encode TIFF '{path}': {source}")]
    Tiff {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },

    #[error("Failed to write mask image '{path}': {source}")]
    Mask {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Errors reading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[source] serde_yml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ConfigError::Invalid(message.into())
    }
}
