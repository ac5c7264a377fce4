//! Raw sensor data and camera parameters consumed by the merge.
//!
//! Decoding itself is delegated to a [`RawDecoder`]; the default
//! implementation wraps the pure-Rust `rawloader` crate.

use std::path::Path;
use std::time::SystemTime;

mod cfa;
mod decoder;
mod params;

pub use cfa::CfaPattern;
pub use decoder::RawloaderDecoder;
pub use params::RawParameters;

/// One decoded raw file: the full sensor buffer and its parameters.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub params: RawParameters,
    /// `raw_width * raw_height` samples, row-major.
    pub samples: Vec<u16>,
}

impl RawFrame {
    pub fn new(params: RawParameters, samples: Vec<u16>) -> Self {
        assert_eq!(
            samples.len(),
            params.raw_width * params.raw_height,
            "raw sample count must equal raw_width * raw_height"
        );
        Self { params, samples }
    }
}

/// Source of raw frames.
pub trait RawDecoder: Sync {
    fn decode(&self, path: &Path) -> anyhow::Result<RawFrame>;

    /// When `path` was captured, if known. Defaults to the file's
    /// modification time, which cameras set when writing the file.
    fn capture_time(&self, path: &Path) -> Option<SystemTime> {
        std::fs::metadata(path).and_then(|m| m.modified()).ok()
    }
}
