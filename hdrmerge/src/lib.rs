//! hdrmerge - Merges bracketed raw exposures into one high dynamic range raw.
//!
//! The exposures of a bracketed series are aligned, cross-calibrated and
//! blended at the sensor level, before demosaicing:
//! - Alignment with median threshold bitmaps over an image pyramid
//! - Per-exposure response functions fitted against the next darker exposure
//! - A layer mask choosing the brightest unsaturated exposure per pixel,
//!   editable with undo and redo
//! - Feathered composition into a 32-bit float raster at raw dimensions
//! - Batch mode splitting many inputs into bracketed sets by count or capture time
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use hdrmerge::{load_stack, write_float_tiff, MergeConfig, RawloaderDecoder};
//!
//! let config = MergeConfig::default();
//! let paths = vec!["IMG_0001.CR2".into(), "IMG_0002.CR2".into()];
//! let loaded = load_stack(&paths, &RawloaderDecoder, &config.load, &None)?;
//! let merged = loaded.compose(&config.compose, &None);
//! write_float_tiff("merged.tif".as_ref(), &merged.raster)?;
//! ```

pub mod batch;
pub mod bit_grid;
pub mod blur;
pub mod config;
pub mod editable_mask;
pub mod error;
pub mod exposure;
pub mod histogram;
pub mod mask_dilation;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod raw;
pub mod stack;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Pipeline
// ============================================================================

pub use batch::{bracketed_sets, keeps_set};
pub use pipeline::{load_stack, LoadedStack, MergedImage};
pub use progress::{MergeProgress, MergeStage, ProgressCallback};

// ============================================================================
// Core types
// ============================================================================

pub use bit_grid::BitGrid;
pub use editable_mask::{EditableMask, Rect};
pub use exposure::{Alignment, Exposure, ResponseFunction};
pub use raw::{CfaPattern, RawDecoder, RawFrame, RawParameters, RawloaderDecoder};
pub use stack::{ExposureStack, MAX_EXPOSURES};

// ============================================================================
// Configuration, errors and output
// ============================================================================

pub use config::{
    AlignConfig, BatchConfig, ComposeConfig, Grouping, LoadConfig, MergeConfig, ResponseConfig,
    SaturationConfig,
};
pub use error::{ConfigError, LoadError, OutputError};
pub use output::{write_float_tiff, write_mask_png};
