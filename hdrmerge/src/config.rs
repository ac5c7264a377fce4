//! Configuration for loading, aligning and composing an exposure stack, and
//! for splitting inputs into bracketed sets.
//!
//! Every tuned constant of the merge lives here with its default. All structs
//! deserialize from YAML with missing fields taking their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Pyramid levels searched during alignment.
pub const DEFAULT_SCALE_STEPS: usize = 6;
/// Exclusion band half-width as a fraction of the level threshold.
pub const DEFAULT_EXCLUSION_TOLERANCE: f64 = 1.0 / 16.0;
/// Scale applied to the unsaturated fraction to pick the threshold percentile.
pub const DEFAULT_LIGHT_FRACTION_SCALE: f64 = 0.5;
/// Box radius as a fraction of the requested blur radius.
pub const DEFAULT_BLUR_BOX_SCALE: f64 = 0.39;
pub const DEFAULT_FEATHER_RADIUS: usize = 3;

// =============================================================================
// Alignment
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlignConfig {
    /// Number of pyramid levels. Level `s` is downsampled by `2^(s+1)`, so the
    /// search reaches displacements up to `2^(scale_steps+1) - 2` pixels.
    pub scale_steps: usize,
    /// Half-width of the exclusion band relative to the level threshold.
    pub exclusion_tolerance: f64,
    /// The threshold percentile is this fraction of the unsaturated share.
    pub light_fraction_scale: f64,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            scale_steps: DEFAULT_SCALE_STEPS,
            exclusion_tolerance: DEFAULT_EXCLUSION_TOLERANCE,
            light_fraction_scale: DEFAULT_LIGHT_FRACTION_SCALE,
        }
    }
}

impl AlignConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=14).contains(&self.scale_steps) {
            return Err(ConfigError::invalid(format!(
                "scale_steps must be in [1, 14], got {}",
                self.scale_steps
            )));
        }
        if !(0.0..1.0).contains(&self.exclusion_tolerance) {
            return Err(ConfigError::invalid(format!(
                "exclusion_tolerance must be in [0, 1), got {}",
                self.exclusion_tolerance
            )));
        }
        if !(self.light_fraction_scale > 0.0 && self.light_fraction_scale <= 1.0) {
            return Err(ConfigError::invalid(format!(
                "light_fraction_scale must be in (0, 1], got {}",
                self.light_fraction_scale
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Response functions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResponseConfig {
    /// Samples up to this fraction of the saturation threshold use the linear
    /// scale; higher samples go through the fitted curve.
    pub linear_limit_fraction: f64,
    /// Only values at or above this fraction of the exposure maximum feed the fit.
    pub top_fraction: f64,
    /// Minimum pixels in a value bin for it to become a fit point.
    pub min_bin_count: u32,
    /// The curve is fitted when there are at least `max / fit_points_divisor`
    /// points; otherwise a single scale factor is estimated.
    pub fit_points_divisor: u32,
    /// Upper bound on the number of curve knots.
    pub curve_knots: usize,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            linear_limit_fraction: 0.9,
            top_fraction: 0.75,
            min_bin_count: 3,
            fit_points_divisor: 8,
            curve_knots: 64,
        }
    }
}

impl ResponseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.linear_limit_fraction > 0.0 && self.linear_limit_fraction <= 1.0) {
            return Err(ConfigError::invalid(format!(
                "linear_limit_fraction must be in (0, 1], got {}",
                self.linear_limit_fraction
            )));
        }
        if !(0.0..1.0).contains(&self.top_fraction) {
            return Err(ConfigError::invalid(format!(
                "top_fraction must be in [0, 1), got {}",
                self.top_fraction
            )));
        }
        if self.fit_points_divisor == 0 {
            return Err(ConfigError::invalid("fit_points_divisor must be positive"));
        }
        if self.curve_knots < 2 {
            return Err(ConfigError::invalid(format!(
                "curve_knots must be at least 2, got {}",
                self.curve_knots
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Saturation
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SaturationConfig {
    /// Applied to the detected level unless a custom white level is given.
    pub margin: f64,
    /// Values occurring in at most this fraction of pixels are ignored when
    /// searching for the sensor clipping level.
    pub outlier_fraction: f64,
}

impl Default for SaturationConfig {
    fn default() -> Self {
        Self {
            margin: 0.99,
            outlier_fraction: 1.0 / 10_000.0,
        }
    }
}

impl SaturationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.margin > 0.0 && self.margin <= 1.0) {
            return Err(ConfigError::invalid(format!(
                "saturation margin must be in (0, 1], got {}",
                self.margin
            )));
        }
        if !(0.0..1.0).contains(&self.outlier_fraction) {
            return Err(ConfigError::invalid(format!(
                "outlier_fraction must be in [0, 1), got {}",
                self.outlier_fraction
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Load and compose
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadConfig {
    pub align: bool,
    /// Crop the stack to the intersection of all aligned exposures.
    pub crop: bool,
    /// Custom white level bounding the saturation search; used without margin.
    pub white_level: Option<u16>,
    /// Raw files decoded at the same time.
    pub max_parallel_decodes: usize,
    pub alignment: AlignConfig,
    pub response: ResponseConfig,
    pub saturation: SaturationConfig,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            align: true,
            crop: true,
            white_level: None,
            max_parallel_decodes: 4,
            alignment: AlignConfig::default(),
            response: ResponseConfig::default(),
            saturation: SaturationConfig::default(),
        }
    }
}

impl LoadConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallel_decodes == 0 {
            return Err(ConfigError::invalid("max_parallel_decodes must be positive"));
        }
        if self.white_level == Some(0) {
            return Err(ConfigError::invalid("white_level must be positive"));
        }
        self.alignment.validate()?;
        self.response.validate()?;
        self.saturation.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComposeConfig {
    /// Radius in pixels of the cross-fade between layers.
    pub feather_radius: usize,
    pub blur_box_scale: f64,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            feather_radius: DEFAULT_FEATHER_RADIUS,
            blur_box_scale: DEFAULT_BLUR_BOX_SCALE,
        }
    }
}

impl ComposeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.blur_box_scale > 0.0 && self.blur_box_scale <= 1.0) {
            return Err(ConfigError::invalid(format!(
                "blur_box_scale must be in (0, 1], got {}",
                self.blur_box_scale
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Batch
// =============================================================================

/// How the input files are split into bracketed sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Grouping {
    /// All inputs form one set.
    #[default]
    All,
    /// Sets are split where the capture times leave a gap.
    Auto,
    /// Sets of a fixed number of files, in input order.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    pub grouping: Grouping,
    /// Files per set with [`Grouping::Manual`].
    pub bracket_size: usize,
    /// Largest gap in seconds between adjacent captures of one set.
    pub gap_seconds: f64,
    /// Merge sets of a single file instead of skipping them.
    pub include_singles: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            grouping: Grouping::All,
            bracket_size: 3,
            gap_seconds: 3.0,
            include_singles: false,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bracket_size == 0 {
            return Err(ConfigError::invalid("bracket_size must be positive"));
        }
        if !(self.gap_seconds.is_finite() && self.gap_seconds >= 0.0) {
            return Err(ConfigError::invalid(format!(
                "gap_seconds must be a non-negative number, got {}",
                self.gap_seconds
            )));
        }
        Ok(())
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    pub load: LoadConfig,
    pub compose: ComposeConfig,
    pub batch: BatchConfig,
}

impl MergeConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.load.validate()?;
        self.compose.validate()?;
        self.batch.validate()
    }
}
