//! A single exposure of the stack.
//!
//! Samples are black-subtracted sensor values of the visible area. The buffer
//! origin is the exposure's displacement in the stack's logical coordinates,
//! set by alignment and moved by cropping.

mod align;
mod response;


use common::Buffer2;

use crate::raw::RawFrame;

pub use align::Alignment;
pub use response::ResponseFunction;

#[derive(Debug, Clone)]
pub struct Exposure {
    samples: Buffer2<u16>,
    /// Largest raw sample before black subtraction.
    max: u16,
    /// Mean raw sample before black subtraction. Only used for ordering.
    brightness: f64,
    saturation: u16,
    response: ResponseFunction,
    /// Downsampled levels used by alignment; empty outside of it.
    pyramid: Vec<Buffer2<u16>>,
}

impl Exposure {
    /// Exposure over already black-subtracted samples with a unit response.
    pub fn new(samples: Buffer2<u16>) -> Self {
        let max = samples.iter().copied().max().unwrap_or(0);
        let brightness = mean(samples.pixels());
        Self {
            samples,
            max,
            brightness,
            saturation: u16::MAX,
            response: ResponseFunction::linear(1.0),
            pyramid: Vec::new(),
        }
    }

    /// Extracts the visible area of a raw frame and subtracts its black levels.
    ///
    /// The initial response maps the white level to 65535.
    pub fn from_raw(frame: &RawFrame) -> Self {
        let params = &frame.params;
        let width = params.width;
        let mut samples = Buffer2::new_default(width, params.height);
        for y in 0..params.height {
            let start = (y + params.top_margin) * params.raw_width + params.left_margin;
            samples.pixels_mut()[y * width..(y + 1) * width]
                .copy_from_slice(&frame.samples[start..start + width]);
        }

        let max = samples.iter().copied().max().unwrap_or(0);
        let brightness = mean(samples.pixels());

        if params.has_black() {
            for (i, v) in samples.pixels_mut().iter_mut().enumerate() {
                let (x, y) = ((i % width) as i64, (i / width) as i64);
                *v = v.saturating_sub(params.black_at(x, y));
            }
        }

        let slope = if params.max == 0 {
            1.0
        } else {
            65535.0 / f64::from(params.max)
        };
        Self {
            samples,
            max,
            brightness,
            saturation: u16::MAX,
            response: ResponseFunction::linear(slope),
            pyramid: Vec::new(),
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.samples.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.samples.height()
    }

    #[inline]
    pub fn samples(&self) -> &Buffer2<u16> {
        &self.samples
    }

    #[inline]
    pub fn max(&self) -> u16 {
        self.max
    }

    #[inline]
    pub fn brightness(&self) -> f64 {
        self.brightness
    }

    // ========================================================================
    // Displacement
    // ========================================================================

    #[inline]
    pub fn displacement(&self) -> (i32, i32) {
        self.samples.displacement()
    }

    #[inline]
    pub fn set_displacement(&mut self, dx: i32, dy: i32) {
        self.samples.set_displacement(dx, dy);
    }

    #[inline]
    pub fn displace(&mut self, dx: i32, dy: i32) {
        self.samples.displace(dx, dy);
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.samples.contains(x, y)
    }

    /// Sample at logical `(x, y)`, which must be inside the footprint.
    #[inline]
    pub fn sample_at(&self, x: i32, y: i32) -> u16 {
        *self.samples.at(x, y)
    }

    // ========================================================================
    // Saturation
    // ========================================================================

    #[inline]
    pub fn saturation(&self) -> u16 {
        self.saturation
    }

    /// Sets the saturation threshold; the linear part of the response ends at
    /// `linear_limit_fraction * saturation`, rounded down to a raw value.
    pub fn set_saturation_threshold(&mut self, saturation: u16, linear_limit_fraction: f64) {
        self.saturation = saturation;
        self.response
            .set_threshold((linear_limit_fraction * f64::from(saturation)).floor());
    }

    #[inline]
    pub fn is_saturated(&self, value: u16) -> bool {
        value >= self.saturation
    }

    /// Maximum over the 3x3 neighbourhood of logical `(x, y)`, clipped to the
    /// footprint.
    pub fn max_around(&self, x: i32, y: i32) -> u16 {
        let mut result = 0;
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                if self.samples.contains(nx, ny) {
                    result = result.max(*self.samples.at(nx, ny));
                }
            }
        }
        result
    }

    #[inline]
    pub fn is_saturated_around(&self, x: i32, y: i32) -> bool {
        self.is_saturated(self.max_around(x, y))
    }

    // ========================================================================
    // Response
    // ========================================================================

    #[inline]
    pub fn response(&self) -> &ResponseFunction {
        &self.response
    }

    /// Linear scale of this exposure relative to the darkest one.
    #[inline]
    pub fn relative_exposure(&self) -> f64 {
        self.response.linear_slope()
    }

    /// Sample at logical `(x, y)` mapped to the common exposure scale.
    #[inline]
    pub fn exposure_at(&self, x: i32, y: i32) -> f64 {
        self.response.apply(self.sample_at(x, y))
    }

    // ========================================================================
    // Alignment data
    // ========================================================================

    /// Builds `levels` downsampled copies; level `s` is `(w, h) >> (s + 1)`.
    pub fn build_pyramid(&mut self, levels: usize) {
        self.pyramid = align::build_pyramid(&self.samples, levels);
    }

    #[inline]
    pub fn has_pyramid(&self) -> bool {
        !self.pyramid.is_empty()
    }

    pub fn release_align_data(&mut self) {
        self.pyramid = Vec::new();
    }
}

/// Mean of the samples, 0 for an empty slice.
fn mean(samples: &[u16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: u64 = samples.iter().map(|&v| u64::from(v)).sum();
    sum as f64 / samples.len() as f64
}
