//! Multi-scale median threshold bitmap registration.

use std::borrow::Cow;

use common::parallel::ParRowsMutAuto;
use common::Buffer2;
use rayon::prelude::*;

use super::Exposure;
use crate::bit_grid::BitGrid;
use crate::config::AlignConfig;
use crate::histogram::Histogram;

/// Displacement of an exposure relative to a reference exposure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Alignment {
    pub dx: i32,
    pub dy: i32,
    /// Sum over pyramid levels of the mismatched bit count at the chosen offset.
    pub error: u64,
}

/// Level `s` has dimensions `(w >> (s + 1), h >> (s + 1))` and averages 2x2
/// blocks of the level above it.
pub(super) fn build_pyramid(samples: &Buffer2<u16>, levels: usize) -> Vec<Buffer2<u16>> {
    let mut pyramid: Vec<Buffer2<u16>> = Vec::with_capacity(levels);
    for _ in 0..levels {
        let level = downsample(pyramid.last().unwrap_or(samples));
        pyramid.push(level);
    }
    pyramid
}

fn downsample(src: &Buffer2<u16>) -> Buffer2<u16> {
    let (width, height) = (src.width() / 2, src.height() / 2);
    let mut dst = Buffer2::new_default(width, height);
    if dst.is_empty() {
        return dst;
    }

    dst.pixels_mut()
        .par_rows_mut_auto(width)
        .for_each(|(start_row, chunk)| {
            for (local_y, out) in chunk.chunks_exact_mut(width).enumerate() {
                let y = start_row + local_y;
                let top = src.row(2 * y);
                let bottom = src.row(2 * y + 1);
                for (x, o) in out.iter_mut().enumerate() {
                    let sum = u32::from(top[2 * x])
                        + u32::from(top[2 * x + 1])
                        + u32::from(bottom[2 * x])
                        + u32::from(bottom[2 * x + 1]);
                    *o = (sum >> 2) as u16;
                }
            }
        });
    dst
}

/// Threshold bitmaps of one pyramid level.
struct LevelMaps {
    mtb: BitGrid,
    exclusion: BitGrid,
}

impl LevelMaps {
    fn new(level: &Buffer2<u16>, light_fraction: f64, tolerance: f64) -> Self {
        let histogram = Histogram::from_samples(level.pixels());
        let threshold = histogram.percentile(light_fraction);
        let tolerance = (f64::from(threshold) * tolerance).floor() as u16;
        let (w, h) = (level.width(), level.height());
        Self {
            mtb: BitGrid::median_threshold_map(level.pixels(), w, h, threshold),
            exclusion: BitGrid::exclusion_band(level.pixels(), w, h, threshold, tolerance),
        }
    }
}

impl Exposure {
    /// Estimates the displacement of this exposure relative to `reference`
    /// without modifying either.
    ///
    /// Pyramids built with [`Exposure::build_pyramid`] are reused; missing
    /// ones are built for the duration of the call.
    pub fn estimate_displacement(&self, reference: &Exposure, config: &AlignConfig) -> Alignment {
        let steps = config.scale_steps;
        let own = self.pyramid_levels(steps);
        let other = reference.pyramid_levels(steps);

        let half_light = Histogram::from_samples(self.samples.pixels())
            .fraction_at_or_below(self.saturation)
            * config.light_fraction_scale;

        let (mut dx, mut dy) = (0i32, 0i32);
        let mut total_error = 0u64;

        for s in (0..steps).rev() {
            let (level, ref_level) = (&own[s], &other[s]);
            let reference_maps =
                LevelMaps::new(ref_level, half_light, config.exclusion_tolerance);
            let maps = LevelMaps::new(level, half_light, config.exclusion_tolerance);

            let (width, height) = (level.width(), level.height());
            let mut shifted_mtb = BitGrid::new(width, height);
            let mut shifted_exclusion = BitGrid::new(width, height);
            let mut min_error = width * height;
            let (base_dx, base_dy) = (dx, dy);

            for i in -1..=1 {
                for j in -1..=1 {
                    let (cx, cy) = (base_dx + i, base_dy + j);
                    shifted_mtb.shift_from(&maps.mtb, cx, cy);
                    shifted_exclusion.shift_from(&maps.exclusion, cx, cy);
                    shifted_mtb ^= &reference_maps.mtb;
                    shifted_mtb &= &reference_maps.exclusion;
                    shifted_mtb &= &shifted_exclusion;
                    let error = shifted_mtb.count();
                    if error < min_error {
                        dx = cx;
                        dy = cy;
                        min_error = error;
                    }
                }
            }

            tracing::debug!(
                level = s,
                width,
                height,
                dx,
                dy,
                error = min_error,
                "Alignment level"
            );
            dx <<= 1;
            dy <<= 1;
            total_error += min_error as u64;
        }

        Alignment {
            dx,
            dy,
            error: total_error,
        }
    }

    /// Aligns this exposure to `reference` and stores the result as this
    /// exposure's displacement, relative to the reference's own displacement.
    ///
    /// Returns the summed alignment error.
    pub fn align_with(&mut self, reference: &Exposure, config: &AlignConfig) -> u64 {
        let alignment = self.estimate_displacement(reference, config);
        let (rdx, rdy) = reference.displacement();
        self.set_displacement(rdx + alignment.dx, rdy + alignment.dy);
        alignment.error
    }

    fn pyramid_levels(&self, levels: usize) -> Cow<'_, [Buffer2<u16>]> {
        if self.pyramid.len() >= levels {
            Cow::Borrowed(&self.pyramid[..levels])
        } else {
            Cow::Owned(build_pyramid(&self.samples, levels))
        }
    }
}
