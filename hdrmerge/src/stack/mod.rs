//! Exposures of one scene, ordered brightest to darkest, and the per-pixel
//! map of which exposure supplies the merged value.
//!
//! All pixel coordinates are logical: after alignment every exposure is
//! displaced into the darkest exposure's frame, and cropping moves the common
//! intersection to the origin.

mod compose;

#[cfg(test)]
mod tests;

use std::time::Instant;

use common::parallel::{par_fold_rows, ParRowsMutAuto};
use common::Buffer2;
use rayon::prelude::*;

use crate::config::{AlignConfig, ResponseConfig, SaturationConfig};
use crate::editable_mask::{EditableMask, Rect};
use crate::exposure::Exposure;
use crate::histogram::Histogram;
use crate::raw::RawParameters;

/// Layers are stored as `u8` mask values.
pub const MAX_EXPOSURES: usize = 256;

#[derive(Debug, Clone, Default)]
pub struct ExposureStack {
    /// Brightest first.
    exposures: Vec<Exposure>,
    width: usize,
    height: usize,
    saturation: u16,
    mask: EditableMask,
    /// Layer map as generated, before any interactive edits.
    original_mask: Buffer2<u8>,
}

impl ExposureStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `exposure` keeping the brightest-first order and returns its
    /// index. The first exposure defines the working area.
    pub fn add(&mut self, exposure: Exposure) -> usize {
        assert!(
            self.exposures.len() < MAX_EXPOSURES,
            "stack holds at most {MAX_EXPOSURES} exposures"
        );
        if self.exposures.is_empty() {
            self.width = exposure.width();
            self.height = exposure.height();
        }
        self.exposures.push(exposure);
        let mut n = self.exposures.len() - 1;
        while n > 0 && self.exposures[n].brightness() > self.exposures[n - 1].brightness() {
            self.exposures.swap(n, n - 1);
            n -= 1;
        }
        n
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.exposures.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.exposures.is_empty()
    }

    #[inline]
    pub fn exposures(&self) -> &[Exposure] {
        &self.exposures
    }

    #[inline]
    pub fn exposure(&self, index: usize) -> &Exposure {
        &self.exposures[index]
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn saturation(&self) -> u16 {
        self.saturation
    }

    /// Whether the working area is smaller than the exposures.
    pub fn is_cropped(&self) -> bool {
        self.exposures
            .first()
            .is_some_and(|e| e.width() != self.width || e.height() != self.height)
    }

    /// Exposure ratio between the brightest and the darkest exposure.
    pub fn max_exposure(&self) -> f64 {
        match (self.exposures.first(), self.exposures.last()) {
            (Some(brightest), Some(darkest)) if brightest.relative_exposure() > 0.0 => {
                darkest.relative_exposure() / brightest.relative_exposure()
            }
            _ => 1.0,
        }
    }

    // ========================================================================
    // Saturation
    // ========================================================================

    /// Finds the level at which the brightest exposure clips and applies it to
    /// every exposure.
    ///
    /// Per CFA plane, the highest value occurring in more than
    /// `outlier_fraction` of the pixels is taken as that plane's clipping
    /// point. The white level caps the result; unless it is a user-provided
    /// level, a small margin is applied below it.
    pub fn calculate_saturation_level(
        &mut self,
        params: &RawParameters,
        custom_white_level: bool,
        config: &SaturationConfig,
        response: &ResponseConfig,
    ) -> u16 {
        let Some(brightest) = self.exposures.first() else {
            return 0;
        };
        let samples = brightest.samples();
        let (width, height) = (samples.width(), samples.height());

        let histograms = par_fold_rows(
            height,
            || vec![Histogram::new(); 4],
            |mut hist, y| {
                for (x, &v) in samples.row(y).iter().enumerate() {
                    hist[params.plane_at(x as i64, y as i64)].add(v);
                }
                hist
            },
            |mut a, b| {
                a.iter_mut().zip(&b).for_each(|(ha, hb)| ha.merge(hb));
                a
            },
        );

        let occurrence_threshold = ((width * height) as f64 * config.outlier_fraction) as u64;
        let max_luminance = histograms
            .iter()
            .filter_map(|hist| hist.highest_value_above(occurrence_threshold))
            .max()
            .unwrap_or(0);

        let mut saturation = if params.max == 0 {
            max_luminance
        } else {
            params.max
        };
        if max_luminance > 0 {
            saturation = saturation.min(max_luminance);
        }
        if !custom_white_level {
            saturation = (f64::from(saturation) * config.margin) as u16;
        }
        tracing::debug!(max_luminance, saturation, "Saturation level");

        self.saturation = saturation;
        for exposure in &mut self.exposures {
            exposure.set_saturation_threshold(saturation, response.linear_limit_fraction);
        }
        saturation
    }

    // ========================================================================
    // Alignment and cropping
    // ========================================================================

    /// Aligns every exposure with the next darker one and chains the offsets,
    /// so all displacements are relative to the darkest exposure.
    pub fn align(&mut self, config: &AlignConfig) {
        if self.exposures.len() < 2 {
            return;
        }
        let start = Instant::now();

        self.exposures
            .par_iter_mut()
            .for_each(|exposure| exposure.build_pyramid(config.scale_steps));

        let exposures = &self.exposures;
        let relative: Vec<_> = (0..exposures.len() - 1)
            .into_par_iter()
            .map(|i| exposures[i].estimate_displacement(&exposures[i + 1], config))
            .collect();

        for i in (0..self.exposures.len() - 1).rev() {
            let (rdx, rdy) = self.exposures[i + 1].displacement();
            let alignment = relative[i];
            self.exposures[i].set_displacement(rdx + alignment.dx, rdy + alignment.dy);
            let (dx, dy) = self.exposures[i].displacement();
            tracing::debug!(
                "Exposure {} displaced to ({}, {}) with error {}",
                i,
                dx,
                dy,
                alignment.error
            );
        }

        self.exposures
            .iter_mut()
            .for_each(Exposure::release_align_data);
        tracing::info!(
            "Aligned {} exposures in {:.2}ms",
            self.exposures.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
    }

    /// Shrinks the working area to the intersection of all footprints and
    /// moves its corner to the origin.
    pub fn crop(&mut self) {
        let (mut dx, mut dy) = (0i32, 0i32);
        let (mut width, mut height) = (self.width as i32, self.height as i32);
        for exposure in &self.exposures {
            let (edx, edy) = exposure.displacement();

            let new_dx = dx.max(edx);
            let bound = (dx + width).min(edx + exposure.width() as i32);
            width = (bound - new_dx).max(0);
            dx = new_dx;

            let new_dy = dy.max(edy);
            let bound = (dy + height).min(edy + exposure.height() as i32);
            height = (bound - new_dy).max(0);
            dy = new_dy;
        }

        for exposure in &mut self.exposures {
            exposure.displace(-dx, -dy);
        }
        self.width = width as usize;
        self.height = height as usize;
        tracing::info!(
            "Cropped to {}x{} at ({}, {})",
            self.width,
            self.height,
            dx,
            dy
        );
    }

    // ========================================================================
    // Response functions and layer mask
    // ========================================================================

    /// Fits every exposure's response against the next darker one, from the
    /// darkest pair up, so each fit sees an already calibrated reference.
    pub fn compute_response_functions(&mut self, config: &ResponseConfig) {
        let start = Instant::now();
        for i in (0..self.exposures.len().saturating_sub(1)).rev() {
            let (brighter, darker) = self.exposures.split_at_mut(i + 1);
            brighter[i].compute_response_function(&darker[0], config);
            tracing::debug!(
                exposure = i,
                relative_exposure = brighter[i].relative_exposure(),
                "Response function"
            );
        }
        tracing::info!(
            max_exposure = self.max_exposure(),
            "Computed response functions in {:.2}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
    }

    /// Picks for every pixel the brightest exposure that covers it and is not
    /// saturated in its 3x3 neighbourhood, falling back to the darkest.
    pub fn generate_mask(&mut self) {
        let start = Instant::now();
        let width = self.width;
        let mut layers = Buffer2::new_default(width, self.height);
        let last = self.exposures.len().saturating_sub(1);

        if last > 0 && !layers.is_empty() {
            let exposures = &self.exposures;
            layers
                .pixels_mut()
                .par_rows_mut_auto(width)
                .for_each(|(start_row, chunk)| {
                    for (local_y, row) in chunk.chunks_exact_mut(width).enumerate() {
                        let y = (start_row + local_y) as i32;
                        for (x, layer) in row.iter_mut().enumerate() {
                            let x = x as i32;
                            let mut i = 0;
                            while i < last
                                && (!exposures[i].contains(x, y)
                                    || exposures[i].is_saturated_around(x, y))
                            {
                                i += 1;
                            }
                            *layer = i as u8;
                        }
                    }
                });
        }

        self.original_mask = layers.clone();
        self.mask.reset(layers);
        tracing::info!(
            "Generated mask in {:.2}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
    }

    #[inline]
    pub fn mask(&self) -> &EditableMask {
        &self.mask
    }

    #[inline]
    pub fn original_mask(&self) -> &Buffer2<u8> {
        &self.original_mask
    }

    /// Exposure value of the layer selected by the mask at `(x, y)`.
    pub fn value(&self, x: usize, y: usize) -> f64 {
        let layer = usize::from(self.mask.at(x, y));
        self.exposures[layer].exposure_at(x as i32, y as i32)
    }

    pub fn is_layer_valid_at(&self, layer: usize, x: i32, y: i32) -> bool {
        self.exposures
            .get(layer)
            .is_some_and(|exposure| exposure.contains(x, y))
    }

    // ========================================================================
    // Mask editing
    // ========================================================================

    pub fn start_mask_action(&mut self, add: bool, layer: u8) {
        self.mask.start_action(add, layer);
    }

    /// Paints the current mask action, skipping pixels the target exposure
    /// does not cover.
    pub fn paint_mask(&mut self, x: i32, y: i32, radius: i32) {
        let exposures = &self.exposures;
        self.mask.paint(x, y, radius, |layer, px, py| {
            exposures
                .get(usize::from(layer))
                .is_some_and(|exposure| exposure.contains(px, py))
        });
    }

    pub fn undo_mask(&mut self) -> Rect {
        self.mask.undo()
    }

    pub fn redo_mask(&mut self) -> Rect {
        self.mask.redo()
    }
}
