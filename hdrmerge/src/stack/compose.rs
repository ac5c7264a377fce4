use std::time::Instant;

use common::Buffer2;
use rayon::prelude::*;

use super::ExposureStack;
use crate::blur::box_blur_with_scale;
use crate::config::ComposeConfig;
use crate::mask_dilation::dilate_mask;
use crate::raw::RawParameters;

/// Blend weights at or below this are treated as zero.
const MIN_BLEND: f64 = 0.0001;

impl ExposureStack {
    /// Blends the exposures into one raster at the raw dimensions of `params`.
    ///
    /// The layer mask is dilated and blurred into fractional layer indices;
    /// every pixel mixes the two layers around its index. Pixels whose layer
    /// was saturated in the generated mask lose their white balance scaling
    /// and lean towards the darker layer as they approach the white level.
    /// The result is rescaled to `params.max - params.max_black` and the
    /// per-plane black levels are added back.
    pub fn compose(&self, params: &RawParameters, config: &ComposeConfig) -> Buffer2<f32> {
        let (width, height) = (self.width, self.height);
        assert!(
            params.left_margin + width <= params.raw_width
                && params.top_margin + height <= params.raw_height,
            "working area exceeds the raw dimensions"
        );
        assert_eq!(
            (self.mask.layers().width(), self.mask.layers().height()),
            (width, height),
            "layer mask must be generated before composing"
        );
        let mut output = Buffer2::new_default(params.raw_width, params.raw_height);
        if self.exposures.is_empty() || output.is_empty() {
            return output;
        }

        let start = Instant::now();
        let dilated = dilate_mask(self.mask.layers(), config.feather_radius);
        let mut map: Vec<f32> = dilated.iter().map(|&layer| f32::from(layer)).collect();
        box_blur_with_scale(
            &mut map,
            width,
            height,
            config.feather_radius,
            config.blur_box_scale,
        );
        tracing::debug!(
            "Feathered mask in {:.2}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );

        let start = Instant::now();
        let raw_width = params.raw_width;
        let max = output
            .pixels_mut()
            .par_chunks_mut(raw_width)
            .enumerate()
            .map(|(raw_y, row)| {
                let Some(y) = raw_y.checked_sub(params.top_margin).filter(|&y| y < height) else {
                    return 0.0f32;
                };
                let mut row_max = 0.0f32;
                let out = &mut row[params.left_margin..params.left_margin + width];
                for (x, o) in out.iter_mut().enumerate() {
                    let position = map[y * width + x].max(0.0);
                    let original = usize::from(self.original_mask[(x, y)]);
                    let v = self.blend_at(params, x as i32, y as i32, position, original) as f32;
                    *o = v;
                    row_max = row_max.max(v);
                }
                row_max
            })
            .reduce(|| 0.0f32, f32::max);

        let mult = if max > 0.0 {
            f32::from(params.max.saturating_sub(params.max_black)) / max
        } else {
            1.0
        };
        let (left, top) = (params.left_margin as i64, params.top_margin as i64);
        output
            .pixels_mut()
            .par_chunks_mut(raw_width)
            .enumerate()
            .for_each(|(raw_y, row)| {
                let y = raw_y as i64 - top;
                for (raw_x, v) in row.iter_mut().enumerate() {
                    *v = *v * mult + f32::from(params.black_at(raw_x as i64 - left, y));
                }
            });

        tracing::info!(
            "Composed {}x{} in {:.2}ms",
            params.raw_width,
            params.raw_height,
            start.elapsed().as_secs_f64() * 1000.0
        );
        output
    }

    /// Merged value at logical `(x, y)` for the fractional layer `position`.
    fn blend_at(
        &self,
        params: &RawParameters,
        x: i32,
        y: i32,
        position: f32,
        original_layer: usize,
    ) -> f64 {
        let last = self.exposures.len() - 1;
        let position = f64::from(position);
        let j = (position.floor() as usize).min(last);
        let white_mult = || f64::from(params.white_mult_at(x.into(), y.into()));

        let layer = &self.exposures[j];
        let mut v: f64;
        let mut p: f64;
        if layer.contains(x, y) {
            p = position - j as f64;
            v = layer.exposure_at(x, y);
            if j < original_layer {
                v /= white_mult();
                if p > MIN_BLEND {
                    let saturated_range = f64::from(params.max) - f64::from(self.saturation);
                    let k = if saturated_range > 0.0 {
                        let excess = f64::from(layer.max_around(x, y)) - f64::from(self.saturation);
                        (excess / saturated_range).min(1.0)
                    } else {
                        1.0
                    };
                    p += (1.0 - p) * k;
                }
            }
        } else {
            v = 0.0;
            p = 1.0;
        }

        let vv;
        if p > MIN_BLEND && j < last && self.exposures[j + 1].contains(x, y) {
            let mut next = self.exposures[j + 1].exposure_at(x, y);
            if j + 1 < original_layer {
                next /= white_mult();
            }
            vv = next;
        } else {
            vv = 0.0;
            p = 0.0;
        }
        v - p * (v - vv)
    }
}
