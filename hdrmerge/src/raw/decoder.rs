use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Context, Result};

use super::params::color_description;
use super::{CfaPattern, RawDecoder, RawFrame, RawParameters};

/// Decodes raw files with `rawloader` (pure Rust, no demosaicing).
#[derive(Debug, Clone, Copy, Default)]
pub struct RawloaderDecoder;

impl RawDecoder for RawloaderDecoder {
    fn decode(&self, path: &Path) -> Result<RawFrame> {
        let start = Instant::now();
        let image = rawloader::decode_file(path)
            .with_context(|| format!("rawloader: Failed to decode: {}", path.display()))?;

        if image.cpp != 1 {
            bail!(
                "{} has {} components per pixel, expected a single-plane mosaic",
                path.display(),
                image.cpp
            );
        }

        let [top, right, bottom, left] = image.crops;
        let width = image
            .width
            .checked_sub(left + right)
            .with_context(|| format!("{}: horizontal crop exceeds width", path.display()))?;
        let height = image
            .height
            .checked_sub(top + bottom)
            .with_context(|| format!("{}: vertical crop exceeds height", path.display()))?;

        let cfa = if image.cfa.is_valid() {
            let cropped = image.cropped_cfa();
            CfaPattern::from_fn(cropped.width, cropped.height, |x, y| {
                cropped.color_at(y, x) as u8
            })
        } else {
            CfaPattern::monochrome()
        };
        let colors = cfa.num_planes();

        let mut cam_mul = image
            .wb_coeffs
            .map(|c| if c.is_finite() && c > 0.0 { c } else { 0.0 });
        if cam_mul[..colors.min(3)].contains(&0.0) {
            tracing::debug!(wb = ?image.wb_coeffs, "Invalid camera white balance");
            cam_mul[0] = 0.0;
        }

        let mut params = RawParameters {
            path: path.to_path_buf(),
            maker: image.clean_make.clone(),
            model: image.clean_model.clone(),
            raw_width: image.width,
            raw_height: image.height,
            width,
            height,
            top_margin: top,
            left_margin: left,
            color_description: color_description(colors),
            colors,
            cfa,
            max: image.whitelevels[..colors]
                .iter()
                .copied()
                .max()
                .unwrap_or(u16::MAX),
            black: 0,
            max_black: 0,
            plane_black: image.blacklevels,
            pre_mul: [1.0; 4],
            cam_mul,
        };
        params.adjust_black();

        let samples = match image.data {
            rawloader::RawImageData::Integer(data) => data,
            rawloader::RawImageData::Float(_) => {
                bail!("{}: floating-point raw data is not supported", path.display())
            }
        };
        if samples.len() != params.raw_width * params.raw_height {
            bail!(
                "{}: expected {} samples, decoder returned {}",
                path.display(),
                params.raw_width * params.raw_height,
                samples.len()
            );
        }

        tracing::info!(
            "Decoded {} ({} {}, {}x{}, white {}, black {}) in {:.2}ms",
            path.display(),
            params.maker,
            params.model,
            width,
            height,
            params.max,
            params.black,
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(RawFrame::new(params, samples))
    }
}
