//! Testing utilities for hdrmerge.

#![allow(dead_code)]

use common::Buffer2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::exposure::Exposure;

/// Border kept around every crop so displaced crops stay inside the scene.
pub const SCENE_MARGIN: usize = 48;

/// Initialize tracing subscriber for tests.
/// Safe to call multiple times - will only initialize once.
/// Respects RUST_LOG env var, defaults to "info".
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Random radiance field in `[0, 1]`.
pub struct Scene {
    pub width: usize,
    pub height: usize,
    pub values: Vec<f32>,
}

impl Scene {
    /// Multi-octave value noise, cell sizes 128 down to 4, amplitude
    /// proportional to cell size.
    pub fn value_noise(width: usize, height: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut values = vec![0.0f32; width * height];
        let mut total = 0.0f32;

        for cell in [128usize, 64, 32, 16, 8, 4] {
            let gw = width / cell + 2;
            let gh = height / cell + 2;
            let grid: Vec<f32> = (0..gw * gh).map(|_| rng.random::<f32>()).collect();
            let amplitude = cell as f32;
            total += amplitude;

            for y in 0..height {
                let fy = y as f32 / cell as f32;
                let (gy, ty) = (fy as usize, smoothstep(fy.fract()));
                for x in 0..width {
                    let fx = x as f32 / cell as f32;
                    let (gx, tx) = (fx as usize, smoothstep(fx.fract()));
                    let g = |i: usize, j: usize| grid[j * gw + i];
                    let top = g(gx, gy) + (g(gx + 1, gy) - g(gx, gy)) * tx;
                    let bottom = g(gx, gy + 1) + (g(gx + 1, gy + 1) - g(gx, gy + 1)) * tx;
                    values[y * width + x] += amplitude * (top + (bottom - top) * ty);
                }
            }
        }

        values.iter_mut().for_each(|v| *v /= total);
        Self {
            width,
            height,
            values,
        }
    }

    /// Value noise with random rectangles, 8 to 64 pixels a side, blended
    /// half and half into it. The rectangle edges keep threshold bitmaps of
    /// one-pixel shifts apart; the noise underneath keeps the coarse levels
    /// structured.
    pub fn with_edges(width: usize, height: usize, seed: u64) -> Self {
        let mut scene = Self::value_noise(width, height, seed);
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
        for _ in 0..width * height / 1024 {
            let w = rng.random_range(8..=64usize).min(width);
            let h = rng.random_range(8..=64usize).min(height);
            let x0 = rng.random_range(0..=width - w);
            let y0 = rng.random_range(0..=height - h);
            let level = rng.random::<f32>();
            for y in y0..y0 + h {
                for v in &mut scene.values[y * width + x0..y * width + x0 + w] {
                    *v = 0.5 * (*v + level);
                }
            }
        }
        scene
    }

    /// Scene sized for `width x height` crops with [`SCENE_MARGIN`] on every side.
    pub fn for_crops(width: usize, height: usize, seed: u64) -> Self {
        Self::with_edges(width + 2 * SCENE_MARGIN, height + 2 * SCENE_MARGIN, seed)
    }

    /// Crop whose pixel `(x, y)` shows scene point
    /// `(x + SCENE_MARGIN + ox, y + SCENE_MARGIN + oy)`, scaled by `gain` and
    /// clipped to `clip`.
    pub fn crop(
        &self,
        width: usize,
        height: usize,
        ox: i32,
        oy: i32,
        gain: f32,
        clip: u16,
    ) -> Buffer2<u16> {
        let x0 = (SCENE_MARGIN as i32 + ox) as usize;
        let y0 = (SCENE_MARGIN as i32 + oy) as usize;
        assert!(
            x0 + width <= self.width && y0 + height <= self.height,
            "crop outside scene"
        );
        let mut pixels = Vec::with_capacity(width * height);
        for y in y0..y0 + height {
            for x in x0..x0 + width {
                let v = (self.values[y * self.width + x] * gain).round();
                pixels.push(v.min(f32::from(clip)) as u16);
            }
        }
        Buffer2::new(width, height, pixels)
    }

    /// Exposure of a crop, see [`Scene::crop`].
    pub fn exposure(&self, width: usize, height: usize, ox: i32, oy: i32, gain: f32) -> Exposure {
        Exposure::new(self.crop(width, height, ox, oy, gain, u16::MAX))
    }
}

fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}
