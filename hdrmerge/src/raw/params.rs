use std::path::PathBuf;

use common::Buffer2;

use super::CfaPattern;

/// Blocks with a sample closer than this to the white level are skipped by
/// the automatic white balance.
const AUTO_WB_CLIP_MARGIN: u16 = 25;
const AUTO_WB_BLOCK: usize = 8;

/// Camera and layout parameters of one raw file.
#[derive(Debug, Clone, PartialEq)]
pub struct RawParameters {
    pub path: PathBuf,
    pub maker: String,
    pub model: String,
    /// Dimensions of the decoded sensor buffer.
    pub raw_width: usize,
    pub raw_height: usize,
    /// Visible area inside the sensor buffer.
    pub width: usize,
    pub height: usize,
    pub top_margin: usize,
    pub left_margin: usize,
    pub cfa: CfaPattern,
    /// Plane letters, e.g. `"RGB"`.
    pub color_description: String,
    pub colors: usize,
    /// White level.
    pub max: u16,
    /// Minimum of the per-plane black levels.
    pub black: u16,
    /// Maximum of the per-plane black levels.
    pub max_black: u16,
    pub plane_black: [u16; 4],
    /// Daylight multipliers, used when the camera multipliers are unusable.
    pub pre_mul: [f32; 4],
    /// As-shot white balance multipliers; `cam_mul[0] == 0` means unknown.
    pub cam_mul: [f32; 4],
}

impl RawParameters {
    /// Parameters for a sensor without margins or black level.
    pub fn new(path: impl Into<PathBuf>, width: usize, height: usize, cfa: CfaPattern) -> Self {
        let colors = cfa.num_planes();
        Self {
            path: path.into(),
            maker: String::new(),
            model: String::new(),
            raw_width: width,
            raw_height: height,
            width,
            height,
            top_margin: 0,
            left_margin: 0,
            color_description: color_description(colors),
            colors,
            cfa,
            max: u16::MAX,
            black: 0,
            max_black: 0,
            plane_black: [0; 4],
            pre_mul: [1.0; 4],
            cam_mul: [1.0; 4],
        }
    }

    /// Two files can be stacked only if their sensor layout is identical.
    pub fn is_same_format(&self, other: &RawParameters) -> bool {
        self.raw_width == other.raw_width
            && self.raw_height == other.raw_height
            && self.width == other.width
            && self.height == other.height
            && self.cfa == other.cfa
            && self.color_description == other.color_description
    }

    #[inline]
    pub fn plane_at(&self, x: i64, y: i64) -> usize {
        self.cfa.plane_at(x, y)
    }

    /// Black level at visible pixel `(x, y)`.
    #[inline]
    pub fn black_at(&self, x: i64, y: i64) -> u16 {
        self.plane_black[self.plane_at(x, y)]
    }

    pub fn has_black(&self) -> bool {
        self.plane_black.iter().any(|&b| b != 0)
    }

    /// White balance multiplier at visible pixel `(x, y)`.
    #[inline]
    pub fn white_mult_at(&self, x: i64, y: i64) -> f32 {
        self.cam_mul[self.plane_at(x, y)]
    }

    /// Folds the common black level into the per-plane levels and recomputes
    /// `black` and `max_black` over all four of them.
    pub fn adjust_black(&mut self) {
        let common = self.black;
        for b in &mut self.plane_black {
            *b = b.saturating_add(common);
        }
        self.black = self.plane_black.iter().copied().min().unwrap_or(0);
        self.max_black = self.plane_black.iter().copied().max().unwrap_or(0);
    }

    /// Completes and normalizes the white balance multipliers so the smallest is 1.
    ///
    /// `image` holds black-subtracted samples addressed in working-area
    /// coordinates; it is only read when the camera multipliers are unknown.
    pub fn adjust_white(&mut self, image: &Buffer2<u16>) {
        if self.cam_mul[0] == 0.0 {
            self.auto_white_balance(image);
        } else if self.cam_mul[1] == 0.0 {
            self.cam_mul[1] = 1.0;
        }
        if self.colors == 3 {
            self.cam_mul[3] = self.cam_mul[1];
        } else if self.cam_mul[3] == 0.0 {
            self.cam_mul[3] = 1.0;
        }

        let min = self.cam_mul.iter().copied().fold(f32::INFINITY, f32::min);
        if min > 0.0 && min.is_finite() {
            self.cam_mul.iter_mut().for_each(|m| *m /= min);
        }
        tracing::debug!(cam_mul = ?self.cam_mul, "Adjusted white balance");
    }

    /// Gray-world estimate over 8x8 blocks, ignoring blocks near clipping.
    fn auto_white_balance(&mut self, image: &Buffer2<u16>) {
        let clip = self.max.saturating_sub(AUTO_WB_CLIP_MARGIN);
        let mut sums = [0.0f64; 4];
        let mut counts = [0u64; 4];

        for row in (0..self.height).step_by(AUTO_WB_BLOCK) {
            for col in (0..self.width).step_by(AUTO_WB_BLOCK) {
                let mut block_sums = [0.0f64; 4];
                let mut block_counts = [0u64; 4];
                let mut clipped = false;
                'block: for y in row..(row + AUTO_WB_BLOCK).min(self.height) {
                    for x in col..(col + AUTO_WB_BLOCK).min(self.width) {
                        let (x, y) = (x as i32, y as i32);
                        if !image.contains(x, y) {
                            continue;
                        }
                        let value = *image.at(x, y);
                        if value > clip {
                            clipped = true;
                            break 'block;
                        }
                        let plane = self.plane_at(x.into(), y.into());
                        block_sums[plane] += f64::from(value);
                        block_counts[plane] += 1;
                    }
                }
                if !clipped {
                    for c in 0..4 {
                        sums[c] += block_sums[c];
                        counts[c] += block_counts[c];
                    }
                }
            }
        }

        let planes = self.cfa.num_planes();
        if (0..planes).all(|c| sums[c] > 0.0) {
            for c in 0..planes {
                self.cam_mul[c] = (counts[c] as f64 / sums[c]) as f32;
            }
            tracing::debug!(cam_mul = ?self.cam_mul, "Automatic white balance");
        } else {
            tracing::warn!("Automatic white balance found no usable blocks, using daylight multipliers");
            self.cam_mul = self.pre_mul;
        }
    }
}

pub(crate) fn color_description(colors: usize) -> String {
    "RGBE".chars().take(colors.clamp(1, 4)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RGGB: [[u8; 2]; 2] = [[0, 1], [1, 2]];

    fn bayer_params() -> RawParameters {
        RawParameters::new("a.raw", 8, 8, CfaPattern::bayer(RGGB))
    }

    #[test]
    fn test_new_defaults() {
        let params = bayer_params();
        assert_eq!(params.colors, 3);
        assert_eq!(params.color_description, "RGB");
        assert_eq!(params.max, u16::MAX);
        assert!(!params.has_black());
    }

    #[test]
    fn test_same_format() {
        let a = bayer_params();
        let mut b = bayer_params();
        b.path = PathBuf::from("b.raw");
        b.cam_mul = [2.0, 1.0, 1.5, 0.0];
        assert!(a.is_same_format(&b));

        let c = RawParameters::new("c.raw", 8, 8, CfaPattern::bayer([[1, 0], [2, 1]]));
        assert!(!a.is_same_format(&c));

        let d = RawParameters::new("d.raw", 8, 10, CfaPattern::bayer(RGGB));
        assert!(!a.is_same_format(&d));

        let mut e = bayer_params();
        e.color_description = "RGBE".to_string();
        assert!(!a.is_same_format(&e));
    }

    #[test]
    fn test_black_and_white_mult_lookup() {
        let mut params = bayer_params();
        params.plane_black = [10, 20, 30, 0];
        params.cam_mul = [2.0, 1.0, 1.5, 1.0];
        assert_eq!(params.black_at(0, 0), 10);
        assert_eq!(params.black_at(1, 0), 20);
        assert_eq!(params.black_at(1, 1), 30);
        assert_eq!(params.black_at(-1, -1), 30);
        assert_eq!(params.white_mult_at(0, 0), 2.0);
        assert_eq!(params.white_mult_at(3, 3), 1.5);
    }

    #[test]
    fn test_adjust_black() {
        let mut params = bayer_params();
        params.black = 100;
        params.plane_black = [2, 0, 5, 60];
        params.adjust_black();
        assert_eq!(params.plane_black, [102, 100, 105, 160]);
        // All four levels count, even where the layout uses fewer planes.
        assert_eq!(params.black, 100);
        assert_eq!(params.max_black, 160);
    }

    #[test]
    fn test_adjust_white_normalizes_camera_multipliers() {
        let mut params = bayer_params();
        params.cam_mul = [2.0, 1.0, 1.5, 0.0];
        params.adjust_white(&Buffer2::new_default(8, 8));
        assert_eq!(params.cam_mul, [2.0, 1.0, 1.5, 1.0]);

        let mut params = bayer_params();
        params.cam_mul = [4.0, 2.0, 3.0, 0.0];
        params.adjust_white(&Buffer2::new_default(8, 8));
        assert_eq!(params.cam_mul, [2.0, 1.0, 1.5, 1.0]);
    }

    #[test]
    fn test_adjust_white_missing_green() {
        let mut params = bayer_params();
        params.cam_mul = [2.0, 0.0, 1.5, 0.0];
        params.adjust_white(&Buffer2::new_default(8, 8));
        assert_eq!(params.cam_mul, [2.0, 1.0, 1.5, 1.0]);
    }

    #[test]
    fn test_auto_white_balance_gray_world() {
        let mut params = bayer_params();
        params.max = 1000;
        params.cam_mul = [0.0; 4];
        // Red reads 400, green 200, blue 100: gains are the inverse ratios.
        let image = Buffer2::new(
            8,
            8,
            (0..64)
                .map(|i| match params.plane_at(i % 8, i / 8) {
                    0 => 400,
                    1 => 200,
                    _ => 100,
                })
                .collect(),
        );
        params.adjust_white(&image);
        assert!((params.cam_mul[0] - 1.0).abs() < 1e-5);
        assert!((params.cam_mul[1] - 2.0).abs() < 1e-5);
        assert!((params.cam_mul[2] - 4.0).abs() < 1e-5);
        assert_eq!(params.cam_mul[3], params.cam_mul[1]);
    }

    #[test]
    fn test_auto_white_balance_skips_clipped_blocks() {
        let mut params = RawParameters::new("a.raw", 16, 8, CfaPattern::bayer(RGGB));
        params.max = 1000;
        params.cam_mul = [0.0; 4];
        params.pre_mul = [3.0, 1.0, 2.0, 1.0];
        // Left block is neutral, right block has a clipped pixel and a strong cast.
        let image = Buffer2::new(
            16,
            8,
            (0..128)
                .map(|i| {
                    let (x, y) = (i % 16, i / 16);
                    if x < 8 {
                        300
                    } else if x == 12 && y == 4 {
                        990
                    } else {
                        50 * (params.plane_at(x, y) as u16 + 1)
                    }
                })
                .collect(),
        );
        params.adjust_white(&image);
        assert!((params.cam_mul[0] - 1.0).abs() < 1e-5);
        assert!((params.cam_mul[1] - 1.0).abs() < 1e-5);
        assert!((params.cam_mul[2] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_auto_white_balance_falls_back_to_daylight() {
        let mut params = bayer_params();
        params.max = 1000;
        params.cam_mul = [0.0; 4];
        params.pre_mul = [2.0, 1.0, 1.5, 1.0];
        let image = Buffer2::new_filled(8, 8, 999u16);
        params.adjust_white(&image);
        assert_eq!(params.cam_mul, [2.0, 1.0, 1.5, 1.0]);
    }

    #[test]
    fn test_color_description() {
        assert_eq!(color_description(1), "R");
        assert_eq!(color_description(3), "RGB");
        assert_eq!(color_description(4), "RGBE");
    }
}
