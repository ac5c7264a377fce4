//! Color filter array layout.

/// Repeating color filter pattern, addressed in visible-image coordinates.
///
/// Stored at its smallest period so that equal layouts compare equal however
/// they were built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfaPattern {
    width: usize,
    height: usize,
    planes: Vec<u8>,
}

impl CfaPattern {
    /// Single-plane sensor.
    pub fn monochrome() -> Self {
        Self {
            width: 1,
            height: 1,
            planes: vec![0],
        }
    }

    /// 2x2 Bayer layout, `pattern[row][col]`.
    pub fn bayer(pattern: [[u8; 2]; 2]) -> Self {
        Self::from_fn(2, 2, |x, y| pattern[y][x])
    }

    /// 6x6 X-Trans layout, `pattern[row][col]`.
    pub fn xtrans(pattern: [[u8; 6]; 6]) -> Self {
        Self::from_fn(6, 6, |x, y| pattern[y][x])
    }

    /// Decodes a dcraw/libraw `filters` word (8 rows by 2 columns, 2 bits each).
    pub fn from_filters(filters: u32) -> Self {
        Self::from_fn(2, 8, |x, y| {
            ((filters >> ((((y << 1) & 14) | (x & 1)) << 1)) & 3) as u8
        })
    }

    pub fn from_fn<F>(width: usize, height: usize, plane: F) -> Self
    where
        F: Fn(usize, usize) -> u8,
    {
        assert!(width > 0 && height > 0, "CFA period must be non-empty");
        let planes = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| plane(x, y))
            .collect();
        Self {
            width,
            height,
            planes,
        }
        .reduced()
    }

    /// Smallest period that reproduces the same layout.
    fn reduced(self) -> Self {
        let width = smallest_period(self.width, |p| {
            (0..self.height).all(|y| (0..self.width).all(|x| self.get(x, y) == self.get(x % p, y)))
        });
        let height = smallest_period(self.height, |p| {
            (0..self.height).all(|y| (0..self.width).all(|x| self.get(x, y) == self.get(x, y % p)))
        });
        let planes = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| self.get(x, y))
            .collect();
        Self {
            width,
            height,
            planes,
        }
    }

    #[inline]
    fn get(&self, x: usize, y: usize) -> u8 {
        self.planes[y * self.width + x]
    }

    /// Color plane of visible pixel `(x, y)`. Negative coordinates wrap.
    #[inline]
    pub fn plane_at(&self, x: i64, y: i64) -> usize {
        let col = x.rem_euclid(self.width as i64) as usize;
        let row = y.rem_euclid(self.height as i64) as usize;
        self.get(col, row) as usize
    }

    /// `(width, height)` of the repeating tile.
    pub fn period(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Number of distinct plane indices, counting up to the highest used.
    pub fn num_planes(&self) -> usize {
        self.planes.iter().copied().max().map_or(1, |p| p as usize + 1)
    }

    /// Alignment moves images by even offsets, which keeps the layout only
    /// when the pattern repeats every two pixels.
    pub fn can_align(&self) -> bool {
        2 % self.width == 0 && 2 % self.height == 0
    }
}

fn smallest_period<F>(len: usize, repeats: F) -> usize
where
    F: Fn(usize) -> bool,
{
    (1..len)
        .find(|&p| len % p == 0 && repeats(p))
        .unwrap_or(len)
}
