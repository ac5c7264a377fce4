//! Bit-packed boolean raster used by exposure alignment.
//!
//! Bits are stored row-major, least significant bit first, 64 per `u64` word.
//! Bits past `width * height` in the last word are always zero, so a shift may
//! read whole words past the logical end without masking the source.

use std::ops::{BitAndAssign, BitXorAssign};

use rayon::prelude::*;


/// Number of bits per storage word.
const BITS_PER_WORD: usize = 64;

/// Number of set bits for every byte value.
const ONES_PER_BYTE: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 1;
    while i < 256 {
        table[i] = table[i >> 1] + (i & 1) as u8;
        i += 1;
    }
    table
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitGrid {
    words: Vec<u64>,
    width: usize,
    height: usize,
    /// Total number of bits (width * height).
    len: usize,
}

impl BitGrid {
    /// Create a grid with all bits cleared.
    pub fn new(width: usize, height: usize) -> Self {
        let len = width * height;
        Self {
            words: vec![0; len.div_ceil(BITS_PER_WORD)],
            width,
            height,
            len,
        }
    }

    /// Median threshold bitmap: bit `i` is set iff `samples[i] > threshold`.
    pub fn median_threshold_map(
        samples: &[u16],
        width: usize,
        height: usize,
        threshold: u16,
    ) -> Self {
        Self::from_predicate(samples, width, height, |v| v > threshold)
    }

    /// Exclusion band: bit `i` is set iff `samples[i]` lies strictly outside
    /// `[threshold - tolerance, threshold + tolerance]`.
    pub fn exclusion_band(
        samples: &[u16],
        width: usize,
        height: usize,
        threshold: u16,
        tolerance: u16,
    ) -> Self {
        let low = i32::from(threshold) - i32::from(tolerance);
        let high = i32::from(threshold) + i32::from(tolerance);
        Self::from_predicate(samples, width, height, |v| {
            let v = i32::from(v);
            v < low || v > high
        })
    }

    fn from_predicate<P>(samples: &[u16], width: usize, height: usize, predicate: P) -> Self
    where
        P: Fn(u16) -> bool + Sync,
    {
        assert_eq!(
            samples.len(),
            width * height,
            "sample count {} does not match dimensions {}x{}",
            samples.len(),
            width,
            height
        );
        let mut grid = Self::new(width, height);
        grid.words
            .par_iter_mut()
            .zip(samples.par_chunks(BITS_PER_WORD))
            .for_each(|(word, chunk)| {
                *word = chunk
                    .iter()
                    .enumerate()
                    .filter(|&(_, &v)| predicate(v))
                    .fold(0u64, |acc, (bit, _)| acc | (1u64 << bit));
            });
        grid
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
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        let idx = self.bit_index(x, y);
        (self.words[idx / BITS_PER_WORD] >> (idx % BITS_PER_WORD)) & 1 != 0
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize) {
        let idx = self.bit_index(x, y);
        self.words[idx / BITS_PER_WORD] |= 1u64 << (idx % BITS_PER_WORD);
    }

    #[inline]
    pub fn reset(&mut self, x: usize, y: usize) {
        let idx = self.bit_index(x, y);
        self.words[idx / BITS_PER_WORD] &= !(1u64 << (idx % BITS_PER_WORD));
    }

    #[inline]
    fn bit_index(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height, "({x}, {y}) out of bounds");
        y * self.width + x
    }

    /// Clear every bit.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.words
            .iter()
            .map(|word| {
                word.to_le_bytes()
                    .iter()
                    .map(|&b| ONES_PER_BYTE[b as usize] as usize)
                    .sum::<usize>()
            })
            .sum()
    }

    /// Returns `src` displaced by `(dx, dy)`: `result(x, y) = src(x - dx, y - dy)`.
    pub fn shifted(&self, dx: i32, dy: i32) -> Self {
        let mut result = Self::new(self.width, self.height);
        result.shift_from(self, dx, dy);
        result
    }

    /// Overwrites `self` with `src` displaced by `(dx, dy)`.
    ///
    /// Bits that come from outside `src` are zero.
    pub fn shift_from(&mut self, src: &BitGrid, dx: i32, dy: i32) {
        self.assert_same_size(src);
        if dx.unsigned_abs() as usize >= self.width || dy.unsigned_abs() as usize >= self.height {
            self.clear();
            return;
        }

        // Output bit p reads source bit p + offset.
        let offset = -(i64::from(dy) * self.width as i64 + i64::from(dx));
        let word_offset = offset.div_euclid(BITS_PER_WORD as i64);
        let bit_offset = offset.rem_euclid(BITS_PER_WORD as i64) as u32;
        let src_word = |i: i64| -> u64 {
            usize::try_from(i)
                .ok()
                .and_then(|i| src.words.get(i).copied())
                .unwrap_or(0)
        };

        for (i, word) in self.words.iter_mut().enumerate() {
            let base = i as i64 + word_offset;
            let low = src_word(base);
            *word = if bit_offset == 0 {
                low
            } else {
                (low >> bit_offset) | (src_word(base + 1) << (BITS_PER_WORD as u32 - bit_offset))
            };
        }

        self.mask_tail();
        self.mask_row_edges(dx);
    }

    /// Clears the columns that wrapped in from the neighbouring row after a
    /// horizontal shift by `dx`.
    fn mask_row_edges(&mut self, dx: i32) {
        let cols = dx.unsigned_abs() as usize;
        if cols == 0 {
            return;
        }
        for y in 0..self.height {
            let row_start = y * self.width;
            if dx > 0 {
                self.clear_range(row_start, row_start + cols);
            } else {
                self.clear_range(row_start + self.width - cols, row_start + self.width);
            }
        }
    }

    /// Clears bits in `[start, end)`.
    fn clear_range(&mut self, start: usize, end: usize) {
        let mut bit = start;
        while bit < end {
            let word = bit / BITS_PER_WORD;
            let offset = bit % BITS_PER_WORD;
            let n = (BITS_PER_WORD - offset).min(end - bit);
            let mask = if n == BITS_PER_WORD {
                !0u64
            } else {
                ((1u64 << n) - 1) << offset
            };
            self.words[word] &= !mask;
            bit += n;
        }
    }

    fn mask_tail(&mut self) {
        let used = self.len % BITS_PER_WORD;
        if used != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << used) - 1;
            }
        }
    }

    fn assert_same_size(&self, other: &BitGrid) {
        assert!(
            self.width == other.width && self.height == other.height,
            "bit grid size mismatch: {}x{} vs {}x{}",
            self.width,
            self.height,
            other.width,
            other.height
        );
    }
}

impl BitXorAssign<&BitGrid> for BitGrid {
    fn bitxor_assign(&mut self, other: &BitGrid) {
        self.assert_same_size(other);
        self.words
            .iter_mut()
            .zip(&other.words)
            .for_each(|(a, b)| *a ^= b);
    }
}

impl BitAndAssign<&BitGrid> for BitGrid {
    fn bitand_assign(&mut self, other: &BitGrid) {
        self.assert_same_size(other);
        self.words
            .iter_mut()
            .zip(&other.words)
            .for_each(|(a, b)| *a &= b);
    }
}
