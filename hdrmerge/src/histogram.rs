//! 16-bit sample histogram.

use rayon::prelude::*;

/// Samples per parallel work item when building from a slice.
const CHUNK_SIZE: usize = 1 << 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    bins: Vec<u64>,
    num_samples: u64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    pub const NUM_BINS: usize = 1 << 16;

    pub fn new() -> Self {
        Self {
            bins: vec![0; Self::NUM_BINS],
            num_samples: 0,
        }
    }

    /// Builds the histogram of `samples`, one partial histogram per worker.
    pub fn from_samples(samples: &[u16]) -> Self {
        samples
            .par_chunks(CHUNK_SIZE)
            .fold(Self::new, |mut hist, chunk| {
                chunk.iter().for_each(|&v| hist.add(v));
                hist
            })
            .reduce(Self::new, |mut a, b| {
                a.merge(&b);
                a
            })
    }

    #[inline]
    pub fn add(&mut self, value: u16) {
        self.bins[value as usize] += 1;
        self.num_samples += 1;
    }

    pub fn merge(&mut self, other: &Histogram) {
        self.bins
            .iter_mut()
            .zip(&other.bins)
            .for_each(|(a, b)| *a += b);
        self.num_samples += other.num_samples;
    }

    #[inline]
    pub fn num_samples(&self) -> u64 {
        self.num_samples
    }

    #[inline]
    pub fn bin(&self, value: u16) -> u64 {
        self.bins[value as usize]
    }

    /// Smallest value `v` such that at least `floor(n * fraction)` samples are `<= v`.
    pub fn percentile(&self, fraction: f64) -> u16 {
        let limit = (self.num_samples as f64 * fraction).floor() as u64;
        let mut value = 0;
        let mut current = self.bins[0];
        while current < limit && value + 1 < Self::NUM_BINS {
            value += 1;
            current += self.bins[value];
        }
        value as u16
    }

    /// Fraction of samples `<= value`. Zero for an empty histogram.
    pub fn fraction_at_or_below(&self, value: u16) -> f64 {
        if self.num_samples == 0 {
            return 0.0;
        }
        let below: u64 = self.bins[..=value as usize].iter().sum();
        below as f64 / self.num_samples as f64
    }

    /// Highest value whose bin holds more than `min_count` samples.
    pub fn highest_value_above(&self, min_count: u64) -> Option<u16> {
        self.bins
            .iter()
            .rposition(|&count| count > min_count)
            .map(|v| v as u16)
    }
}
