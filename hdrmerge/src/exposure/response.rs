//! Mapping from raw sample values to the stack's common exposure scale.

use common::parallel::par_fold_rows;

use super::Exposure;
use crate::config::ResponseConfig;

/// `v * linear` up to `threshold`, a fitted monotone curve above it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFunction {
    linear: f64,
    threshold: f64,
    curve: MonotoneCurve,
}

impl ResponseFunction {
    /// Pure linear response with the given slope.
    pub fn linear(slope: f64) -> Self {
        let mut response = Self {
            linear: 1.0,
            threshold: 65535.0,
            curve: MonotoneCurve::identity(),
        };
        response.set_linear(slope);
        response
    }

    pub fn set_linear(&mut self, slope: f64) {
        self.threshold = 65535.0;
        self.linear = slope;
        self.curve = if slope > 0.0 {
            MonotoneCurve::from_knots(vec![(0.0, 0.0), (65535.0 / slope, 65535.0)])
        } else {
            MonotoneCurve::from_knots(vec![(0.0, 0.0), (65535.0, 0.0)])
        };
    }

    #[inline]
    pub fn apply(&self, value: u16) -> f64 {
        let v = f64::from(value);
        if v <= self.threshold {
            v * self.linear
        } else {
            self.curve.eval(v)
        }
    }

    #[inline]
    pub fn linear_slope(&self) -> f64 {
        self.linear
    }

    #[inline]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub(super) fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }
}

/// Non-decreasing piecewise-linear curve, extrapolated with its end slopes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MonotoneCurve {
    /// Strictly increasing in x, non-decreasing in y.
    knots: Vec<(f64, f64)>,
}

impl MonotoneCurve {
    fn identity() -> Self {
        Self::from_knots(vec![(0.0, 0.0), (1.0, 1.0)])
    }

    fn from_knots(knots: Vec<(f64, f64)>) -> Self {
        debug_assert!(knots.windows(2).all(|w| w[0].0 < w[1].0 && w[0].1 <= w[1].1));
        Self { knots }
    }

    /// Least-squares monotone fit through `points`.
    ///
    /// The first point is kept as an anchor knot. The remaining points are
    /// sorted, averaged in consecutive groups down to at most `max_knots - 1`
    /// knots, and made monotone by pooling adjacent violators.
    pub fn fit(points: &[(f64, f64)], max_knots: usize) -> Self {
        let Some((&anchor, rest)) = points.split_first() else {
            return Self::identity();
        };
        let mut rest = rest.to_vec();
        rest.sort_by(|a, b| a.0.total_cmp(&b.0));

        // (x, y, weight) per group
        let mut blocks: Vec<(f64, f64, f64)> = vec![(anchor.0, anchor.1, 1.0)];
        let groups = max_knots.saturating_sub(1).max(1);
        let group_size = rest.len().div_ceil(groups).max(1);
        for group in rest.chunks(group_size) {
            let n = group.len() as f64;
            let x = group.iter().map(|p| p.0).sum::<f64>() / n;
            let y = group.iter().map(|p| p.1).sum::<f64>() / n;
            if x > blocks[blocks.len() - 1].0 {
                blocks.push((x, y, n));
            }
        }

        let ys = pool_adjacent_violators(&blocks);
        let knots: Vec<(f64, f64)> = blocks.iter().zip(ys).map(|(b, y)| (b.0, y)).collect();
        if knots.len() == 1 {
            let (x, y) = knots[0];
            return Self::from_knots(vec![(x, y), (x + 1.0, y)]);
        }
        Self::from_knots(knots)
    }

    pub fn eval(&self, x: f64) -> f64 {
        let knots = &self.knots;
        let n = knots.len();
        let segment = match knots.partition_point(|k| k.0 <= x) {
            0 => 0,
            i if i >= n => n - 2,
            i => i - 1,
        };
        let (x0, y0) = knots[segment];
        let (x1, y1) = knots[segment + 1];
        y0 + (x - x0) * (y1 - y0) / (x1 - x0)
    }
}

/// Weighted isotonic regression of the block values. Returns one fitted value
/// per block.
fn pool_adjacent_violators(blocks: &[(f64, f64, f64)]) -> Vec<f64> {
    // (mean, weight, number of blocks pooled)
    let mut pools: Vec<(f64, f64, usize)> = Vec::with_capacity(blocks.len());
    for &(_, y, w) in blocks {
        pools.push((y, w, 1));
        while pools.len() > 1 {
            let (m1, w1, c1) = pools[pools.len() - 1];
            let (m0, w0, c0) = pools[pools.len() - 2];
            if m0 <= m1 {
                break;
            }
            pools.pop();
            let last = pools.len() - 1;
            pools[last] = ((m0 * w0 + m1 * w1) / (w0 + w1), w0 + w1, c0 + c1);
        }
    }
    pools
        .into_iter()
        .flat_map(|(mean, _, count)| std::iter::repeat(mean).take(count))
        .collect()
}

/// Per-value statistics of the overlap between two exposures.
#[derive(Debug, Clone)]
struct ResponseHistogram {
    counts: Vec<u32>,
    sums: Vec<f64>,
    /// Σ v * r(nv)
    cross: f64,
    /// Σ v²
    squares: f64,
}

impl ResponseHistogram {
    fn new(len: usize) -> Self {
        Self {
            counts: vec![0; len],
            sums: vec![0.0; len],
            cross: 0.0,
            squares: 0.0,
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.counts
            .iter_mut()
            .zip(&other.counts)
            .for_each(|(a, b)| *a += b);
        self.sums
            .iter_mut()
            .zip(&other.sums)
            .for_each(|(a, b)| *a += b);
        self.cross += other.cross;
        self.squares += other.squares;
        self
    }
}

impl Exposure {
    /// Fits this exposure's response against the next darker exposure.
    ///
    /// Only unsaturated overlap pixels that are at least as bright as their
    /// darker counterpart contribute. With too few distinct top values the
    /// curve fit is replaced by a single least-squares scale factor.
    pub fn compute_response_function(&mut self, darker: &Exposure, config: &ResponseConfig) {
        let (ax, ay) = self.displacement();
        let (bx, by) = darker.displacement();
        let x0 = ax.max(bx);
        let y0 = ay.max(by);
        let x1 = (ax + self.width() as i32).min(bx + darker.width() as i32);
        let y1 = (ay + self.height() as i32).min(by + darker.height() as i32);
        let overlap_height = (y1 - y0).max(0) as usize;

        let max = self.max;
        let saturation = self.saturation;
        let histogram = par_fold_rows(
            overlap_height,
            || ResponseHistogram::new(usize::from(max) + 1),
            |mut hist, row| {
                let y = y0 + row as i32;
                for x in x0..x1 {
                    let v = self.sample_at(x, y);
                    let nv = darker.sample_at(x, y);
                    if v >= nv && v < saturation {
                        let r = darker.response.apply(nv);
                        let bin = usize::from(v).min(hist.counts.len() - 1);
                        hist.counts[bin] += 1;
                        hist.sums[bin] += r;
                        hist.cross += f64::from(v) * r;
                        hist.squares += f64::from(v) * f64::from(v);
                    }
                }
                hist
            },
            ResponseHistogram::merge,
        );

        let top = f64::from(max) * config.top_fraction;
        let mut points = vec![(0.0, 0.0)];
        for v in (0..usize::from(max)).rev() {
            if (v as f64) < top {
                break;
            }
            let count = histogram.counts[v];
            if count >= config.min_bin_count {
                points.push((v as f64, histogram.sums[v] / f64::from(count)));
            }
        }

        let needed = usize::from(max) / config.fit_points_divisor as usize;
        if points.len() >= needed && self.response.threshold > 0.0 {
            let curve = MonotoneCurve::fit(&points, config.curve_knots);
            let threshold = self.response.threshold;
            self.response.linear = curve.eval(threshold) / threshold;
            self.response.curve = curve;
            tracing::debug!(
                points = points.len(),
                linear = self.response.linear,
                "Fitted response curve"
            );
        } else {
            self.response.threshold = 65535.0;
            self.response.linear = if histogram.squares > 0.0 {
                histogram.cross / histogram.squares
            } else {
                1.0
            };
            tracing::warn!(
                points = points.len(),
                needed,
                linear = self.response.linear,
                "Too few points for a response curve, using a scalar fit"
            );
        }
    }
}
