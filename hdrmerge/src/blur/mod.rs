//! Three-pass separable box blur approximating a Gaussian.
//!
//! Each pass is a horizontal moving sum followed by a vertical moving sum with
//! replicated edges. Three box passes converge to a Gaussian closely enough to
//! feather layer masks.

use common::parallel::ParRowsMutAuto;
use rayon::prelude::*;

use crate::config::DEFAULT_BLUR_BOX_SCALE;


const BOX_PASSES: usize = 3;

/// Blurs `pixels` in place with a Gaussian-like kernel of the given radius.
pub fn box_blur(pixels: &mut [f32], width: usize, height: usize, radius: usize) {
    box_blur_with_scale(pixels, width, height, radius, DEFAULT_BLUR_BOX_SCALE);
}

/// Like [`box_blur`], with the box radius computed as `round(radius * box_scale)`.
pub fn box_blur_with_scale(
    pixels: &mut [f32],
    width: usize,
    height: usize,
    radius: usize,
    box_scale: f64,
) {
    assert_eq!(
        pixels.len(),
        width * height,
        "pixel count must equal width * height"
    );
    let box_radius = (radius as f64 * box_scale).round() as usize;
    if box_radius == 0 || pixels.is_empty() {
        return;
    }

    let mut scratch = vec![0.0f32; pixels.len()];
    for _ in 0..BOX_PASSES {
        horizontal_pass(pixels, &mut scratch, width, box_radius);
        vertical_pass(&scratch, pixels, width, height, box_radius);
    }
}

/// Moving average along each row of `src` into `dst`.
fn horizontal_pass(src: &[f32], dst: &mut [f32], width: usize, radius: usize) {
    let inv = 1.0 / (2 * radius + 1) as f32;
    let last = width - 1;
    dst.par_chunks_mut(width)
        .zip(src.par_chunks(width))
        .for_each(|(out, row)| {
            let at = |i: isize| row[i.clamp(0, last as isize) as usize];
            let r = radius as isize;
            let mut sum: f32 = (-r..=r).map(at).sum();
            for (x, o) in out.iter_mut().enumerate() {
                *o = sum * inv;
                let x = x as isize;
                sum += at(x + r + 1) - at(x - r);
            }
        });
}

/// Moving average along each column of `src` into `dst`.
///
/// Every chunk of output rows seeds its own column sums, so chunks run
/// independently.
fn vertical_pass(src: &[f32], dst: &mut [f32], width: usize, height: usize, radius: usize) {
    let inv = 1.0 / (2 * radius + 1) as f32;
    let last = height as isize - 1;
    let src_row = |y: isize| {
        let y = y.clamp(0, last) as usize;
        &src[y * width..(y + 1) * width]
    };
    let r = radius as isize;

    dst.par_rows_mut_auto(width)
        .for_each(|(start_row, chunk)| {
            let mut sums = vec![0.0f32; width];
            for k in -r..=r {
                sums.iter_mut()
                    .zip(src_row(start_row as isize + k))
                    .for_each(|(s, &v)| *s += v);
            }
            for (local_y, out) in chunk.chunks_exact_mut(width).enumerate() {
                let y = (start_row + local_y) as isize;
                out.iter_mut()
                    .zip(&sums)
                    .for_each(|(o, &s)| *o = s * inv);
                let added = src_row(y + r + 1);
                let removed = src_row(y - r);
                for ((s, &a), &d) in sums.iter_mut().zip(added).zip(removed) {
                    *s += a - d;
                }
            }
        });
}
