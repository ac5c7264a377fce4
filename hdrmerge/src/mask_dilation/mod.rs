//! Circular max filter for layer masks.
//!
//! Widens every layer boundary by `radius` pixels toward the lower layer
//! indices, so the feathering blur crosses a wide band instead of a one pixel
//! step. Edges replicate the border pixels.

use common::parallel::ParRowsMutAuto;
use common::Buffer2;
use rayon::prelude::*;


/// Vertical half-extent of the disc for every column offset `-radius..=radius`.
///
/// Column offset `i` reaches `floor(sqrt(r² - (|i| - 0.5)²))` rows up and down,
/// the centre column reaches `r`.
fn disc_half_widths(radius: usize) -> Vec<usize> {
    let r = radius as f64;
    (-(radius as isize)..=radius as isize)
        .map(|i| {
            if i == 0 {
                radius
            } else {
                let t = i.unsigned_abs() as f64 - 0.5;
                (r * r - t * t).sqrt().floor() as usize
            }
        })
        .collect()
}

/// Returns `mask` dilated with a disc of the given radius.
pub fn dilate_mask(mask: &Buffer2<u8>, radius: usize) -> Buffer2<u8> {
    let width = mask.width();
    let height = mask.height();
    let mut output = Buffer2::new_default(width, height);
    if radius == 0 || mask.is_empty() {
        output.pixels_mut().copy_from_slice(mask.pixels());
        return output;
    }

    let half_widths = disc_half_widths(radius);
    let last_row = height as isize - 1;
    let last_col = width as isize - 1;

    output
        .pixels_mut()
        .par_rows_mut_auto(width)
        .for_each(|(start_row, chunk)| {
            // column_max[k][x] = max of column x over rows y-k..=y+k.
            let mut column_max = vec![vec![0u8; width]; radius + 1];
            for (local_y, out) in chunk.chunks_exact_mut(width).enumerate() {
                let y = (start_row + local_y) as isize;
                column_max[0].copy_from_slice(mask.row(y as usize));
                for k in 1..=radius {
                    let above = mask.row((y - k as isize).clamp(0, last_row) as usize);
                    let below = mask.row((y + k as isize).clamp(0, last_row) as usize);
                    let (prev, rest) = column_max.split_at_mut(k);
                    for x in 0..width {
                        rest[0][x] = prev[k - 1][x].max(above[x]).max(below[x]);
                    }
                }

                for (x, o) in out.iter_mut().enumerate() {
                    let mut value = 0u8;
                    for (i, &half) in half_widths.iter().enumerate() {
                        let col = (x as isize + i as isize - radius as isize).clamp(0, last_col);
                        value = value.max(column_max[half][col as usize]);
                    }
                    *o = value;
                }
            }
        });

    output
}
