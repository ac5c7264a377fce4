use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;

#[test]
fn test_par_rows_mut_auto_offsets() {
    let width = 10;
    let height = 20;
    let mut data: Vec<usize> = vec![0; width * height];

    data.par_rows_mut_auto(width)
        .for_each(|(chunk_start_row, chunk)| {
            let rows_in_chunk = chunk.len() / width;
            for local_y in 0..rows_in_chunk {
                let y = chunk_start_row + local_y;
                for x in 0..width {
                    chunk[local_y * width + x] = y * width + x;
                }
            }
        });

    for (i, &v) in data.iter().enumerate() {
        assert_eq!(v, i);
    }
}

#[test]
fn test_par_rows_mut_auto_row_alignment() {
    let width = 7;
    let height = 13;
    let mut data: Vec<u32> = vec![0; width * height];

    data.par_rows_mut_auto(width)
        .for_each(|(chunk_start_row, chunk)| {
            assert_eq!(chunk.len() % width, 0, "Chunk not row-aligned");
            for (local_y, row) in chunk.chunks_exact_mut(width).enumerate() {
                row.fill((chunk_start_row + local_y) as u32);
            }
        });

    for y in 0..height {
        for x in 0..width {
            assert_eq!(data[y * width + x], y as u32);
        }
    }
}

#[test]
fn test_par_rows_mut_auto_single_row() {
    let width = 100;
    let mut data: Vec<usize> = vec![0; width];

    data.par_rows_mut_auto(width)
        .for_each(|(chunk_start_row, chunk)| {
            assert_eq!(chunk_start_row, 0);
            for (x, val) in chunk.iter_mut().enumerate() {
                *val = x;
            }
        });

    for (i, &v) in data.iter().enumerate() {
        assert_eq!(v, i);
    }
}

#[test]
#[should_panic(expected = "row width must be > 0")]
fn test_par_rows_mut_auto_zero_width_panics() {
    let mut data: Vec<u8> = vec![0; 4];
    data.par_rows_mut_auto(0).for_each(|_| {});
}

#[test]
fn test_par_fold_rows_sums_every_row_once() {
    let height = 1037;
    let total = par_fold_rows(height, || 0usize, |acc, y| acc + y, |a, b| a + b);
    assert_eq!(total, height * (height - 1) / 2);
}

#[test]
fn test_par_fold_rows_with_vector_accumulator() {
    let width = 16;
    let height = 50;
    let data: Vec<u8> = (0..width * height).map(|i| (i % 4) as u8).collect();

    let histogram = par_fold_rows(
        height,
        || vec![0usize; 4],
        |mut acc, y| {
            for &v in &data[y * width..(y + 1) * width] {
                acc[v as usize] += 1;
            }
            acc
        },
        |mut a, b| {
            a.iter_mut().zip(b).for_each(|(a, b)| *a += b);
            a
        },
    );

    assert_eq!(histogram, vec![width * height / 4; 4]);
}

#[test]
fn test_par_fold_rows_empty() {
    let result = par_fold_rows(0, || 42, |acc, _| acc + 1, |a, b| a.max(b));
    assert_eq!(result, 42);
}

#[test]
fn test_par_map_limited_preserves_order() {
    let items: Vec<i32> = (0..100).collect();
    let result = par_map_limited(&items, 4, |&x| x * 2);
    let expected: Vec<i32> = (0..100).map(|x| x * 2).collect();
    assert_eq!(result, expected);
}

#[test]
fn test_par_map_limited_empty() {
    let items: Vec<i32> = vec![];
    let result = par_map_limited(&items, 3, |&x| x);
    assert!(result.is_empty());
}

#[test]
#[should_panic(expected = "max_concurrent must be > 0")]
fn test_par_map_limited_zero_panics() {
    par_map_limited(&[1, 2, 3], 0, |&x| x);
}

#[test]
fn test_par_map_limited_concurrency_cap() {
    let items: Vec<i32> = (0..20).collect();
    let in_flight = AtomicUsize::new(0);
    let max_observed = AtomicUsize::new(0);

    par_map_limited(&items, 3, |&x| {
        let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        max_observed.fetch_max(current, Ordering::SeqCst);
        std::thread::sleep(std::time::Duration::from_millis(5));
        in_flight.fetch_sub(1, Ordering::SeqCst);
        x
    });

    let max = max_observed.load(Ordering::SeqCst);
    assert!(max <= 3, "max in-flight was {max}, expected <= 3");
}
