//! Splitting the input files into bracketed sets for batch merging.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::{BatchConfig, Grouping};
use crate::raw::RawDecoder;

/// Splits `paths` into the sets merged one at a time.
///
/// Sets of a single file are kept; [`keeps_set`] decides whether to merge them.
pub fn bracketed_sets<D>(
    paths: &[PathBuf],
    decoder: &D,
    config: &BatchConfig,
) -> Vec<Vec<PathBuf>>
where
    D: RawDecoder + ?Sized,
{
    let sets = match config.grouping {
        Grouping::All if paths.is_empty() => Vec::new(),
        Grouping::All => vec![paths.to_vec()],
        Grouping::Manual => group_by_count(paths, config.bracket_size),
        Grouping::Auto => group_by_time(
            paths,
            |path| decoder.capture_time(path),
            config.gap_seconds,
        ),
    };
    for (i, set) in sets.iter().enumerate() {
        tracing::info!(set = i, files = ?set, "Bracketed set");
    }
    sets
}

/// Consecutive runs of `size` files in input order; the last run may be shorter.
pub fn group_by_count(paths: &[PathBuf], size: usize) -> Vec<Vec<PathBuf>> {
    paths.chunks(size.max(1)).map(<[PathBuf]>::to_vec).collect()
}

/// Groups files by capture time. Files are sorted chronologically and a new
/// set starts wherever two adjacent captures are more than `gap_seconds`
/// apart. Files without a capture time form sets of their own, ahead of the
/// dated ones.
pub fn group_by_time<F>(
    paths: &[PathBuf],
    capture_time: F,
    gap_seconds: f64,
) -> Vec<Vec<PathBuf>>
where
    F: Fn(&Path) -> Option<SystemTime>,
{
    let mut sets: Vec<Vec<PathBuf>> = Vec::new();
    let mut dated: Vec<(SystemTime, &PathBuf)> = Vec::with_capacity(paths.len());
    for path in paths {
        match capture_time(path) {
            Some(time) => dated.push((time, path)),
            None => {
                tracing::warn!("No capture time for {}, merging it alone", path.display());
                sets.push(vec![path.clone()]);
            }
        }
    }
    dated.sort_by_key(|&(time, _)| time);

    let mut last: Option<SystemTime> = None;
    let mut current: Vec<PathBuf> = Vec::new();
    for (time, path) in dated {
        let gap = last.map(|last| {
            time.duration_since(last)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0)
        });
        if gap.is_some_and(|gap| gap > gap_seconds) {
            sets.push(std::mem::take(&mut current));
        }
        current.push(path.clone());
        last = Some(time);
    }
    if !current.is_empty() {
        sets.push(current);
    }
    sets
}

/// Whether a set of `len` files is merged. Single files are skipped unless
/// asked for, except with manual grouping where every set is merged.
pub fn keeps_set(len: usize, config: &BatchConfig) -> bool {
    len > 1 || (len == 1 && (config.include_singles || config.grouping == Grouping::Manual))
}
