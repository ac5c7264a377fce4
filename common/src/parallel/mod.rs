//! Parallel processing utilities.

use rayon::prelude::*;

#[cfg(test)]
mod tests;

/// Multiplier for number of chunks relative to CPU threads.
/// Using 3x threads provides good load balancing when some chunks finish faster.
const CHUNKS_PER_THREAD: usize = 3;

/// Compute optimal chunk size for the given length.
#[inline]
fn auto_chunk_size(len: usize) -> usize {
    let num_chunks = rayon::current_num_threads() * CHUNKS_PER_THREAD;
    (len / num_chunks).max(1)
}

// ============================================================================
// Row-aligned mutable chunks
// ============================================================================

/// Parallel iterator that prepends an offset to each item.
/// Wraps chunked iterators to provide `(offset, item)` pairs.
pub struct WithOffset<I> {
    inner: I,
    multiplier: usize,
}

impl<I> ParallelIterator for WithOffset<I>
where
    I: IndexedParallelIterator,
{
    type Item = (usize, I::Item);

    fn drive_unindexed<C>(self, consumer: C) -> C::Result
    where
        C: rayon::iter::plumbing::UnindexedConsumer<Self::Item>,
    {
        let multiplier = self.multiplier;
        self.inner
            .enumerate()
            .map(move |(idx, item)| (idx * multiplier, item))
            .drive_unindexed(consumer)
    }
}

impl<I> IndexedParallelIterator for WithOffset<I>
where
    I: IndexedParallelIterator,
{
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn drive<C>(self, consumer: C) -> C::Result
    where
        C: rayon::iter::plumbing::Consumer<Self::Item>,
    {
        let multiplier = self.multiplier;
        self.inner
            .enumerate()
            .map(move |(idx, item)| (idx * multiplier, item))
            .drive(consumer)
    }

    fn with_producer<CB>(self, callback: CB) -> CB::Output
    where
        CB: rayon::iter::plumbing::ProducerCallback<Self::Item>,
    {
        let multiplier = self.multiplier;
        self.inner
            .enumerate()
            .map(move |(idx, item)| (idx * multiplier, item))
            .with_producer(callback)
    }
}

/// Parallel iterator over row-aligned mutable chunks that yields `(chunk_start_row, chunk)` pairs.
pub type ParRowsMutWithOffset<'a, T> = WithOffset<rayon::slice::ChunksMut<'a, T>>;

/// Extension trait for row-aligned mutable parallel chunks with automatic sizing.
pub trait ParRowsMutAuto<'a, T: Send + 'a> {
    /// Split into mutable parallel chunks aligned to row boundaries.
    /// Returns an iterator yielding `(chunk_start_row, chunk)` pairs where chunk contains complete rows.
    fn par_rows_mut_auto(&'a mut self, width: usize) -> ParRowsMutWithOffset<'a, T>;
}

impl<'a, T: Send + 'a> ParRowsMutAuto<'a, T> for [T] {
    fn par_rows_mut_auto(&'a mut self, width: usize) -> ParRowsMutWithOffset<'a, T> {
        assert!(width > 0, "row width must be > 0");
        let height = self.len() / width;
        let chunk_rows = auto_chunk_size(height);
        WithOffset {
            inner: self.par_chunks_mut(width * chunk_rows),
            multiplier: chunk_rows,
        }
    }
}

// ============================================================================
// Row-range map-reduce
// ============================================================================

/// Folds rows `0..height` in parallel and merges the partial results.
///
/// Every worker owns an accumulator created by `identity` and feeds it one
/// row index at a time through `fold`; partial accumulators are combined with
/// `merge`. Returns `identity()` when `height` is 0.
pub fn par_fold_rows<A, I, F, M>(height: usize, identity: I, fold: F, merge: M) -> A
where
    A: Send,
    I: Fn() -> A + Sync + Send,
    F: Fn(A, usize) -> A + Sync + Send,
    M: Fn(A, A) -> A + Sync + Send,
{
    let chunk_rows = auto_chunk_size(height);
    (0..height.div_ceil(chunk_rows))
        .into_par_iter()
        .map(|chunk| {
            let start = chunk * chunk_rows;
            let end = (start + chunk_rows).min(height);
            (start..end).fold(identity(), &fold)
        })
        .reduce(&identity, &merge)
}

// ============================================================================
// Bounded parallel map
// ============================================================================

/// Maps `f` over `items` in parallel, with at most `max_concurrent` items in flight.
///
/// Semantically equivalent to `items.par_iter().map(f).collect()`, but processes
/// items in chunks of `max_concurrent` to limit resource usage.
///
/// # Panics
///
/// Panics if `max_concurrent` is 0.
pub fn par_map_limited<T, R, F>(items: &[T], max_concurrent: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    assert!(max_concurrent > 0, "max_concurrent must be > 0");

    let mut results = Vec::with_capacity(items.len());
    for chunk in items.chunks(max_concurrent) {
        let chunk_results: Vec<R> = chunk.par_iter().map(&f).collect();
        results.extend(chunk_results);
    }
    results
}
