//! Progress reporting for loading and merging.

use std::sync::Arc;

/// Progress information for a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeProgress {
    /// Completed steps of the current stage.
    pub current: usize,
    pub total: usize,
    pub stage: MergeStage,
}

/// Stage of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStage {
    /// Decoding raw files.
    Loading,
    Aligning,
    /// Response functions and layer mask.
    Analyzing,
    Composing,
}

/// Callback type for progress reporting.
pub type ProgressCallback = Option<Arc<dyn Fn(MergeProgress) + Send + Sync>>;

/// Report progress using the callback if set.
pub fn report_progress(
    callback: &ProgressCallback,
    current: usize,
    total: usize,
    stage: MergeStage,
) {
    if let Some(f) = callback.as_ref() {
        f(MergeProgress {
            current,
            total,
            stage,
        });
    }
}
