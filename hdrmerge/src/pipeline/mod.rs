//! Loading a bracketed set of raw files into an aligned exposure stack, and
//! composing the stack into the merged raster.


use std::path::PathBuf;
use std::time::Instant;

use common::parallel::par_map_limited;
use common::Buffer2;

use crate::config::{ComposeConfig, LoadConfig};
use crate::error::LoadError;
use crate::exposure::Exposure;
use crate::progress::{report_progress, MergeStage, ProgressCallback};
use crate::raw::{RawDecoder, RawFrame, RawParameters};
use crate::stack::ExposureStack;

/// An analyzed stack ready to be composed.
#[derive(Debug, Clone)]
pub struct LoadedStack {
    stack: ExposureStack,
    /// Parameters of each exposure, in stack order.
    params: Vec<RawParameters>,
}

/// Result of a merge: the raster at raw dimensions and the parameters it was
/// composed with.
#[derive(Debug, Clone)]
pub struct MergedImage {
    pub raster: Buffer2<f32>,
    pub params: RawParameters,
}

/// Decodes `paths`, builds the exposure stack and runs every analysis step
/// that precedes composition.
///
/// Any decode failure or format mismatch aborts the whole load.
pub fn load_stack<D>(
    paths: &[PathBuf],
    decoder: &D,
    config: &LoadConfig,
    progress: &ProgressCallback,
) -> Result<LoadedStack, LoadError>
where
    D: RawDecoder + ?Sized,
{
    config.validate()?;
    if paths.is_empty() {
        return Err(LoadError::NoInputs);
    }
    let start = Instant::now();
    let total = paths.len();
    report_progress(progress, 0, total, MergeStage::Loading);

    let decoded = par_map_limited(paths, config.max_parallel_decodes, |path| {
        decoder.decode(path)
    });
    let mut frames = Vec::with_capacity(total);
    for (path, result) in paths.iter().zip(decoded) {
        let frame = result.map_err(|e| LoadError::Decode {
            path: path.clone(),
            reason: format!("{e:#}"),
        })?;
        frames.push(frame);
    }
    check_formats(&frames)?;
    report_progress(progress, total, total, MergeStage::Loading);

    let mut stack = ExposureStack::new();
    let mut params: Vec<RawParameters> = Vec::with_capacity(total);
    for frame in &frames {
        let index = stack.add(Exposure::from_raw(frame));
        params.insert(index, frame.params.clone());
    }
    drop(frames);
    tracing::info!(
        "Loaded {} exposures in {:.2}ms",
        stack.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    // A custom white level only bounds the saturation search; every frame
    // keeps its own white level for the responses and the output scale.
    let mut brightest = params[0].clone();
    if let Some(white_level) = config.white_level {
        brightest.max = brightest.max.min(white_level);
    }
    stack.calculate_saturation_level(
        &brightest,
        config.white_level.is_some(),
        &config.saturation,
        &config.response,
    );

    let cfa = &params[0].cfa;
    if config.align && cfa.can_align() {
        report_progress(progress, 0, 1, MergeStage::Aligning);
        stack.align(&config.alignment);
        if config.crop {
            stack.crop();
        }
        report_progress(progress, 1, 1, MergeStage::Aligning);
    } else if config.align {
        tracing::warn!("Color filter period {:?} cannot be aligned, skipping", cfa.period());
    }

    report_progress(progress, 0, 2, MergeStage::Analyzing);
    stack.compute_response_functions(&config.response);
    report_progress(progress, 1, 2, MergeStage::Analyzing);
    stack.generate_mask();
    report_progress(progress, 2, 2, MergeStage::Analyzing);

    Ok(LoadedStack { stack, params })
}

/// Every frame must share the first frame's sensor layout.
fn check_formats(frames: &[RawFrame]) -> Result<(), LoadError> {
    let Some((first, rest)) = frames.split_first() else {
        return Ok(());
    };
    match rest
        .iter()
        .find(|frame| !frame.params.is_same_format(&first.params))
    {
        Some(frame) => Err(LoadError::FormatMismatch {
            path: frame.params.path.clone(),
            reference: first.params.path.clone(),
        }),
        None => Ok(()),
    }
}

impl LoadedStack {
    #[inline]
    pub fn stack(&self) -> &ExposureStack {
        &self.stack
    }

    /// Mutable access for mask editing.
    #[inline]
    pub fn stack_mut(&mut self) -> &mut ExposureStack {
        &mut self.stack
    }

    /// Parameters of each exposure, brightest first.
    #[inline]
    pub fn params(&self) -> &[RawParameters] {
        &self.params
    }

    /// Composes the stack with the darkest exposure's parameters.
    pub fn compose(&self, config: &ComposeConfig, progress: &ProgressCallback) -> MergedImage {
        report_progress(progress, 0, 1, MergeStage::Composing);
        let last = self.stack.len() - 1;
        let mut params = self.params[last].clone();
        params.width = self.stack.width();
        params.height = self.stack.height();
        params.adjust_white(self.stack.exposure(last).samples());

        let raster = self.stack.compose(&params, config);
        report_progress(progress, 1, 1, MergeStage::Composing);
        MergedImage { raster, params }
    }
}
