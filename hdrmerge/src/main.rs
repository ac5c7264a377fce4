//! Command-line front end: merges bracketed raw files into float TIFFs, one
//! per bracketed set.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use common::log_setup::{setup_logging, LogOptions};

use hdrmerge::{
    bracketed_sets, keeps_set, load_stack, write_float_tiff, write_mask_png, Grouping,
    MergeConfig, RawloaderDecoder,
};

#[derive(Parser)]
#[command(name = "hdrmerge")]
#[command(about = "Merge bracketed raw exposures into a high dynamic range raw")]
struct Args {
    /// Raw files, one bracketed series or several with --group
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Output TIFF of a single set (default: <first file of the set>_hdr.tif)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write the layer mask of a single set as a grayscale PNG
    #[arg(short, long)]
    mask: Option<PathBuf>,

    /// How the input files are grouped into bracketed sets
    #[arg(short = 'G', long, value_enum)]
    group: Option<Grouping>,

    /// Files per set when grouping manually
    #[arg(short = 's', long)]
    bracket_size: Option<usize>,

    /// Largest gap in seconds between captures of one set when grouping automatically
    #[arg(short, long)]
    gap: Option<f64>,

    /// Merge sets that hold a single file instead of skipping them
    #[arg(long)]
    single: bool,

    /// Feather radius of the layer transitions in pixels
    #[arg(short = 'r', long)]
    feather_radius: Option<usize>,

    /// Custom white level
    #[arg(short, long)]
    white_level: Option<u16>,

    /// Do not align the exposures
    #[arg(long)]
    no_align: bool,

    /// Do not crop to the common area of the aligned exposures
    #[arg(long)]
    no_crop: bool,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&LogOptions {
        level: args.log_level.clone(),
        ..LogOptions::default()
    })?;
    run(&args)
}

fn run(args: &Args) -> Result<()> {
    let start = Instant::now();
    let mut config = match &args.config {
        Some(path) => MergeConfig::from_yaml_file(path)?,
        None => MergeConfig::default(),
    };
    if let Some(radius) = args.feather_radius {
        config.compose.feather_radius = radius;
    }
    if args.white_level.is_some() {
        config.load.white_level = args.white_level;
    }
    config.load.align &= !args.no_align;
    config.load.crop &= !args.no_crop;
    if let Some(grouping) = args.group {
        config.batch.grouping = grouping;
    }
    if let Some(size) = args.bracket_size {
        config.batch.bracket_size = size;
    }
    if let Some(gap) = args.gap {
        config.batch.gap_seconds = gap;
    }
    config.batch.include_singles |= args.single;
    config.validate()?;

    let sets: Vec<Vec<PathBuf>> = bracketed_sets(&args.files, &RawloaderDecoder, &config.batch)
        .into_iter()
        .filter(|set| {
            let keep = keeps_set(set.len(), &config.batch);
            if let (false, Some(first)) = (keep, set.first()) {
                tracing::info!("Skipping single image {}", first.display());
            }
            keep
        })
        .collect();
    if sets.len() > 1 && (args.output.is_some() || args.mask.is_some()) {
        bail!("--output and --mask name a single file, but the inputs form {} sets", sets.len());
    }

    let mut failed = 0;
    for set in &sets {
        if let Err(e) = merge_set(set, args, &config) {
            tracing::error!("{e:#}");
            failed += 1;
        }
    }
    tracing::info!(
        "Merged {} of {} sets in {:.2}s",
        sets.len() - failed,
        sets.len(),
        start.elapsed().as_secs_f64()
    );
    if failed > 0 {
        bail!("{failed} of {} sets failed to merge", sets.len());
    }
    Ok(())
}

fn merge_set(files: &[PathBuf], args: &Args, config: &MergeConfig) -> Result<()> {
    let start = Instant::now();
    let loaded = load_stack(files, &RawloaderDecoder, &config.load, &None)
        .context("Failed to load exposures")?;
    let merged = loaded.compose(&config.compose, &None);

    let output = match &args.output {
        Some(path) => path.clone(),
        None => default_output(&files[0]),
    };
    write_float_tiff(&output, &merged.raster)?;
    if let Some(mask) = &args.mask {
        let stack = loaded.stack();
        write_mask_png(mask, stack.mask().layers(), stack.len())?;
    }

    tracing::info!(
        "Merged {} exposures into {} in {:.2}s",
        loaded.stack().len(),
        output.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

/// `<dir>/<stem>_hdr.tif` next to the first input.
fn default_output(first: &Path) -> PathBuf {
    let stem = first
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "merged".to_string());
    first.with_file_name(format!("{stem}_hdr.tif"))
}
