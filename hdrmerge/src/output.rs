//! Writers for the merged raster and the layer mask.

use std::fs::File;
use std::path::Path;
use std::time::Instant;

use common::Buffer2;
use image::GrayImage;
use tiff::encoder::{colortype, TiffEncoder};

use crate::error::OutputError;

/// Writes `raster` as a single-channel 32-bit float TIFF.
pub fn write_float_tiff(path: &Path, raster: &Buffer2<f32>) -> Result<(), OutputError> {
    let start = Instant::now();
    let tiff_error = |source: tiff::TiffError| OutputError::Tiff {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::create(path).map_err(|source| OutputError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    let mut tiff = TiffEncoder::new(&mut file).map_err(tiff_error)?;
    let image = tiff
        .new_image::<colortype::Gray32Float>(raster.width() as u32, raster.height() as u32)
        .map_err(tiff_error)?;
    image.write_data(raster.pixels()).map_err(tiff_error)?;

    tracing::info!(
        "Wrote {}x{} float TIFF to {} in {:.2}ms",
        raster.width(),
        raster.height(),
        path.display(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(())
}

/// Gray level of `layer` out of `num_layers`: evenly spaced, the last layer white.
fn layer_gray(layer: u8, num_layers: usize) -> u8 {
    let layer = usize::from(layer);
    if layer + 1 >= num_layers {
        u8::MAX
    } else {
        (256 * layer / num_layers) as u8
    }
}

/// Writes the layer map as an 8-bit grayscale PNG.
pub fn write_mask_png(
    path: &Path,
    layers: &Buffer2<u8>,
    num_layers: usize,
) -> Result<(), OutputError> {
    let image = GrayImage::from_fn(layers.width() as u32, layers.height() as u32, |x, y| {
        image::Luma([layer_gray(layers[(x as usize, y as usize)], num_layers)])
    });
    image.save(path).map_err(|source| OutputError::Mask {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("Wrote layer mask to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tiff::decoder::{Decoder, DecodingResult};

    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("hdrmerge_{}_{name}", std::process::id()))
    }

    #[test]
    fn test_float_tiff_preserves_values() {
        let path = temp_path("raster.tif");
        let raster = Buffer2::new(3, 2, vec![0.0, 0.5, 1.0, 1024.25, 65535.0, 3.0e-3]);
        write_float_tiff(&path, &raster).unwrap();

        let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(decoder.dimensions().unwrap(), (3, 2));
        match decoder.read_image().unwrap() {
            DecodingResult::F32(values) => assert_eq!(values, raster.pixels()),
            _ => panic!("expected 32-bit float samples"),
        }
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_float_tiff_unwritable_path() {
        let path = Path::new("/nonexistent/dir/raster.tif");
        let err = write_float_tiff(path, &Buffer2::new_default(2, 2)).unwrap_err();
        assert!(matches!(err, OutputError::Create { .. }));
    }

    #[test]
    fn test_layer_gray_levels() {
        assert_eq!(layer_gray(0, 4), 0);
        assert_eq!(layer_gray(1, 4), 64);
        assert_eq!(layer_gray(2, 4), 128);
        assert_eq!(layer_gray(3, 4), 255);
        // A single layer is white.
        assert_eq!(layer_gray(0, 1), 255);
    }

    #[test]
    fn test_mask_png_gray_levels() {
        let path = temp_path("mask.png");
        let layers = Buffer2::new(3, 1, vec![0u8, 1, 2]);
        write_mask_png(&path, &layers, 3).unwrap();

        let image = image::open(&path).unwrap().to_luma8();
        assert_eq!(image.dimensions(), (3, 1));
        let gray: Vec<u8> = image.pixels().map(|p| p.0[0]).collect();
        assert_eq!(gray, vec![0, 85, 255]);
        std::fs::remove_file(&path).unwrap();
    }
}
