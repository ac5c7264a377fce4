use common::Buffer2;

use super::*;
use crate::config::ComposeConfig;
use crate::raw::CfaPattern;
use crate::testing::{init_tracing, Scene};

fn flat(width: usize, height: usize, value: u16) -> Exposure {
    Exposure::new(Buffer2::new_filled(width, height, value))
}

fn mono_params(width: usize, height: usize) -> RawParameters {
    RawParameters::new("test.raw", width, height, CfaPattern::monochrome())
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_add_keeps_brightest_first() {
    let mut stack = ExposureStack::new();
    assert_eq!(stack.add(flat(4, 4, 100)), 0);
    assert_eq!(stack.add(flat(4, 4, 400)), 0);
    assert_eq!(stack.add(flat(4, 4, 200)), 1);
    assert_eq!(stack.add(flat(4, 4, 50)), 3);

    let order: Vec<f64> = stack.exposures().iter().map(Exposure::brightness).collect();
    assert_eq!(order, vec![400.0, 200.0, 100.0, 50.0]);
    assert_eq!((stack.width(), stack.height()), (4, 4));
    assert!(!stack.is_cropped());
}

// ============================================================================
// Saturation
// ============================================================================

#[test]
fn test_saturation_level_ignores_rare_outliers() {
    let mut samples = vec![1000u16; 100 * 100];
    // 900 pixels clip at 3000, a single hot pixel reads 4000.
    samples[..900].fill(3000);
    samples[5000] = 4000;
    let mut stack = ExposureStack::new();
    stack.add(Exposure::new(Buffer2::new(100, 100, samples)));
    stack.add(flat(100, 100, 10));

    let params = mono_params(100, 100);
    let saturation = stack.calculate_saturation_level(
        &params,
        false,
        &SaturationConfig::default(),
        &ResponseConfig::default(),
    );
    // 3000 * 0.99, truncated.
    assert_eq!(saturation, 2970);
    assert_eq!(stack.saturation(), 2970);
    for exposure in stack.exposures() {
        assert_eq!(exposure.saturation(), 2970);
        assert_eq!(exposure.response().threshold(), 2673.0);
    }
}

#[test]
fn test_saturation_level_capped_by_white_level() {
    let mut stack = ExposureStack::new();
    stack.add(flat(50, 50, 5000));
    let mut params = mono_params(50, 50);
    params.max = 4000;

    let config = SaturationConfig::default();
    let response = ResponseConfig::default();
    assert_eq!(
        stack.calculate_saturation_level(&params, false, &config, &response),
        3960
    );
    // A custom white level is used as is.
    assert_eq!(
        stack.calculate_saturation_level(&params, true, &config, &response),
        4000
    );
}

#[test]
fn test_saturation_level_per_plane() {
    // Bayer RGGB: red clips at 2000, green at 3000, blue never clips.
    let params = RawParameters::new("a.raw", 64, 64, CfaPattern::bayer([[0, 1], [1, 2]]));
    let samples = (0..64 * 64)
        .map(|i| match params.plane_at(i % 64, i / 64) {
            0 => 2000,
            1 => 3000,
            _ => 500,
        })
        .collect();
    let mut stack = ExposureStack::new();
    stack.add(Exposure::new(Buffer2::new(64, 64, samples)));
    let saturation = stack.calculate_saturation_level(
        &params,
        true,
        &SaturationConfig::default(),
        &ResponseConfig::default(),
    );
    assert_eq!(saturation, 3000);
}

// ============================================================================
// Alignment and crop
// ============================================================================

#[test]
fn test_align_chains_displacements_to_darkest() {
    init_tracing();
    let (width, height) = (640, 480);
    let scene = Scene::for_crops(width, height, 11);
    let mut stack = ExposureStack::new();
    // Brightest to darkest: offsets relative to the scene.
    stack.add(scene.exposure(width, height, 38, 26, 4000.0));
    stack.add(scene.exposure(width, height, 20, 32, 2000.0));
    stack.add(scene.exposure(width, height, 0, 0, 1000.0));

    stack.align(&AlignConfig::default());
    let displacements: Vec<_> = stack.exposures().iter().map(Exposure::displacement).collect();
    assert_eq!(displacements, vec![(38, 26), (20, 32), (0, 0)]);
    assert!(stack.exposures().iter().all(|e| !e.has_pyramid()));
}

#[test]
fn test_align_single_exposure_is_noop() {
    let mut stack = ExposureStack::new();
    stack.add(flat(8, 8, 100));
    stack.align(&AlignConfig::default());
    assert_eq!(stack.exposure(0).displacement(), (0, 0));
}

#[test]
fn test_crop_intersects_footprints() {
    let mut stack = ExposureStack::new();
    stack.add(flat(100, 80, 300));
    stack.add(flat(100, 80, 200));
    stack.add(flat(100, 80, 100));
    stack.exposures[0].set_displacement(10, -4);
    stack.exposures[1].set_displacement(-6, 8);

    stack.crop();
    assert_eq!((stack.width(), stack.height()), (84, 68));
    assert!(stack.is_cropped());
    assert_eq!(stack.exposure(0).displacement(), (0, -12));
    assert_eq!(stack.exposure(1).displacement(), (-16, 0));
    assert_eq!(stack.exposure(2).displacement(), (-10, -8));
    // Every exposure covers the whole working area.
    for exposure in stack.exposures() {
        assert!(exposure.contains(0, 0));
        assert!(exposure.contains(83, 67));
    }
}

#[test]
fn test_crop_disjoint_footprints_is_empty() {
    let mut stack = ExposureStack::new();
    stack.add(flat(10, 10, 200));
    stack.add(flat(10, 10, 100));
    stack.exposures[0].set_displacement(20, 0);
    stack.crop();
    assert_eq!(stack.width(), 0);
}

// ============================================================================
// Response functions
// ============================================================================

#[test]
fn test_max_exposure_follows_response_functions() {
    init_tracing();
    let bright: Vec<u16> = (0..256 * 256)
        .map(|i| (((i % 256) * 7 + (i / 256) * 13) % 1000) as u16)
        .collect();
    let dark = bright.iter().map(|&v| v / 2).collect();
    let mut stack = ExposureStack::new();
    stack.add(Exposure::new(Buffer2::new(256, 256, dark)));
    stack.add(Exposure::new(Buffer2::new(256, 256, bright)));
    assert_eq!(stack.max_exposure(), 1.0);

    stack.compute_response_functions(&ResponseConfig::default());
    let ratio = stack.max_exposure();
    assert!((ratio - 2.0).abs() < 0.05, "max exposure = {ratio}");
}

// ============================================================================
// Mask
// ============================================================================

#[test]
fn test_single_exposure_mask_is_zero() {
    let mut stack = ExposureStack::new();
    stack.add(flat(16, 12, 65535));
    stack.calculate_saturation_level(
        &mono_params(16, 12),
        false,
        &SaturationConfig::default(),
        &ResponseConfig::default(),
    );
    stack.generate_mask();
    assert!(stack.mask().layers().iter().all(|&l| l == 0));
    assert_eq!(stack.original_mask(), stack.mask().layers());
}

fn saturated_patch_stack() -> ExposureStack {
    // Bright exposure saturated in a 4x4 patch at (10..14, 10..14).
    let mut bright = Buffer2::new_filled(32, 32, 800u16);
    for y in 10..14 {
        for x in 10..14 {
            bright[(x, y)] = 2000;
        }
    }
    let mut stack = ExposureStack::new();
    stack.add(Exposure::new(bright));
    stack.add(flat(32, 32, 400));
    let mut params = mono_params(32, 32);
    params.max = 2000;
    stack.calculate_saturation_level(
        &params,
        true,
        &SaturationConfig::default(),
        &ResponseConfig::default(),
    );
    stack
}

#[test]
fn test_mask_selects_darker_layer_around_saturation() {
    let mut stack = saturated_patch_stack();
    stack.generate_mask();
    let layers = stack.mask().layers();
    for y in 0..32 {
        for x in 0..32 {
            // The 3x3 neighbourhood widens the patch by one pixel.
            let expected = u8::from((9..15).contains(&x) && (9..15).contains(&y));
            assert_eq!(layers[(x, y)], expected, "({x}, {y})");
        }
    }
}

#[test]
fn test_mask_falls_back_where_layer_is_missing() {
    let mut stack = ExposureStack::new();
    stack.add(flat(20, 20, 800));
    stack.add(flat(20, 20, 400));
    stack.exposures[0].set_displacement(5, 0);
    stack.generate_mask();
    let layers = stack.mask().layers();
    assert_eq!(layers[(4, 3)], 1);
    assert_eq!(layers[(5, 3)], 0);
    assert!(!stack.is_layer_valid_at(0, 4, 3));
    assert!(stack.is_layer_valid_at(1, 4, 3));
    assert!(!stack.is_layer_valid_at(2, 4, 3));
}

#[test]
fn test_value_reads_selected_layer() {
    let mut stack = saturated_patch_stack();
    stack.generate_mask();
    assert_eq!(stack.value(0, 0), 800.0);
    assert_eq!(stack.value(11, 11), 400.0);
}

#[test]
fn test_mask_editing_respects_layer_coverage() {
    let mut stack = ExposureStack::new();
    stack.add(flat(20, 20, 800));
    stack.add(flat(20, 20, 400));
    stack.exposures[0].set_displacement(10, 0);
    stack.generate_mask();

    // Demote a disc of layer 0 to layer 1, then try to promote everything back.
    stack.start_mask_action(false, 0);
    stack.paint_mask(15, 10, 2);
    assert_eq!(stack.mask().at(15, 10), 1);

    stack.start_mask_action(true, 0);
    stack.paint_mask(10, 10, 5);
    // Layer 0 does not cover x < 10.
    assert_eq!(stack.mask().at(7, 10), 1);
    assert_eq!(stack.mask().at(13, 10), 0);

    let rect = stack.undo_mask();
    assert!(!rect.is_empty());
    assert_eq!(stack.mask().at(13, 10), 1);
    stack.redo_mask();
    assert_eq!(stack.mask().at(13, 10), 0);
    // Edits never touch the generated mask.
    assert_eq!(stack.original_mask()[(15, 10)], 0);
}

// ============================================================================
// Compose
// ============================================================================

#[test]
fn test_compose_without_saturation_is_brightest_rescaled() {
    init_tracing();
    let (width, height) = (48, 40);
    let scene = Scene::for_crops(width, height, 5);
    let bright = scene.crop(width, height, 0, 0, 1000.0, u16::MAX);
    let dark = scene.crop(width, height, 0, 0, 500.0, u16::MAX);
    let max_bright = f32::from(*bright.iter().max().unwrap());

    let mut stack = ExposureStack::new();
    stack.add(Exposure::new(bright.clone()));
    stack.add(Exposure::new(dark));
    let params = mono_params(width, height);
    // Saturation stays at the default 65535, nothing reaches it.
    stack.generate_mask();
    assert!(stack.mask().layers().iter().all(|&l| l == 0));

    let output = stack.compose(&params, &ComposeConfig::default());
    assert_eq!((output.width(), output.height()), (width, height));
    let mult = 65535.0 / max_bright;
    for (&out, &raw) in output.iter().zip(bright.iter()) {
        let expected = f32::from(raw) * mult;
        assert!((out - expected).abs() <= expected * 1e-5 + 1e-3, "{out} vs {expected}");
    }
}

#[test]
fn test_compose_replaces_saturated_pixels_with_darker_layer() {
    init_tracing();
    // Dark ramp on the left, bright clips on the right half.
    let (width, height) = (96, 80);
    let dark = Buffer2::new(
        width,
        height,
        (0..width * height)
            .map(|i| {
                let (x, y) = (i % width, i / width);
                if x < 48 {
                    (10 * x + y % 3) as u16
                } else {
                    2000
                }
            })
            .collect(),
    );
    let bright = Buffer2::new(
        width,
        height,
        dark.iter().map(|&v| (v * 2).min(3000)).collect(),
    );

    let mut stack = ExposureStack::new();
    stack.add(Exposure::new(bright));
    stack.add(Exposure::new(dark.clone()));
    let params = mono_params(width, height);
    stack.calculate_saturation_level(
        &params,
        false,
        &SaturationConfig::default(),
        &ResponseConfig::default(),
    );
    stack.compute_response_functions(&ResponseConfig::default());
    assert!((stack.exposure(0).relative_exposure() - 0.5).abs() < 1e-3);
    stack.generate_mask();
    assert!(stack.mask().layers().iter().any(|&l| l == 1));
    assert!(stack.mask().layers().iter().any(|&l| l == 0));

    let output = stack.compose(&params, &ComposeConfig::default());
    let max_dark = f32::from(*dark.iter().max().unwrap());
    let mult = 65535.0 / max_dark;
    for (&out, &d) in output.iter().zip(dark.iter()) {
        let expected = f32::from(d) * mult;
        assert!((out - expected).abs() <= expected * 1e-3 + 1e-2, "{out} vs {expected}");
    }
}

#[test]
fn test_compose_places_visible_area_and_restores_black() {
    let mut params = RawParameters::new("a.raw", 6, 5, CfaPattern::bayer([[0, 1], [1, 2]]));
    params.width = 4;
    params.height = 3;
    params.left_margin = 2;
    params.top_margin = 1;
    params.plane_black = [10, 20, 30, 0];
    params.adjust_black();
    params.max = 1010;

    let mut stack = ExposureStack::new();
    stack.add(flat(4, 3, 100));
    stack.calculate_saturation_level(
        &params,
        true,
        &SaturationConfig::default(),
        &ResponseConfig::default(),
    );
    stack.generate_mask();
    let output = stack.compose(&params, &ComposeConfig::default());

    assert_eq!((output.width(), output.height()), (6, 5));
    // Visible pixels: 100 scaled to max - max_black = 980, plus black.
    assert_eq!(output[(2, 1)], 980.0 + 10.0);
    assert_eq!(output[(3, 1)], 980.0 + 20.0);
    assert_eq!(output[(3, 2)], 980.0 + 30.0);
    // Margins carry only the black level of their plane: raw (0, 0) is
    // visible (-2, -1), a green site.
    assert_eq!(output[(0, 0)], 20.0);
    assert_eq!(output[(1, 0)], 30.0);
}
