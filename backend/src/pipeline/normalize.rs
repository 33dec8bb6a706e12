use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use std::path::Path;

use super::PipelineError;

const PAD_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, PipelineError> {
    Ok(image::load_from_memory(bytes)?)
}

pub fn open(path: &Path) -> Result<DynamicImage, PipelineError> {
    Ok(image::open(path)?)
}

/// Letterboxes `image` into a `target_side` square: uniform Lanczos scale so
/// the longer side fits, centered on white. Nothing is cropped.
pub fn normalize(image: &DynamicImage, target_side: u32) -> RgbImage {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let (new_width, new_height) = fit_within(width, height, target_side);

    let resized = if (new_width, new_height) == (width, height) {
        rgb
    } else {
        imageops::resize(&rgb, new_width, new_height, FilterType::Lanczos3)
    };

    let mut canvas = RgbImage::from_pixel(target_side, target_side, PAD_COLOR);
    let x_offset = (target_side - new_width) / 2;
    let y_offset = (target_side - new_height) / 2;
    imageops::overlay(&mut canvas, &resized, i64::from(x_offset), i64::from(y_offset));
    canvas
}

/// Size of a `width`x`height` box scaled by `min(side/width, side/height)`,
/// truncated and clamped to `1..=side`.
pub(crate) fn fit_within(width: u32, height: u32, side: u32) -> (u32, u32) {
    let scale = f64::min(
        f64::from(side) / f64::from(width),
        f64::from(side) / f64::from(height),
    );
    let scaled = |v: u32| ((f64::from(v) * scale) as u32).clamp(1, side);
    (scaled(width), scaled(height))
}
