use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use rand::Rng;

use super::normalize::fit_within;
use super::selector::Subject;

/// Cuts the subject out of `image` and centers it on a `canonical_side`
/// square of uniform noise, then swaps channel order for the classifier.
///
/// The noise background keeps the classifier from keying on a solid color.
/// Only pixels under the subject mask are deterministic.
pub fn composite<R: Rng + ?Sized>(
    image: &RgbImage,
    subject: &Subject,
    canonical_side: u32,
    rng: &mut R,
) -> RgbImage {
    let bbox = subject.bbox;
    let crop = imageops::crop_imm(image, bbox.x, bbox.y, bbox.width, bbox.height).to_image();

    let (new_width, new_height) = fit_within(bbox.width, bbox.height, canonical_side);
    let resized = imageops::resize(&crop, new_width, new_height, FilterType::Triangle);
    let mask = imageops::resize(&subject.mask, new_width, new_height, FilterType::Nearest);

    let mut canvas = noise_canvas(canonical_side, rng);
    let x_offset = (canonical_side - new_width) / 2;
    let y_offset = (canonical_side - new_height) / 2;

    for (x, y, pixel) in resized.enumerate_pixels() {
        if mask.get_pixel(x, y)[0] > 0 {
            canvas.put_pixel(x_offset + x, y_offset + y, *pixel);
        }
    }

    bgr_to_rgb(&mut canvas);
    canvas
}

pub fn noise_canvas<R: Rng + ?Sized>(side: u32, rng: &mut R) -> RgbImage {
    RgbImage::from_fn(side, side, |_, _| Rgb([rng.random(), rng.random(), rng.random()]))
}

/// Swaps the first and third channel in place. The classifier was trained on
/// frames that went through this swap, so it is applied unconditionally.
pub fn bgr_to_rgb(image: &mut RgbImage) {
    for pixel in image.pixels_mut() {
        pixel.0.swap(0, 2);
    }
}
