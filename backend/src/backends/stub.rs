// Stand-ins used when the binary is built without the `torch` feature.
// They keep the service runnable end to end; predictions are always unknown.

use image::RgbImage;

use super::class_mapping::UNKNOWN_LABEL;
use super::{BackendError, ClassificationBackend, LabelMask, SegmentationBackend};

/// Treats every pixel darker than `white_threshold` on any channel as
/// foreground. The normalizer pads with pure white, so the letterbox bars are
/// always background.
pub struct StubSegmenter {
    pub white_threshold: u8,
}

impl Default for StubSegmenter {
    fn default() -> Self {
        Self {
            white_threshold: 240,
        }
    }
}

impl SegmentationBackend for StubSegmenter {
    fn segment(&self, image: &RgbImage) -> Result<LabelMask, BackendError> {
        log::warn!("Stub segmentation - thresholding against white background");
        let (width, height) = image.dimensions();
        Ok(LabelMask::from_shape_fn(
            (height as usize, width as usize),
            |(row, col)| {
                let pixel = image.get_pixel(col as u32, row as u32);
                i64::from(pixel.0.iter().any(|&c| c < self.white_threshold))
            },
        ))
    }
}

pub struct StubClassifier;

impl ClassificationBackend for StubClassifier {
    fn classify(&self, _image: &RgbImage) -> Result<String, BackendError> {
        log::warn!("Stub classification - no actual prediction performed");
        Ok(UNKNOWN_LABEL.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_stub_segmenter_marks_non_white_pixels() {
        let mut image = RgbImage::from_pixel(8, 4, Rgb([255, 255, 255]));
        image.put_pixel(5, 2, Rgb([30, 120, 60]));

        let mask = StubSegmenter::default().segment(&image).unwrap();
        assert_eq!(mask.dim(), (4, 8));
        assert_eq!(mask[[2, 5]], 1);
        assert_eq!(mask.iter().sum::<i64>(), 1);
    }

    #[test]
    fn test_stub_classifier_is_unknown() {
        let image = RgbImage::new(224, 224);
        assert_eq!(StubClassifier.classify(&image).unwrap(), UNKNOWN_LABEL);
    }
}
