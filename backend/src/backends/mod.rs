pub mod class_mapping;
pub mod stub;
#[cfg(feature = "torch")]
pub mod torch;

use image::RgbImage;
use ndarray::Array2;
use std::sync::Arc;

use crate::config::ModelSettings;
use class_mapping::ClassMapping;

/// Per-pixel class labels indexed `[row, col]`. `0` is background.
pub type LabelMask = Array2<i64>;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Segmentation failed: {0}")]
    Segmentation(String),
    #[error("Classification failed: {0}")]
    Classification(String),
    #[error("Mask is {actual:?} but image is {expected:?} (rows, cols)")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("Model loading failed: {0}")]
    ModelLoad(String),
}

/// Produces a label mask at the resolution of the input image.
pub trait SegmentationBackend: Send + Sync {
    fn segment(&self, image: &RgbImage) -> Result<LabelMask, BackendError>;
}

/// Names the subject of a canonical frame, or returns the unknown sentinel.
pub trait ClassificationBackend: Send + Sync {
    fn classify(&self, image: &RgbImage) -> Result<String, BackendError>;
}

pub type Backends = (Arc<dyn SegmentationBackend>, Arc<dyn ClassificationBackend>);

#[cfg(feature = "torch")]
pub fn load(
    settings: &ModelSettings,
    class_mapping: Arc<ClassMapping>,
) -> Result<Backends, BackendError> {
    let segmenter = torch::TorchSegmenter::load(&settings.segmentation)?;
    let classifier = torch::TorchClassifier::load(&settings.classifier, class_mapping)?;
    Ok((Arc::new(segmenter), Arc::new(classifier)))
}

#[cfg(not(feature = "torch"))]
pub fn load(
    settings: &ModelSettings,
    _class_mapping: Arc<ClassMapping>,
) -> Result<Backends, BackendError> {
    log::warn!(
        "Built without the `torch` feature; ignoring {} and {} and using stub backends",
        settings.segmentation.display(),
        settings.classifier.display()
    );
    Ok((
        Arc::new(stub::StubSegmenter::default()),
        Arc::new(stub::StubClassifier),
    ))
}
