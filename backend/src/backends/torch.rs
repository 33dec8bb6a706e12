use image::RgbImage;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tch::{CModule, Device, Kind, TchError, Tensor};

use super::class_mapping::{ClassMapping, UNKNOWN_LABEL};
use super::{BackendError, ClassificationBackend, LabelMask, SegmentationBackend};

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

fn load_module(path: &Path, device: Device) -> Result<CModule, BackendError> {
    log::info!("Loading TorchScript module from {} on {:?}", path.display(), device);
    CModule::load_on_device(path, device)
        .map_err(|e| BackendError::ModelLoad(format!("{}: {}", path.display(), e)))
}

/// HWC u8 image to a normalized `[1, 3, H, W]` float tensor.
fn preprocess(image: &RgbImage, device: Device) -> Result<Tensor, TchError> {
    let (width, height) = image.dimensions();
    let data: Vec<f32> = image.as_raw().iter().map(|&v| f32::from(v) / 255.0).collect();
    let mean = Tensor::from_slice(&IMAGENET_MEAN).view([3, 1, 1]);
    let std = Tensor::from_slice(&IMAGENET_STD).view([3, 1, 1]);

    let tensor = Tensor::from_slice(&data)
        .f_view([height as i64, width as i64, 3])?
        .f_permute([2, 0, 1])?;
    let tensor = (tensor - mean) / std;
    tensor.f_unsqueeze(0)?.f_to_device(device)
}

/// DeepLabV3-style segmentation. The exported module must return the `out`
/// logits tensor `[1, classes, H', W']`.
#[derive(Clone)]
pub struct TorchSegmenter {
    model: Arc<Mutex<CModule>>,
    device: Device,
}

impl TorchSegmenter {
    pub fn load(path: &Path) -> Result<Self, BackendError> {
        let device = Device::cuda_if_available();
        let model = load_module(path, device)?;
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            device,
        })
    }

    fn run(&self, image: &RgbImage) -> Result<Vec<i64>, TchError> {
        let (width, height) = image.dimensions();
        let input = preprocess(image, self.device)?;
        let logits = {
            let model = self
                .model
                .lock()
                .map_err(|_| TchError::Kind("segmentation model lock poisoned".into()))?;
            tch::no_grad(|| model.forward_ts(&[input]))?
        };
        let logits = logits.f_upsample_bilinear2d(
            [height as i64, width as i64],
            false,
            None,
            None,
        )?;
        let labels = logits.f_argmax(1, false)?.f_to_kind(Kind::Int64)?;
        Vec::<i64>::try_from(labels.f_flatten(0, -1)?)
    }
}

impl SegmentationBackend for TorchSegmenter {
    fn segment(&self, image: &RgbImage) -> Result<LabelMask, BackendError> {
        let (width, height) = image.dimensions();
        let labels = self
            .run(image)
            .map_err(|e| BackendError::Segmentation(e.to_string()))?;
        LabelMask::from_shape_vec((height as usize, width as usize), labels)
            .map_err(|e| BackendError::Segmentation(e.to_string()))
    }
}

/// ResNet-style classifier whose argmax indexes the class mapping.
#[derive(Clone)]
pub struct TorchClassifier {
    model: Arc<Mutex<CModule>>,
    device: Device,
    class_mapping: Arc<ClassMapping>,
}

impl TorchClassifier {
    pub fn load(path: &Path, class_mapping: Arc<ClassMapping>) -> Result<Self, BackendError> {
        let device = Device::cuda_if_available();
        let model = load_module(path, device)?;
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            device,
            class_mapping,
        })
    }

    fn predict_class(&self, image: &RgbImage) -> Result<i64, TchError> {
        let input = preprocess(image, self.device)?;
        let output = {
            let model = self
                .model
                .lock()
                .map_err(|_| TchError::Kind("classification model lock poisoned".into()))?;
            tch::no_grad(|| model.forward_ts(&[input]))?
        };
        output.f_argmax(1, false)?.f_int64_value(&[0])
    }
}

impl ClassificationBackend for TorchClassifier {
    fn classify(&self, image: &RgbImage) -> Result<String, BackendError> {
        let class = self
            .predict_class(image)
            .map_err(|e| BackendError::Classification(e.to_string()))?;
        let label = u32::try_from(class)
            .ok()
            .and_then(|class| self.class_mapping.label_for(class))
            .unwrap_or(UNKNOWN_LABEL);
        log::debug!("Classifier predicted index {} -> {}", class, label);
        Ok(label.to_string())
    }
}
