use log::{debug, error, info, warn};
use shared::Stage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use super::artifacts::ScratchDir;
use super::{composite, normalize, select_subject, PipelineError};
use crate::backends::class_mapping::ClassMapping;
use crate::backends::{BackendError, ClassificationBackend, SegmentationBackend};
use crate::config::{PipelineSettings, SelectorSettings};
use crate::tasks::registry::TaskRegistry;

/// One queued run: the task it reports to and the stored image it reads.
/// The image is decoded by the worker, so queued runs hold no pixel data.
pub struct TaskInput {
    pub task_id: Uuid,
    pub source: PathBuf,
}

/// Runs the extraction pipeline for a task and records progress and outcome
/// in the registry.
pub struct Orchestrator {
    registry: TaskRegistry,
    segmenter: Arc<dyn SegmentationBackend>,
    classifier: Arc<dyn ClassificationBackend>,
    class_mapping: Arc<ClassMapping>,
    pipeline: PipelineSettings,
    selector: SelectorSettings,
    scratch: Option<ScratchDir>,
}

impl Orchestrator {
    pub fn new(
        registry: TaskRegistry,
        segmenter: Arc<dyn SegmentationBackend>,
        classifier: Arc<dyn ClassificationBackend>,
        class_mapping: Arc<ClassMapping>,
        pipeline: PipelineSettings,
        selector: SelectorSettings,
    ) -> Self {
        Self {
            registry,
            segmenter,
            classifier,
            class_mapping,
            pipeline,
            selector,
            scratch: None,
        }
    }

    /// Persist intermediates under `scratch` for the duration of each run.
    pub fn with_scratch(mut self, scratch: ScratchDir) -> Self {
        self.scratch = Some(scratch);
        self
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Runs to completion or failure; errors end up in the task record and
    /// are never returned.
    pub fn run(&self, input: TaskInput) {
        let task_id = input.task_id;
        info!("Task {} started", task_id);

        let outcome = match self.execute(task_id, &input.source) {
            Ok(label) => {
                let class_id = self.class_mapping.find_class_id(&label);
                info!("Task {} completed: {} (class {:?})", task_id, label, class_id);
                self.registry.complete_task(task_id, label, class_id)
            }
            Err(e) => {
                error!("Task {} failed: {}", task_id, e);
                self.registry.fail_task(task_id, e.to_string())
            }
        };

        if let Err(e) = outcome {
            warn!("Task {} outcome not recorded: {}", task_id, e);
        }
    }

    fn execute(&self, task_id: Uuid, source: &Path) -> Result<String, PipelineError> {
        let mut scratch = self
            .scratch
            .as_ref()
            .map(|dir| dir.session(task_id, self.pipeline.jpeg_quality));

        debug!("Task {} stage {}", task_id, Stage::CompressImage);
        let image = normalize::open(source)?;
        let normalized = normalize(&image, self.pipeline.normalized_side);
        drop(image);
        if let Some(session) = scratch.as_mut() {
            session.persist("normalized", &normalized)?;
        }
        self.registry.mark_step(task_id, Stage::CompressImage)?;

        debug!("Task {} stage {}", task_id, Stage::RemoveBackground);
        let mask = self.segmenter.segment(&normalized)?;
        let expected = (
            normalized.height() as usize,
            normalized.width() as usize,
        );
        if mask.dim() != expected {
            return Err(BackendError::ShapeMismatch {
                expected,
                actual: mask.dim(),
            }
            .into());
        }
        self.registry.mark_step(task_id, Stage::RemoveBackground)?;

        debug!("Task {} stage {}", task_id, Stage::CreateFinalImage);
        let subject = select_subject(&mask, &self.selector)?;
        let canonical = composite(
            &normalized,
            &subject,
            self.pipeline.canonical_side,
            &mut rand::rng(),
        );
        if let Some(session) = scratch.as_mut() {
            session.persist("canonical", &canonical)?;
        }
        self.registry.mark_step(task_id, Stage::CreateFinalImage)?;

        debug!("Task {} stage {}", task_id, Stage::Prediction);
        let label = self.classifier.classify(&canonical)?;
        self.registry.mark_step(task_id, Stage::Prediction)?;

        Ok(label)
    }
}
