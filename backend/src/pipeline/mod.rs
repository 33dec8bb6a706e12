pub mod artifacts;
pub mod compositor;
pub mod normalize;
pub mod orchestrator;
pub mod selector;

pub use compositor::composite;
pub use normalize::normalize;
pub use orchestrator::{Orchestrator, TaskInput};
pub use selector::{select_subject, BoundingBox, Subject};

use crate::backends::BackendError;
use crate::tasks::registry::RegistryError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid input image: {0}")]
    Input(#[from] image::ImageError),
    #[error("No subject detected")]
    NoSubject,
    #[error("Subject too small ({width}x{height})")]
    SubjectTooSmall { width: u32, height: u32 },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Failed to write intermediate {name}: {reason}")]
    Artifact { name: String, reason: String },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
