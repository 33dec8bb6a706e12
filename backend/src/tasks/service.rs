use log::{info, warn};
use shared::{SubmitResponse, TaskStatusResponse};
use std::path::PathBuf;
use uuid::Uuid;

use super::registry::{RegistryError, TaskRegistry};
use super::worker_pool::{PoolError, WorkerPool};
use crate::pipeline::TaskInput;

#[derive(Debug, thiserror::Error)]
pub enum TaskServiceError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Entry point used by the HTTP layer: registers tasks, queues their runs
/// and answers status queries.
#[derive(Clone)]
pub struct TaskService {
    registry: TaskRegistry,
    pool: WorkerPool,
}

impl TaskService {
    pub fn new(registry: TaskRegistry, pool: WorkerPool) -> Self {
        Self { registry, pool }
    }

    /// Registers a task for an already validated image file and queues it.
    /// Returns as soon as the run is queued.
    pub fn submit(
        &self,
        image_url: String,
        source: PathBuf,
    ) -> Result<SubmitResponse, TaskServiceError> {
        let task = self.registry.create_task(image_url)?;

        if let Err(e) = self.pool.submit(TaskInput {
            task_id: task.id,
            source,
        }) {
            warn!("Rejecting task {}: {}", task.id, e);
            self.registry.remove_task(task.id)?;
            return Err(e.into());
        }

        info!("Task {} queued for {}", task.id, task.image_url);
        Ok(SubmitResponse {
            task_id: task.id.to_string(),
            status_url: format!("/api/tasks/{}", task.id),
        })
    }

    pub fn status(&self, task_id: Uuid) -> Result<Option<TaskStatusResponse>, TaskServiceError> {
        Ok(self
            .registry
            .get_task(task_id)?
            .map(|task| task.to_response()))
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}
