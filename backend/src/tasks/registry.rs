use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use shared::Stage;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use super::model::TaskRecord;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Task not found: {0}")]
    NotFound(Uuid),
    #[error("Task {0} has already finished")]
    AlreadyFinished(Uuid),
    #[error("Task registry lock poisoned")]
    Poisoned,
}

/// In-memory task records keyed by id. Each record is written only by the
/// worker running it; any number of readers may poll concurrently.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<Uuid, TaskRecord>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_task(&self, image_url: String) -> Result<TaskRecord, RegistryError> {
        let task = TaskRecord::new(image_url);
        let mut tasks = self.tasks.write().map_err(|_| RegistryError::Poisoned)?;
        tasks.insert(task.id, task.clone());
        debug!("Task {} registered ({} tracked)", task.id, tasks.len());
        Ok(task)
    }

    pub fn get_task(&self, task_id: Uuid) -> Result<Option<TaskRecord>, RegistryError> {
        let tasks = self.tasks.read().map_err(|_| RegistryError::Poisoned)?;
        Ok(tasks.get(&task_id).cloned())
    }

    pub fn mark_step(&self, task_id: Uuid, stage: Stage) -> Result<(), RegistryError> {
        self.update(task_id, |task| task.mark_step(stage))?;
        debug!("Task {} finished step {}", task_id, stage);
        Ok(())
    }

    pub fn complete_task(
        &self,
        task_id: Uuid,
        label: String,
        class_id: Option<u32>,
    ) -> Result<(), RegistryError> {
        self.update(task_id, |task| task.complete(label, class_id))
    }

    pub fn fail_task(&self, task_id: Uuid, error: String) -> Result<(), RegistryError> {
        self.update(task_id, |task| task.fail(error))
    }

    pub fn remove_task(&self, task_id: Uuid) -> Result<Option<TaskRecord>, RegistryError> {
        let mut tasks = self.tasks.write().map_err(|_| RegistryError::Poisoned)?;
        Ok(tasks.remove(&task_id))
    }

    /// Drops finished tasks last updated before `now - retention`.
    pub fn evict_finished(
        &self,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<usize, RegistryError> {
        let cutoff = now - retention;
        let mut tasks = self.tasks.write().map_err(|_| RegistryError::Poisoned)?;
        let before = tasks.len();
        tasks.retain(|_, task| !(task.state.is_terminal() && task.updated_at < cutoff));
        Ok(before - tasks.len())
    }

    pub fn len(&self) -> usize {
        self.tasks.read().map(|tasks| tasks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Periodically evicts finished tasks on the current runtime.
    pub fn start_sweeper(&self, interval: std::time::Duration, retention: Duration) {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match registry.evict_finished(Utc::now(), retention) {
                    Ok(0) => {}
                    Ok(evicted) => info!("Evicted {} finished tasks", evicted),
                    Err(e) => warn!("Task sweep failed: {}", e),
                }
            }
        });
    }

    fn update<F>(&self, task_id: Uuid, apply: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut TaskRecord) -> bool,
    {
        let mut tasks = self.tasks.write().map_err(|_| RegistryError::Poisoned)?;
        let task = tasks.get_mut(&task_id).ok_or(RegistryError::NotFound(task_id))?;
        if apply(task) {
            Ok(())
        } else {
            Err(RegistryError::AlreadyFinished(task_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::TaskStatus;

    #[test]
    fn test_unknown_task_is_none() {
        let registry = TaskRegistry::new();
        assert!(registry.get_task(Uuid::new_v4()).unwrap().is_none());
        assert!(matches!(
            registry.mark_step(Uuid::new_v4(), Stage::Prediction),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_lifecycle_through_registry() {
        let registry = TaskRegistry::new();
        let task = registry.create_task("/uploads/a.jpg".into()).unwrap();
        assert_eq!(registry.len(), 1);

        registry.mark_step(task.id, Stage::CompressImage).unwrap();
        let seen = registry.get_task(task.id).unwrap().unwrap();
        assert!(seen.state.steps().compress_image);
        assert_eq!(seen.state.status(), TaskStatus::Processing);

        registry.complete_task(task.id, "Robin".into(), Some(4)).unwrap();
        let seen = registry.get_task(task.id).unwrap().unwrap().to_response();
        assert_eq!(seen.status, TaskStatus::Completed);
        assert_eq!(seen.result.as_deref(), Some("Robin"));
    }

    #[test]
    fn test_finished_task_rejects_updates() {
        let registry = TaskRegistry::new();
        let task = registry.create_task(String::new()).unwrap();
        registry.fail_task(task.id, "No subject detected".into()).unwrap();

        assert!(matches!(
            registry.complete_task(task.id, "Robin".into(), None),
            Err(RegistryError::AlreadyFinished(_))
        ));
        assert!(matches!(
            registry.mark_step(task.id, Stage::Prediction),
            Err(RegistryError::AlreadyFinished(_))
        ));
        let seen = registry.get_task(task.id).unwrap().unwrap();
        assert_eq!(seen.state.status(), TaskStatus::Failed);
    }

    #[test]
    fn test_evicts_only_old_finished_tasks() {
        let registry = TaskRegistry::new();
        let running = registry.create_task(String::new()).unwrap();
        let done = registry.create_task(String::new()).unwrap();
        let failed = registry.create_task(String::new()).unwrap();
        registry.complete_task(done.id, "Robin".into(), None).unwrap();
        registry.fail_task(failed.id, "boom".into()).unwrap();

        let retention = Duration::seconds(60);
        assert_eq!(registry.evict_finished(Utc::now(), retention).unwrap(), 0);

        let later = Utc::now() + Duration::seconds(120);
        assert_eq!(registry.evict_finished(later, retention).unwrap(), 2);
        assert!(registry.get_task(running.id).unwrap().is_some());
        assert!(registry.get_task(done.id).unwrap().is_none());
        assert!(registry.get_task(failed.id).unwrap().is_none());
    }

    #[test]
    fn test_concurrent_readers_see_consistent_state() {
        let registry = TaskRegistry::new();
        let task = registry.create_task(String::new()).unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let response = registry.get_task(task.id).unwrap().unwrap().to_response();
                        match response.status {
                            TaskStatus::Completed => assert!(response.result.is_some()),
                            TaskStatus::Failed => assert!(response.error.is_some()),
                            TaskStatus::Processing => {
                                assert!(response.result.is_none() && response.error.is_none())
                            }
                        }
                    }
                })
            })
            .collect();

        for stage in [
            Stage::CompressImage,
            Stage::RemoveBackground,
            Stage::CreateFinalImage,
            Stage::Prediction,
        ] {
            registry.mark_step(task.id, stage).unwrap();
        }
        registry.complete_task(task.id, "Robin".into(), None).unwrap();

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
