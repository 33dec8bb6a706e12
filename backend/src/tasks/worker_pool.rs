use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};

use crate::config::WorkerSettings;
use crate::pipeline::{Orchestrator, TaskInput};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Task queue is full")]
    QueueFull,
    #[error("Worker pool has shut down")]
    Closed,
}

/// Fixed set of workers draining a bounded queue of pipeline runs.
#[derive(Clone)]
pub struct WorkerPool {
    sender: mpsc::Sender<TaskInput>,
    // Held here too so the queue stays open when no worker is running.
    _receiver: Arc<Mutex<mpsc::Receiver<TaskInput>>>,
    workers: usize,
}

impl WorkerPool {
    /// Spawns the workers on the current runtime. Each run executes on the
    /// blocking thread pool.
    pub fn start(settings: &WorkerSettings, orchestrator: Arc<Orchestrator>) -> Self {
        let capacity = settings.queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel::<TaskInput>(capacity);
        let receiver = Arc::new(Mutex::new(receiver));

        for worker_id in 0..settings.count {
            let receiver = receiver.clone();
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some(input) = next else { break };
                    let task_id = input.task_id;
                    debug!("Worker {} picked up task {}", worker_id, task_id);

                    let runner = orchestrator.clone();
                    let run = tokio::task::spawn_blocking(move || runner.run(input));
                    if let Err(e) = run.await {
                        error!("Worker {} crashed on task {}: {}", worker_id, task_id, e);
                        orchestrator
                            .registry()
                            .fail_task(task_id, "Internal error while processing image".into())
                            .ok();
                    }
                }
                debug!("Worker {} stopped", worker_id);
            });
        }

        if settings.count == 0 {
            warn!("No pipeline workers configured; submitted tasks will stay queued");
        }
        info!(
            "Started {} pipeline workers (queue capacity {})",
            settings.count, capacity
        );
        Self {
            sender,
            _receiver: receiver,
            workers: settings.count,
        }
    }

    pub fn submit(&self, input: TaskInput) -> Result<(), PoolError> {
        self.sender.try_send(input).map_err(|e| match e {
            TrySendError::Full(_) => PoolError::QueueFull,
            TrySendError::Closed(_) => PoolError::Closed,
        })
    }

    /// Runs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}
