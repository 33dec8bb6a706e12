use chrono::{DateTime, Utc};
use shared::{Stage, StepProgress, TaskStatus, TaskStatusResponse};
use uuid::Uuid;

/// Lifecycle of one submission. Only `Processing` accepts step updates and
/// only `Processing` can move to a terminal state.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Processing {
        steps: StepProgress,
    },
    Completed {
        steps: StepProgress,
        label: String,
        class_id: Option<u32>,
    },
    Failed {
        steps: StepProgress,
        error: String,
    },
}

impl Default for TaskState {
    fn default() -> Self {
        TaskState::Processing {
            steps: StepProgress::default(),
        }
    }
}

impl TaskState {
    pub fn steps(&self) -> &StepProgress {
        match self {
            TaskState::Processing { steps }
            | TaskState::Completed { steps, .. }
            | TaskState::Failed { steps, .. } => steps,
        }
    }

    pub fn status(&self) -> TaskStatus {
        match self {
            TaskState::Processing { .. } => TaskStatus::Processing,
            TaskState::Completed { .. } => TaskStatus::Completed,
            TaskState::Failed { .. } => TaskStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Processing { .. })
    }
}

#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: Uuid,
    /// Where the submitted image can be viewed.
    pub image_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: TaskState,
}

impl TaskRecord {
    pub fn new(image_url: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            image_url,
            created_at: now,
            updated_at: now,
            state: TaskState::default(),
        }
    }

    /// Returns `false` if the task already finished.
    pub fn mark_step(&mut self, stage: Stage) -> bool {
        match &mut self.state {
            TaskState::Processing { steps } => {
                steps.mark_done(stage);
                self.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    pub fn complete(&mut self, label: String, class_id: Option<u32>) -> bool {
        self.finish(|steps| TaskState::Completed {
            steps,
            label,
            class_id,
        })
    }

    pub fn fail(&mut self, error: String) -> bool {
        self.finish(|steps| TaskState::Failed { steps, error })
    }

    fn finish(&mut self, next: impl FnOnce(StepProgress) -> TaskState) -> bool {
        let TaskState::Processing { steps } = self.state else {
            return false;
        };
        self.state = next(steps);
        self.updated_at = Utc::now();
        true
    }

    pub fn to_response(&self) -> TaskStatusResponse {
        let (result, class_id, error) = match &self.state {
            TaskState::Processing { .. } => (None, None, None),
            TaskState::Completed {
                label, class_id, ..
            } => (Some(label.clone()), *class_id, None),
            TaskState::Failed { error, .. } => (None, None, Some(error.clone())),
        };

        TaskStatusResponse {
            task_id: self.id.to_string(),
            status: self.state.status(),
            steps: *self.state.steps(),
            result,
            class_id,
            error,
            image_url: self.image_url.clone(),
            created_at: self.created_at.to_rfc3339(),
            updated_at: self.updated_at.to_rfc3339(),
        }
    }
}
