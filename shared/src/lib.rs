use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    CompressImage,
    RemoveBackground,
    CreateFinalImage,
    Prediction,
}

/// Per-stage completion flags. Flags only ever go from `false` to `true`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepProgress {
    pub compress_image: bool,
    pub remove_background: bool,
    pub create_final_image: bool,
    pub prediction: bool,
}

impl StepProgress {
    pub fn mark_done(&mut self, stage: Stage) {
        *self.flag_mut(stage) = true;
    }

    pub fn is_done(&self, stage: Stage) -> bool {
        match stage {
            Stage::CompressImage => self.compress_image,
            Stage::RemoveBackground => self.remove_background,
            Stage::CreateFinalImage => self.create_final_image,
            Stage::Prediction => self.prediction,
        }
    }

    pub fn all_done(&self) -> bool {
        Stage::iter().all(|stage| self.is_done(stage))
    }

    fn flag_mut(&mut self, stage: Stage) -> &mut bool {
        match stage {
            Stage::CompressImage => &mut self.compress_image,
            Stage::RemoveBackground => &mut self.remove_background,
            Stage::CreateFinalImage => &mut self.create_final_image,
            Stage::Prediction => &mut self.prediction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Processing,
    Completed,
    Failed,
}

/// Body of `GET /api/tasks/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub steps: StepProgress,
    pub result: Option<String>,
    pub class_id: Option<u32>,
    pub error: Option<String>,
    pub image_url: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub task_id: String,
    pub status_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectRequest {
    pub selected_image: String,
}
