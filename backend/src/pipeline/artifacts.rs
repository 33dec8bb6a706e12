use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::PipelineError;

/// Directory holding per-task intermediate images.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session(&self, task_id: Uuid, jpeg_quality: u8) -> ScratchSession {
        ScratchSession {
            root: self.root.clone(),
            task_id,
            jpeg_quality,
            files: Vec::new(),
        }
    }
}

/// Files written during one task run. Everything is deleted on drop, whether
/// the run succeeded or not.
#[derive(Debug)]
pub struct ScratchSession {
    root: PathBuf,
    task_id: Uuid,
    jpeg_quality: u8,
    files: Vec<PathBuf>,
}

impl ScratchSession {
    pub fn persist(&mut self, name: &str, image: &RgbImage) -> Result<PathBuf, PipelineError> {
        let path = self.root.join(format!("{}_{}.jpg", self.task_id, name));
        let artifact_error = |reason: String| PipelineError::Artifact {
            name: name.to_string(),
            reason,
        };

        let file = File::create(&path).map_err(|e| artifact_error(e.to_string()))?;
        // Track before encoding so a half-written file is still removed.
        self.files.push(path.clone());

        let mut writer = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut writer, self.jpeg_quality)
            .encode_image(image)
            .map_err(|e| artifact_error(e.to_string()))?;
        writer.flush().map_err(|e| artifact_error(e.to_string()))?;

        log::debug!("Task {} wrote {}", self.task_id, path.display());
        Ok(path)
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl Drop for ScratchSession {
    fn drop(&mut self) {
        for path in self.files.drain(..) {
            if let Err(e) = fs::remove_file(&path) {
                log::warn!("Failed to remove intermediate {}: {}", path.display(), e);
            }
        }
    }
}
