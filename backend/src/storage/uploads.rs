use log::{info, warn};
use rand::distr::Alphanumeric;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};

use super::StorageError;

pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// A file accepted into the upload directory.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub file_name: String,
    pub path: PathBuf,
    pub url: String,
}

#[derive(Clone)]
pub struct UploadStore {
    root: PathBuf,
    max_bytes: usize,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root, max_bytes })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lower-cased extension of `file_name` if it is an accepted image type.
    pub fn extract_file_extension(file_name: &str) -> Result<String, StorageError> {
        let (_, extension) = file_name.rsplit_once('.').ok_or(StorageError::InvalidFormat)?;
        let extension = extension.to_ascii_lowercase();
        if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            Ok(extension)
        } else {
            Err(StorageError::InvalidFormat)
        }
    }

    pub fn generate_file_name(extension: &str) -> String {
        let stem: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        format!("{}.{}", stem, extension)
    }

    pub fn validate_image_size(&self, image_data: &[u8]) -> Result<(), StorageError> {
        if image_data.len() > self.max_bytes {
            return Err(StorageError::FileTooLarge);
        }
        Ok(())
    }

    /// Stores the bytes under a fresh random name, keeping only the
    /// extension of the client supplied name.
    pub fn save(
        &self,
        original_name: &str,
        image_data: &[u8],
    ) -> Result<StoredUpload, StorageError> {
        let extension = Self::extract_file_extension(original_name)?;
        self.validate_image_size(image_data)?;

        let file_name = Self::generate_file_name(&extension);
        let path = self.root.join(&file_name);
        fs::write(&path, image_data).map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;
        info!("Stored upload {} ({} bytes)", file_name, image_data.len());

        Ok(StoredUpload {
            url: Self::url_for(&file_name),
            file_name,
            path,
        })
    }

    /// Removes an upload that no task will reference.
    pub fn discard(&self, upload: &StoredUpload) {
        match fs::remove_file(&upload.path) {
            Ok(()) => info!("Discarded upload {}", upload.file_name),
            Err(e) => warn!("Failed to discard upload {}: {}", upload.path.display(), e),
        }
    }

    pub fn url_for(file_name: &str) -> String {
        format!("/uploads/{}", file_name)
    }
}
