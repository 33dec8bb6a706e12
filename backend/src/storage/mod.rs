pub mod catalog;
pub mod uploads;

pub use catalog::Catalog;
pub use uploads::{StoredUpload, UploadStore};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid file format")]
    InvalidFormat,
    #[error("File too large")]
    FileTooLarge,
    #[error("Image path is not inside the catalog: {0}")]
    OutsideCatalog(String),
    #[error("Image is listed as invalid: {0}")]
    Blocked(String),
    #[error("Image not found: {0}")]
    NotFound(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
