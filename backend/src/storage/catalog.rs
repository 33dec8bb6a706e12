use log::{info, warn};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use super::StorageError;

/// Read-only directory of sample images that can be submitted by relative
/// path instead of uploading.
#[derive(Clone)]
pub struct Catalog {
    root: PathBuf,
    blocked: HashSet<String>,
}

impl Catalog {
    pub fn new(root: impl Into<PathBuf>, blocked: HashSet<String>) -> Self {
        Self {
            root: root.into(),
            blocked,
        }
    }

    /// Opens the catalog with the blocklist at `list_path`. A missing list
    /// means nothing is blocked.
    pub fn open(root: impl Into<PathBuf>, list_path: &Path) -> Result<Self, StorageError> {
        let blocked = Self::load_blocklist(list_path)?;
        Ok(Self::new(root, blocked))
    }

    /// One relative path per line; blank lines are skipped.
    pub fn load_blocklist(list_path: &Path) -> Result<HashSet<String>, StorageError> {
        let content = match fs::read_to_string(list_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("No invalid image list at {}", list_path.display());
                return Ok(HashSet::new());
            }
            Err(source) => {
                return Err(StorageError::Io {
                    path: list_path.to_path_buf(),
                    source,
                })
            }
        };

        let blocked: HashSet<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();
        info!("Loaded {} blocked catalog images", blocked.len());
        Ok(blocked)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_blocked(&self, relative: &str) -> bool {
        self.blocked.contains(relative)
    }

    /// Maps a catalog-relative path to a file on disk.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, StorageError> {
        let relative = relative.trim();
        let candidate = Path::new(relative);
        let inside = !relative.is_empty()
            && candidate
                .components()
                .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if !inside {
            return Err(StorageError::OutsideCatalog(relative.to_string()));
        }
        if self.is_blocked(relative) {
            return Err(StorageError::Blocked(relative.to_string()));
        }

        let path = self.root.join(candidate);
        if !path.is_file() {
            return Err(StorageError::NotFound(relative.to_string()));
        }
        Ok(path)
    }

    pub fn url_for(relative: &str) -> String {
        format!("/data/{}", relative.trim())
    }
}
