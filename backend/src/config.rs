use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "config/aviscan.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub pipeline: PipelineSettings,
    pub selector: SelectorSettings,
    pub workers: WorkerSettings,
    pub registry: RegistrySettings,
    pub storage: StorageSettings,
    pub models: ModelSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Side of the letterboxed image handed to segmentation.
    pub normalized_side: u32,
    /// Side of the composited frame handed to classification.
    pub canonical_side: u32,
    /// Write normalized/canonical intermediates to `storage.scratch_dir`.
    pub persist_intermediates: bool,
    pub jpeg_quality: u8,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            normalized_side: 1024,
            canonical_side: 224,
            persist_intermediates: false,
            jpeg_quality: 85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorSettings {
    /// Open/close the binary mask before labelling components.
    pub clean_mask: bool,
    /// Components with fewer pixels are ignored when scoring.
    pub noise_floor: u32,
    pub min_subject_side: u32,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            clean_mask: true,
            noise_floor: 100,
            min_subject_side: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub count: usize,
    pub queue_capacity: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            count: 2,
            queue_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// How long a finished task stays queryable.
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            retention_secs: 3600,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub upload_dir: PathBuf,
    pub catalog_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub invalid_images_list: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            catalog_dir: PathBuf::from("static"),
            scratch_dir: PathBuf::from("uploads/scratch"),
            invalid_images_list: PathBuf::from("invalid_images_list.txt"),
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub segmentation: PathBuf,
    pub classifier: PathBuf,
    pub class_mapping: PathBuf,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            segmentation: PathBuf::from("models/deeplabv3_resnet101.pt"),
            classifier: PathBuf::from("models/resnet50_birds.pt"),
            class_mapping: PathBuf::from("class_mapping.csv"),
        }
    }
}

impl AppConfig {
    /// Loads `AVISCAN_CONFIG` (or `config/aviscan.yaml`) and applies
    /// environment overrides. A missing file falls back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("AVISCAN_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let path = Path::new(&path);

        let mut config = if path.exists() {
            log::info!("Loading configuration from {}", path.display());
            Self::from_path(path)?
        } else {
            log::info!(
                "No config file at {}, using built-in defaults",
                path.display()
            );
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&config_str)
    }

    pub fn from_yaml_str(config_str: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(config_str)?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_value("PORT", &port)?;
        }
        if let Some(workers) = lookup("AVISCAN_WORKERS") {
            self.workers.count = parse_value("AVISCAN_WORKERS", &workers)?;
        }
        if let Some(path) = lookup("AVISCAN_SEGMENTATION_MODEL") {
            self.models.segmentation = PathBuf::from(path);
        }
        if let Some(path) = lookup("AVISCAN_CLASSIFIER_MODEL") {
            self.models.classifier = PathBuf::from(path);
        }
        if let Some(path) = lookup("AVISCAN_CLASS_MAPPING") {
            self.models.class_mapping = PathBuf::from(path);
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = AppConfig::from_yaml_str(
            r#"
workers:
  count: 8
selector:
  clean_mask: false
"#,
        )
        .unwrap();

        assert_eq!(config.workers.count, 8);
        assert_eq!(config.workers.queue_capacity, 64);
        assert!(!config.selector.clean_mask);
        assert_eq!(config.selector.noise_floor, 100);
        assert_eq!(config.selector.min_subject_side, 64);
        assert_eq!(config.pipeline.normalized_side, 1024);
        assert_eq!(config.pipeline.canonical_side, 224);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PORT", "9000"),
            ("AVISCAN_WORKERS", "3"),
            ("AVISCAN_CLASS_MAPPING", "/srv/mapping.csv"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.workers.count, 3);
        assert_eq!(config.models.class_mapping, PathBuf::from("/srv/mapping.csv"));
        assert_eq!(config.bind_address(), "0.0.0.0:9000");
    }

    #[test]
    fn test_invalid_override_is_reported() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(|key| (key == "PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "PORT"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = AppConfig::from_path(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
