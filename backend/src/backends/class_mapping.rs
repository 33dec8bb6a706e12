use std::collections::BTreeMap;
use std::path::Path;

/// Label reported when the classifier's index has no mapping.
pub const UNKNOWN_LABEL: &str = "unknown";

#[derive(Debug, thiserror::Error)]
pub enum ClassMappingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed class mapping at line {line}: {content}")]
    Malformed { line: usize, content: String },
}

/// Classifier output index to species name, read from a
/// `class,original_label` CSV.
#[derive(Debug, Clone, Default)]
pub struct ClassMapping {
    labels: BTreeMap<u32, String>,
}

impl ClassMapping {
    pub fn load(path: &Path) -> Result<Self, ClassMappingError> {
        let text = std::fs::read_to_string(path)?;
        let mapping = Self::parse(&text)?;
        log::info!(
            "Loaded {} class labels from {}",
            mapping.len(),
            path.display()
        );
        Ok(mapping)
    }

    /// Like [`ClassMapping::load`] but degrades to an empty mapping, so every
    /// prediction becomes [`UNKNOWN_LABEL`].
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(mapping) => mapping,
            Err(e) => {
                log::error!(
                    "Class mapping {} unavailable, species lookup disabled: {}",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn parse(text: &str) -> Result<Self, ClassMappingError> {
        let mut labels = BTreeMap::new();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let malformed = || ClassMappingError::Malformed {
                line: index + 1,
                content: raw.to_string(),
            };

            let (class, label) = line.split_once(',').ok_or_else(malformed)?;
            let class = class.trim();
            if index == 0 && class.parse::<u32>().is_err() {
                // header row
                continue;
            }
            let class: u32 = class.parse().map_err(|_| malformed())?;
            let label = label.trim().trim_matches('"').trim();
            if label.is_empty() {
                return Err(malformed());
            }
            labels.insert(class, label.to_string());
        }

        Ok(Self { labels })
    }

    pub fn label_for(&self, class: u32) -> Option<&str> {
        self.labels.get(&class).map(String::as_str)
    }

    /// Reverse lookup: exact label first, then the first label containing
    /// `label` as a substring.
    pub fn find_class_id(&self, label: &str) -> Option<u32> {
        if label.is_empty() || label == UNKNOWN_LABEL {
            return None;
        }
        self.labels
            .iter()
            .find(|(_, name)| name.as_str() == label)
            .or_else(|| self.labels.iter().find(|(_, name)| name.contains(label)))
            .map(|(class, _)| *class)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
