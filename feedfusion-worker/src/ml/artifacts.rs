use miette::Diagnostic;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ArtifactError {
    #[error("error reading artifact {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error decoding artifact {path}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The filesystem contract of a trained model. Training writes the files;
/// everything else only ever probes for presence and reads the label set.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    model_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
        }
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join("model.pt")
    }

    pub fn vocab_path(&self) -> PathBuf {
        self.model_dir.join("vocab.json")
    }

    pub fn labels_path(&self) -> PathBuf {
        self.model_dir.join("labels.json")
    }

    pub fn config_path(&self) -> PathBuf {
        self.model_dir.join("config.json")
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.model_dir.join("metrics.json")
    }

    /// A model counts as present only when all four core artifacts exist.
    pub fn model_is_present(&self) -> bool {
        [
            self.model_path(),
            self.vocab_path(),
            self.labels_path(),
            self.config_path(),
        ]
        .iter()
        .all(|path| path.is_file())
    }

    /// The label set the current model was trained with.
    pub fn load_labels(&self) -> Result<Vec<String>, ArtifactError> {
        let path = self.labels_path();
        let raw = std::fs::read(&path).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| ArtifactError::Decode { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn model_present_requires_all_four_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert!(!store.model_is_present());

        touch(dir.path(), "model.pt", "");
        touch(dir.path(), "vocab.json", "{}");
        touch(dir.path(), "labels.json", "[]");
        assert!(!store.model_is_present());

        touch(dir.path(), "config.json", "{}");
        assert!(store.model_is_present());
    }

    #[test]
    fn loads_labels() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        touch(dir.path(), "labels.json", r#"["sport", "economics"]"#);

        assert_eq!(
            store.load_labels().unwrap(),
            vec!["sport".to_string(), "economics".to_string()]
        );
    }

    #[test]
    fn missing_labels_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert!(matches!(
            store.load_labels(),
            Err(ArtifactError::Io { .. })
        ));
    }
}
