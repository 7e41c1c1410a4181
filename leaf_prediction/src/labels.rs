use crate::preprocess::{Layout, Normalization, PreprocessConfig, ResizeFilter};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelsError {
    #[error("failed to read labels file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid labels manifest {path:?}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("id2label is not dense: missing class index {0}")]
    SparseIds(usize),
    #[error("id2label key {0:?} is not a class index")]
    InvalidId(String),
    #[error("labels file {0:?} holds no labels")]
    Empty(PathBuf),
}

/// Preprocessing fields a manifest states explicitly; omitted fields stay `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct DeclaredPreprocessing {
    pub image_size: Option<u32>,
    pub normalization: Option<Normalization>,
    pub layout: Option<Layout>,
    pub filter: Option<ResizeFilter>,
}

impl DeclaredPreprocessing {
    /// True when every declared field agrees with `config`.
    pub fn matches(&self, config: &PreprocessConfig) -> bool {
        self.image_size.map_or(true, |size| size == config.image_size)
            && self
                .normalization
                .map_or(true, |normalization| normalization == config.normalization)
            && self.layout.map_or(true, |layout| layout == config.layout)
            && self.filter.map_or(true, |filter| filter == config.filter)
    }
}

/// The ordered class names a model was trained with.
///
/// Index `i` of the model output is the probability of `labels[i]`, so the
/// vocabulary ships next to the model file instead of living in code.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelVocabulary {
    labels: Vec<String>,
    version: Option<String>,
    preprocessing: Option<DeclaredPreprocessing>,
}

#[derive(Deserialize)]
struct Manifest {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    id2label: BTreeMap<String, String>,
    #[serde(default)]
    preprocessing: Option<DeclaredPreprocessing>,
}

impl LabelVocabulary {
    pub fn new(labels: Vec<String>) -> Self {
        Self {
            labels,
            version: None,
            preprocessing: None,
        }
    }

    pub fn with_preprocessing(mut self, declared: DeclaredPreprocessing) -> Self {
        self.preprocessing = Some(declared);
        self
    }

    pub fn load(path: &Path) -> Result<Self, LabelsError> {
        let content = fs::read_to_string(path).map_err(|source| LabelsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_manifest = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let vocabulary = if is_manifest {
            Self::from_json(&content).map_err(|e| match e {
                ManifestError::Json(source) => LabelsError::Json {
                    path: path.to_path_buf(),
                    source,
                },
                ManifestError::Labels(e) => e,
            })?
        } else {
            Self::from_lines(&content)
        };

        if vocabulary.labels.is_empty() {
            return Err(LabelsError::Empty(path.to_path_buf()));
        }

        Ok(vocabulary)
    }

    fn from_lines(content: &str) -> Self {
        let labels = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        Self::new(labels)
    }

    fn from_json(content: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = serde_json::from_str(content).map_err(ManifestError::Json)?;

        let labels = if manifest.labels.is_empty() {
            dense_labels(manifest.id2label)?
        } else {
            manifest.labels
        };

        Ok(Self {
            labels,
            version: manifest.version,
            preprocessing: manifest.preprocessing,
        })
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn position(&self, predicate: impl Fn(&str) -> bool) -> Option<usize> {
        self.labels.iter().position(|label| predicate(label))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Preprocessing convention the artifact declares, if any.
    pub fn preprocessing(&self) -> Option<&DeclaredPreprocessing> {
        self.preprocessing.as_ref()
    }
}

enum ManifestError {
    Json(serde_json::Error),
    Labels(LabelsError),
}

impl From<LabelsError> for ManifestError {
    fn from(e: LabelsError) -> Self {
        ManifestError::Labels(e)
    }
}

fn dense_labels(id2label: BTreeMap<String, String>) -> Result<Vec<String>, LabelsError> {
    let mut by_index = BTreeMap::new();
    for (key, label) in id2label {
        let index: usize = key
            .trim()
            .parse()
            .map_err(|_| LabelsError::InvalidId(key.clone()))?;
        by_index.insert(index, label);
    }

    by_index
        .into_iter()
        .enumerate()
        .map(|(expected, (index, label))| {
            if index == expected {
                Ok(label)
            } else {
                Err(LabelsError::SparseIds(expected))
            }
        })
        .collect()
}
