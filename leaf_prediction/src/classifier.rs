use crate::{
    config::{Backend, ModelConfig},
    heuristic::ColorHeuristicClassifier,
    labels::LabelVocabulary,
    ort_classifier::OnnxClassifier,
    preprocess::{PreprocessConfig, Tensor},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("failed to load model: {0}")]
    Load(String),
    #[error("input tensor shape {actual:?} does not match {expected:?}")]
    InputShape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("inference failed: {0}")]
    Runtime(String),
    #[error("session mutex poisoned: {0}")]
    Poisoned(String),
}

/// Maps a preprocessed image tensor to one probability per class.
///
/// Implementations are shared read-only between request handlers, so
/// `classify` must be safe to call concurrently.
pub trait Classifier: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn classify(&self, input: &Tensor) -> Result<Vec<f32>, ClassifierError>;
}

pub enum ClassifierBackend {
    Onnx(OnnxClassifier),
    ColorHeuristic(ColorHeuristicClassifier),
}

impl Classifier for ClassifierBackend {
    fn name(&self) -> &str {
        match self {
            ClassifierBackend::Onnx(classifier) => classifier.name(),
            ClassifierBackend::ColorHeuristic(classifier) => classifier.name(),
        }
    }

    fn classify(&self, input: &Tensor) -> Result<Vec<f32>, ClassifierError> {
        match self {
            ClassifierBackend::Onnx(classifier) => classifier.classify(input),
            ClassifierBackend::ColorHeuristic(classifier) => classifier.classify(input),
        }
    }
}

/// Builds the configured backend. `None` leaves the service without a model.
pub fn load_backend(
    model: &ModelConfig,
    preprocessing: &PreprocessConfig,
    vocabulary: &LabelVocabulary,
) -> Option<ClassifierBackend> {
    let heuristic = || match ColorHeuristicClassifier::new(*preprocessing, vocabulary) {
        Ok(classifier) => Some(ClassifierBackend::ColorHeuristic(classifier)),
        Err(e) => {
            tracing::error!("Failed to build color heuristic classifier: {}", e);
            None
        }
    };

    match model.backend {
        Backend::Onnx => match OnnxClassifier::new(model) {
            Ok(classifier) => Some(ClassifierBackend::Onnx(classifier)),
            Err(e) if model.fallback_to_heuristic => {
                tracing::warn!(
                    "Failed to load ONNX model ({}), falling back to rule-based detection",
                    e
                );
                heuristic()
            }
            Err(e) => {
                tracing::error!("Failed to load ONNX model: {}", e);
                None
            }
        },
        Backend::ColorHeuristic => heuristic(),
    }
}
