use crate::{
    classifier::Classifier,
    diseases::DiseaseCatalog,
    labels::{DeclaredPreprocessing, LabelVocabulary},
    preprocess::{PreprocessConfig, PreprocessError, Preprocessor},
    ranking::top_k,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("{0}")]
    Validation(String),
    #[error("Model not loaded")]
    ServiceUnavailable,
    #[error("Prediction failed: {0}")]
    Inference(String),
}

/// One uploaded file, alive for the duration of a single request.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedPrediction {
    pub disease: String,
    pub confidence: f32,
    pub full_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub disease: String,
    pub confidence: f32,
    pub description: String,
    pub treatment: Vec<String>,
    pub top_predictions: Vec<RankedPrediction>,
    pub full_label: String,
    pub detection_method: String,
}

fn to_percentage(probability: f32) -> f32 {
    (probability * 10_000.0).round() / 100.0
}

impl PredictionResult {
    /// Rescales every confidence to `[0, 100]`, rounded to two decimals.
    pub fn into_percentages(mut self) -> Self {
        self.confidence = to_percentage(self.confidence);
        for prediction in &mut self.top_predictions {
            prediction.confidence = to_percentage(prediction.confidence);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Health {
    pub model_loaded: bool,
    pub num_classes: usize,
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub allowed_extensions: Vec<String>,
    pub top_k: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            allowed_extensions: vec!["png".into(), "jpg".into(), "jpeg".into()],
            top_k: 3,
        }
    }
}

/// Validates uploads, runs the classifier and joins its output with the
/// disease catalog.
///
/// Whether a model is loaded is decided once at construction; a service
/// built without one rejects every prediction until the process restarts.
pub struct InferenceService<C: Classifier> {
    classifier: Option<Arc<C>>,
    preprocessor: Preprocessor,
    vocabulary: LabelVocabulary,
    catalog: DiseaseCatalog,
    options: ServiceOptions,
}

impl<C: Classifier> InferenceService<C> {
    pub fn new(
        classifier: Option<C>,
        preprocessor: Preprocessor,
        vocabulary: LabelVocabulary,
        catalog: DiseaseCatalog,
        options: ServiceOptions,
    ) -> Self {
        match &classifier {
            Some(classifier) => tracing::info!(
                "Classifier '{}' ready with {} classes",
                classifier.name(),
                vocabulary.len()
            ),
            None => tracing::warn!("No classifier loaded, predictions are unavailable"),
        }

        let service = Self {
            classifier: classifier.map(Arc::new),
            preprocessor,
            vocabulary,
            catalog,
            options,
        };

        if let Some((declared, configured)) = service.preprocessing_mismatch() {
            tracing::warn!(
                "Configured preprocessing {:?} differs from the model manifest {:?}; \
                 predictions may be meaningless",
                configured,
                declared
            );
        }

        service
    }

    /// The manifest's declared preprocessing and the configured one, when a
    /// declared field disagrees. Reported only; the configuration stays in use.
    pub fn preprocessing_mismatch(&self) -> Option<(&DeclaredPreprocessing, &PreprocessConfig)> {
        let declared = self.vocabulary.preprocessing()?;
        let configured = self.preprocessor.config();
        (!declared.matches(configured)).then_some((declared, configured))
    }

    pub fn health_check(&self) -> Health {
        match &self.classifier {
            Some(classifier) => Health {
                model_loaded: true,
                num_classes: self.vocabulary.len(),
                model: Some(classifier.name().to_string()),
            },
            None => Health {
                model_loaded: false,
                num_classes: 0,
                model: None,
            },
        }
    }

    pub fn vocabulary(&self) -> &LabelVocabulary {
        &self.vocabulary
    }

    pub fn catalog(&self) -> &DiseaseCatalog {
        &self.catalog
    }

    fn allowed_file(&self, filename: &str) -> bool {
        filename
            .rsplit_once('.')
            .map(|(_, extension)| {
                self.options
                    .allowed_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(extension))
            })
            .unwrap_or(false)
    }

    pub fn validate(&self, upload: Option<&UploadedImage>) -> Result<(), PredictionError> {
        let upload =
            upload.ok_or_else(|| PredictionError::Validation("No file uploaded".into()))?;

        if upload.filename.is_empty() {
            return Err(PredictionError::Validation("No file selected".into()));
        }

        if !self.allowed_file(&upload.filename) {
            let allowed = self
                .options
                .allowed_extensions
                .iter()
                .map(|ext| ext.to_uppercase())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(PredictionError::Validation(format!(
                "Invalid file type. Please upload an image ({})",
                allowed
            )));
        }

        Ok(())
    }

    pub async fn predict(
        &self,
        upload: Option<UploadedImage>,
    ) -> Result<PredictionResult, PredictionError> {
        self.validate(upload.as_ref())?;
        let classifier = self
            .classifier
            .clone()
            .ok_or(PredictionError::ServiceUnavailable)?;
        let Some(upload) = upload else {
            return Err(PredictionError::Validation("No file uploaded".into()));
        };

        let method = classifier.name().to_string();
        let preprocessor = self.preprocessor.clone();
        let probabilities = tokio::task::spawn_blocking(move || {
            let tensor = preprocessor.preprocess(&upload.data).map_err(|e| match e {
                PreprocessError::Decode(e) => {
                    PredictionError::Validation(format!("Invalid or corrupt image: {}", e))
                }
                other => PredictionError::Inference(other.to_string()),
            })?;
            classifier
                .classify(&tensor)
                .map_err(|e| PredictionError::Inference(e.to_string()))
        })
        .await
        .map_err(|e| PredictionError::Inference(format!("prediction task failed: {}", e)))??;

        self.assemble(&probabilities, method)
    }

    fn assemble(
        &self,
        probabilities: &[f32],
        detection_method: String,
    ) -> Result<PredictionResult, PredictionError> {
        if probabilities.len() != self.vocabulary.len() {
            return Err(PredictionError::Inference(format!(
                "model returned {} scores for {} classes",
                probabilities.len(),
                self.vocabulary.len()
            )));
        }
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(PredictionError::Inference(
                "model returned non-finite scores".into(),
            ));
        }

        let ranked = top_k(probabilities, self.options.top_k.max(1));
        let top_predictions = ranked
            .iter()
            .map(|&(index, confidence)| {
                let label = self.label(index)?;
                Ok(RankedPrediction {
                    disease: self.catalog.display_name(label),
                    confidence: confidence.clamp(0.0, 1.0),
                    full_label: label.to_string(),
                })
            })
            .collect::<Result<Vec<_>, PredictionError>>()?;

        let best = top_predictions
            .first()
            .ok_or_else(|| PredictionError::Inference("model returned no scores".into()))?;
        let resolved = self.catalog.resolve(&best.full_label);

        tracing::debug!(
            "Prediction: {} ({:.3}) via {}",
            resolved.name,
            best.confidence,
            detection_method
        );

        Ok(PredictionResult {
            disease: resolved.name,
            confidence: best.confidence,
            description: resolved.record.description,
            treatment: resolved.record.treatment,
            full_label: best.full_label.clone(),
            top_predictions,
            detection_method,
        })
    }

    fn label(&self, index: usize) -> Result<&str, PredictionError> {
        self.vocabulary
            .get(index)
            .ok_or_else(|| PredictionError::Inference(format!("no label for class {}", index)))
    }
}
