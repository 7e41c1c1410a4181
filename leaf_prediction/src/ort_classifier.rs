use crate::{
    classifier::{Classifier, ClassifierError},
    config::{ModelConfig, ModelOutput, Validatable},
    preprocess::Tensor,
    ranking::softmax,
};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

pub struct OnnxClassifier {
    sessions: Vec<Mutex<Session>>,
    counter: AtomicUsize,
    name: String,
    output: ModelOutput,
}

fn load_error(e: impl std::fmt::Display) -> ClassifierError {
    ClassifierError::Load(e.to_string())
}

impl OnnxClassifier {
    pub fn new(model_config: &ModelConfig) -> Result<Self, ClassifierError> {
        model_config.validate().map_err(ClassifierError::Load)?;
        let model_path = model_config.get_path();

        #[cfg(feature = "tensorrt")]
        ort::init()
            .with_execution_providers([
                ort::execution_providers::TensorRTExecutionProvider::default()
                    .with_engine_cache(true)
                    .build(),
            ])
            .commit()
            .map_err(load_error)?;

        tracing::info!("Loading ONNX model from {}", model_path.display());

        let sessions = (0..model_config.num_instances)
            .map(|_| -> Result<Mutex<Session>, ClassifierError> {
                let session = Session::builder()
                    .map_err(load_error)?
                    .with_optimization_level(GraphOptimizationLevel::Level3)
                    .map_err(load_error)?
                    .commit_from_file(&model_path)
                    .map_err(load_error)?;
                Ok(Mutex::new(session))
            })
            .collect::<Result<Vec<_>, ClassifierError>>()?;

        tracing::info!("Created {} ONNX sessions", sessions.len());

        let name = model_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("onnx")
            .to_string();

        Ok(Self {
            sessions,
            counter: AtomicUsize::new(0),
            name,
            output: model_config.output,
        })
    }

    fn run_inference(&self, input: &Tensor) -> Result<Vec<f32>, ClassifierError> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| ClassifierError::Poisoned(e.to_string()))?;

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)
            .map_err(|e| ClassifierError::Runtime(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| ClassifierError::Runtime(e.to_string()))?;

        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::Runtime(format!("failed to extract tensor: {}", e)))?;

        Ok(data.to_vec())
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn classify(&self, input: &Tensor) -> Result<Vec<f32>, ClassifierError> {
        let output = self.run_inference(input)?;

        Ok(match self.output {
            ModelOutput::Probabilities => output,
            ModelOutput::Logits => softmax(&output),
        })
    }
}
