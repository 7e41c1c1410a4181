use crate::preprocess::PreprocessConfig;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    #[serde(default)]
    pub upload: UploadConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub preprocessing: PreprocessConfig,
    #[serde(default)]
    pub response: ResponseConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

pub trait Validatable {
    fn get_path(&self) -> PathBuf;

    fn validate(&self) -> Result<(), String> {
        if !self.get_path().exists() {
            return Err(format!("File not found: {:?}", self.get_path()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// Uploads are written here for debugging when set.
    #[serde(default)]
    pub save_dir: Option<PathBuf>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            allowed_extensions: default_allowed_extensions(),
            save_dir: None,
        }
    }
}

fn default_max_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["png".into(), "jpg".into(), "jpeg".into()]
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Onnx,
    ColorHeuristic,
}

/// What the model's first output holds.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelOutput {
    #[default]
    Probabilities,
    Logits,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub backend: Backend,
    pub model_dir: PathBuf,
    #[serde(default)]
    pub onnx_file: Option<String>,
    pub labels_file: String,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
    #[serde(default)]
    pub output: ModelOutput,
    #[serde(default)]
    pub fallback_to_heuristic: bool,
}

fn default_model_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl ModelConfig {
    pub fn labels_path(&self) -> PathBuf {
        self.model_dir.join(&self.labels_file)
    }
}

impl Validatable for ModelConfig {
    fn get_path(&self) -> PathBuf {
        match &self.onnx_file {
            Some(file) => self.model_dir.join(file),
            None => self.model_dir.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceFormat {
    #[default]
    Probability,
    Percentage,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResponseConfig {
    #[serde(default)]
    pub confidence: ConfidenceFormat,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            confidence: ConfidenceFormat::default(),
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("no working directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let settings = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config = settings.try_deserialize::<Config>()?;
    config.check()?;

    Ok(config)
}

impl Config {
    fn check(&self) -> Result<(), config::ConfigError> {
        if self.model.backend == Backend::Onnx && self.model.onnx_file.is_none() {
            return Err(config::ConfigError::Message(
                "model.onnx_file is required for the onnx backend".into(),
            ));
        }
        if self.model.num_instances == 0 {
            return Err(config::ConfigError::Message(
                "model.num_instances must be at least 1".into(),
            ));
        }
        if self.preprocessing.image_size == 0 {
            return Err(config::ConfigError::Message(
                "preprocessing.image_size must be positive".into(),
            ));
        }
        if self.response.top_k == 0 {
            return Err(config::ConfigError::Message(
                "response.top_k must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            other => Err(format!(
                "{} is not a supported minimum log level. Use `debug`, `info` or `warn`.",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::Normalization;

    fn from_yaml(yaml: &str) -> Result<Config, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?
            .try_deserialize::<Config>()
    }

    const BASE: &str = r#"
server:
  host: 0.0.0.0
  port: 5005
log_level: info
model:
  backend: onnx
  model_dir: models
  onnx_file: leaf_disease.onnx
  labels_file: labels.json
  num_instances: 2
"#;

    #[test]
    fn test_defaults_are_applied() {
        let config = from_yaml(BASE).unwrap();

        assert_eq!(config.server.get_address(), "0.0.0.0:5005");
        assert_eq!(config.upload.max_bytes, 16 * 1024 * 1024);
        assert_eq!(config.upload.allowed_extensions, vec!["png", "jpg", "jpeg"]);
        assert_eq!(config.response.top_k, 3);
        assert_eq!(config.response.confidence, ConfidenceFormat::Probability);
        assert_eq!(config.model.output, ModelOutput::Probabilities);
        assert_eq!(config.preprocessing.image_size, 224);
        assert_eq!(config.preprocessing.normalization, Normalization::Rescale);
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_onnx_backend_requires_model_file() {
        let yaml = BASE.replace("  onnx_file: leaf_disease.onnx\n", "");
        let config = from_yaml(&yaml).unwrap();

        assert!(config.check().is_err());
    }

    #[test]
    fn test_model_path_joins_directory() {
        let config = from_yaml(BASE).unwrap();

        assert_eq!(
            config.model.get_path(),
            PathBuf::from("models/leaf_disease.onnx")
        );
        assert_eq!(config.model.labels_path(), PathBuf::from("models/labels.json"));
    }

    #[test]
    fn test_unknown_log_level_is_rejected() {
        let yaml = BASE.replace("log_level: info", "log_level: trace");

        assert!(from_yaml(&yaml).is_err());
    }
}
