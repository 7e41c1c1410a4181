mod heuristic;
mod ort_classifier;
mod routes;

pub mod app;
pub mod classifier;
pub mod config;
pub mod diseases;
pub mod inference_service;
pub mod labels;
pub mod preprocess;
pub mod ranking;
pub mod server;
pub mod telemetry;

pub use app::start_app;
pub use heuristic::ColorHeuristicClassifier;
pub use ort_classifier::OnnxClassifier;
