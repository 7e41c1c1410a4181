use crate::{classifier::Classifier, server::SharedState};
use axum::{extract::State, response::Json};
use serde_json::{json, Value};

pub async fn api_documentation<C: Classifier>(
    State(state): State<SharedState<C>>,
) -> Json<Value> {
    state.metrics.record_request("/");
    let service = &state.inference_service;
    let health = service.health_check();

    let classes: Vec<String> = service
        .vocabulary()
        .labels()
        .iter()
        .map(|label| service.catalog().display_name(label))
        .collect();
    let extensions = state.upload.allowed_extensions.join(", ");

    Json(json!({
        "name": "Leaf Disease Prediction API",
        "version": env!("CARGO_PKG_VERSION"),
        "model": {
            "loaded": health.model_loaded,
            "name": health.model,
            "labels_version": service.vocabulary().version(),
        },
        "classes": classes,
        "endpoints": {
            "GET /": "API documentation",
            "GET /health": "Service and model status",
            "POST /predict": "Classify a leaf image",
            "GET /metrics": "Prometheus metrics",
        },
        "usage": {
            "predict": {
                "method": "POST",
                "content_type": "multipart/form-data",
                "field": "file",
                "allowed_extensions": extensions,
                "max_bytes": state.upload.max_bytes,
                "example": "curl -X POST -F \"file=@leaf.jpg\" http://localhost:5005/predict",
            }
        }
    }))
}
