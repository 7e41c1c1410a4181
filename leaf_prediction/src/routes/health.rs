use crate::{classifier::Classifier, server::SharedState};
use axum::{extract::State, response::IntoResponse, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct Status {
    status: String,
    model_loaded: bool,
    num_classes: usize,
    model: Option<String>,
}

pub async fn healthcheck<C: Classifier>(State(state): State<SharedState<C>>) -> impl IntoResponse {
    state.metrics.record_request("/health");
    let health = state.inference_service.health_check();

    Json(Status {
        status: "healthy".into(),
        model_loaded: health.model_loaded,
        num_classes: health.num_classes,
        model: health.model,
    })
}
