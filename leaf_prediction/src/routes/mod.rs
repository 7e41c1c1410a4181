mod health;
mod index;
mod metrics;
mod predict;

use crate::{classifier::Classifier, server::SharedState};
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes<C: Classifier>() -> Router<SharedState<C>> {
    Router::new()
        .route("/", get(index::api_documentation::<C>))
        .route("/health", get(health::healthcheck::<C>))
        .route("/predict", post(predict::predict::<C>))
        .route("/metrics", get(metrics::metrics_handler::<C>))
}
