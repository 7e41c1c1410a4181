use crate::{
    classifier::Classifier,
    config::ConfidenceFormat,
    inference_service::{PredictionError, PredictionResult, UploadedImage},
    server::SharedState,
};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::{path::Path, time::Instant};
use thiserror::Error;
use tracing::instrument;

const UPLOAD_FIELDS: [&str; 2] = ["file", "image"];

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Error, Debug)]
pub enum PredictRouteError {
    #[error(transparent)]
    Prediction(#[from] PredictionError),
    #[error("Failed to read upload: {0}")]
    Multipart(#[from] MultipartError),
}

impl IntoResponse for PredictionError {
    fn into_response(self) -> Response {
        let status = match self {
            PredictionError::Validation(_) => StatusCode::BAD_REQUEST,
            PredictionError::ServiceUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            PredictionError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for PredictRouteError {
    fn into_response(self) -> Response {
        match self {
            PredictRouteError::Prediction(e) => e.into_response(),
            PredictRouteError::Multipart(e) => {
                let body = ErrorBody {
                    error: e.body_text(),
                };
                (e.status(), Json(body)).into_response()
            }
        }
    }
}

fn outcome(result: &Result<PredictionResult, PredictionError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(PredictionError::Validation(_)) => "rejected",
        Err(PredictionError::ServiceUnavailable) => "unavailable",
        Err(PredictionError::Inference(_)) => "failed",
    }
}

#[instrument(skip(state, multipart))]
pub async fn predict<C: Classifier>(
    State(state): State<SharedState<C>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResult>, PredictRouteError> {
    state.metrics.record_request("/predict");
    let start = Instant::now();

    let upload = match multipart {
        Ok(multipart) => read_upload(multipart).await?,
        Err(rejection) => {
            tracing::debug!("Request carries no multipart body: {}", rejection);
            None
        }
    };

    let service = &state.inference_service;
    if let (Some(dir), Some(upload)) = (&state.upload.save_dir, &upload) {
        if service.validate(Some(upload)).is_ok() {
            save_upload(dir, upload).await;
        }
    }

    let result = service.predict(upload).await;
    state
        .metrics
        .record_prediction_duration(start.elapsed().as_millis() as u64, "/predict");
    state.metrics.record_prediction(outcome(&result));

    let result = result.inspect_err(|e| match e {
        PredictionError::Validation(message) => tracing::debug!("Rejected upload: {}", message),
        other => tracing::error!("Prediction failed: {}", other),
    })?;

    tracing::info!(
        disease = %result.disease,
        confidence = result.confidence,
        method = %result.detection_method,
        "Prediction complete"
    );

    let result = match state.response.confidence {
        ConfidenceFormat::Probability => result,
        ConfidenceFormat::Percentage => result.into_percentages(),
    };

    Ok(Json(result))
}

async fn read_upload(mut multipart: Multipart) -> Result<Option<UploadedImage>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        let is_upload = field
            .name()
            .map(|name| UPLOAD_FIELDS.contains(&name))
            .unwrap_or(false);
        if !is_upload {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await?;
        return Ok(Some(UploadedImage {
            filename,
            data: data.to_vec(),
        }));
    }

    Ok(None)
}

async fn save_upload(dir: &Path, upload: &UploadedImage) {
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        tracing::warn!("Cannot create upload directory {:?}: {}", dir, e);
        return;
    }

    let path = dir.join(sanitize_filename(&upload.filename));
    match tokio::fs::write(&path, &upload.data).await {
        Ok(()) => tracing::debug!("Saved upload to {:?}", path),
        Err(e) => tracing::warn!("Failed to save upload to {:?}: {}", path, e),
    }
}

/// Reduces a client-supplied filename to a safe basename.
fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    match cleaned.trim_start_matches('.') {
        "" => "upload".to_string(),
        name => name.to_string(),
    }
}
