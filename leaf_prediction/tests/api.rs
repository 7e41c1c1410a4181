use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use image::{ImageBuffer, Rgb};
use leaf_prediction::{
    classifier::{Classifier, ClassifierError},
    config::{ConfidenceFormat, ResponseConfig, UploadConfig},
    diseases::DiseaseCatalog,
    inference_service::{InferenceService, ServiceOptions},
    labels::LabelVocabulary,
    preprocess::{PreprocessConfig, Preprocessor, Tensor},
    server::{create_router, SharedState},
    telemetry::Metrics,
    ColorHeuristicClassifier,
};
use serde_json::Value;
use std::{
    io::Cursor,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tower::util::ServiceExt;

const BOUNDARY: &str = "leaf-test-boundary";

const PROBABILITIES: [f32; 10] = [0.02, 0.55, 0.2, 0.05, 0.08, 0.02, 0.03, 0.02, 0.01, 0.02];

struct MockClassifier {
    calls: Arc<AtomicUsize>,
}

impl Classifier for MockClassifier {
    fn name(&self) -> &str {
        "mock"
    }

    fn classify(&self, _input: &Tensor) -> Result<Vec<f32>, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PROBABILITIES.to_vec())
    }
}

fn vocabulary() -> LabelVocabulary {
    LabelVocabulary::load(&Path::new(env!("CARGO_MANIFEST_DIR")).join("models/labels.json"))
        .unwrap()
}

fn app_with<C: Classifier>(
    classifier: Option<C>,
    upload: UploadConfig,
    response: ResponseConfig,
) -> Router {
    let service = InferenceService::new(
        classifier,
        Preprocessor::new(PreprocessConfig::default()),
        vocabulary(),
        DiseaseCatalog::builtin(),
        ServiceOptions::default(),
    );

    create_router(SharedState {
        inference_service: Arc::new(service),
        upload,
        response,
        metrics: Arc::new(Metrics::new().unwrap()),
    })
}

fn mock_app(loaded: bool) -> (Router, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let classifier = loaded.then(|| MockClassifier {
        calls: calls.clone(),
    });
    let app = app_with(classifier, UploadConfig::default(), ResponseConfig::default());
    (app, calls)
}

fn green_png() -> Vec<u8> {
    let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(50, 50, Rgb([0, 255, 0]));
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
    cursor.into_inner()
}

fn multipart_request(field: &str, filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/predict")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_reports_loaded_model() {
    let (app, calls) = mock_app(true);

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model_loaded"], true);
    assert_eq!(body["num_classes"], 10);
    assert_eq!(body["model"], "mock");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_predict_green_leaf() {
    let (app, calls) = mock_app(true);

    let response = app
        .oneshot(multipart_request("file", "leaf.png", &green_png()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let body = json_body(response).await;
    assert_eq!(body["disease"], "Early Blight");
    assert_eq!(body["full_label"], "Tomato___Early_blight");
    assert_eq!(body["detection_method"], "mock");
    assert!(!body["description"].as_str().unwrap().is_empty());
    assert!(!body["treatment"].as_array().unwrap().is_empty());

    let confidence = body["confidence"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&confidence));

    let top = body["top_predictions"].as_array().unwrap();
    assert_eq!(top.len(), 3);
    assert_eq!(top[0]["disease"], body["disease"]);
    let confidences: Vec<f64> = top
        .iter()
        .map(|p| p["confidence"].as_f64().unwrap())
        .collect();
    assert!(confidences.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(top[1]["disease"], "Late Blight");
    assert_eq!(top[2]["disease"], "Septoria Leaf Spot");
}

#[tokio::test]
async fn test_image_field_name_is_accepted() {
    let (app, _) = mock_app(true);

    let response = app
        .oneshot(multipart_request("image", "leaf.JPG", &green_png()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_model_returns_500_without_inference() {
    let (app, calls) = mock_app(false);

    let health = json_body(app.clone().oneshot(get("/health")).await.unwrap()).await;
    let response = app
        .oneshot(multipart_request("file", "leaf.png", &green_png()))
        .await
        .unwrap();

    assert_eq!(health["model_loaded"], false);
    assert_eq!(health["num_classes"], 0);
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["error"], "Model not loaded");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_text_file_is_rejected() {
    let (app, calls) = mock_app(true);

    let response = app
        .oneshot(multipart_request("file", "leaf.txt", b"not an image"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid file type"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_file_field_is_rejected() {
    let (app, _) = mock_app(true);

    let response = app
        .oneshot(multipart_request("document", "leaf.png", &green_png()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "No file uploaded");
}

#[tokio::test]
async fn test_non_multipart_body_is_rejected() {
    let (app, _) = mock_app(true);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "No file uploaded");
}

#[tokio::test]
async fn test_empty_filename_is_rejected() {
    let (app, _) = mock_app(true);

    let response = app
        .oneshot(multipart_request("file", "", &green_png()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "No file selected");
}

#[tokio::test]
async fn test_corrupt_image_is_rejected() {
    let (app, calls) = mock_app(true);

    let response = app
        .oneshot(multipart_request("file", "leaf.png", &[0x13, 0x37, 0x00, 0xff, 0x42]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid or corrupt image"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_oversized_upload_returns_413() {
    let calls = Arc::new(AtomicUsize::new(0));
    let upload = UploadConfig {
        max_bytes: 1024,
        ..UploadConfig::default()
    };
    let app = app_with(
        Some(MockClassifier {
            calls: calls.clone(),
        }),
        upload,
        ResponseConfig::default(),
    );

    let response = app
        .oneshot(multipart_request("file", "leaf.png", &vec![0u8; 8 * 1024]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_percentage_confidence() {
    let calls = Arc::new(AtomicUsize::new(0));
    let response_config = ResponseConfig {
        confidence: ConfidenceFormat::Percentage,
        ..ResponseConfig::default()
    };
    let app = app_with(
        Some(MockClassifier { calls }),
        UploadConfig::default(),
        response_config,
    );

    let response = app
        .oneshot(multipart_request("file", "leaf.png", &green_png()))
        .await
        .unwrap();

    let body = json_body(response).await;
    let confidence = body["confidence"].as_f64().unwrap();
    assert!((confidence - 55.0).abs() < 1e-3);
    assert!(body["top_predictions"]
        .as_array()
        .unwrap()
        .iter()
        .all(|p| (0.0..=100.0).contains(&p["confidence"].as_f64().unwrap())));
}

#[tokio::test]
async fn test_upload_is_saved_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let upload = UploadConfig {
        save_dir: Some(dir.path().to_path_buf()),
        ..UploadConfig::default()
    };
    let app = app_with(Some(MockClassifier { calls }), upload, ResponseConfig::default());
    let png = green_png();

    let response = app
        .oneshot(multipart_request("file", "../my leaf.png", &png))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let saved = std::fs::read(dir.path().join("my_leaf.png")).unwrap();
    assert_eq!(saved, png);
}

#[tokio::test]
async fn test_heuristic_backend_classifies_green_leaf_as_healthy() {
    let vocabulary = vocabulary();
    let classifier =
        ColorHeuristicClassifier::new(PreprocessConfig::default(), &vocabulary).unwrap();
    let app = app_with(Some(classifier), UploadConfig::default(), ResponseConfig::default());

    let response = app
        .oneshot(multipart_request("file", "leaf.png", &green_png()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["disease"], "Healthy");
    assert_eq!(body["full_label"], "Tomato___healthy");
    assert_eq!(body["detection_method"], "Rule-based");
    assert!((body["confidence"].as_f64().unwrap() - 0.75).abs() < 1e-6);
}

#[tokio::test]
async fn test_api_documentation() {
    let (app, _) = mock_app(true);

    let response = app.oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["name"], "Leaf Disease Prediction API");
    assert_eq!(body["model"]["labels_version"], "tomato-resnet50-v1");
    assert_eq!(body["classes"].as_array().unwrap().len(), 10);
    assert!(body["endpoints"]["POST /predict"].is_string());
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_prometheus_text() {
    let (app, _) = mock_app(true);

    app.clone().oneshot(get("/health")).await.unwrap();
    let response = app.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("requests_total"));
}
