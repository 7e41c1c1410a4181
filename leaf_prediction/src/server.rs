use crate::{
    classifier::Classifier,
    config::{Config, ResponseConfig, UploadConfig},
    inference_service::InferenceService,
    routes::api_routes,
    telemetry::Metrics,
};
use axum::{extract::DefaultBodyLimit, Router};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub struct SharedState<C: Classifier> {
    pub inference_service: Arc<InferenceService<C>>,
    pub upload: UploadConfig,
    pub response: ResponseConfig,
    pub metrics: Arc<Metrics>,
}

impl<C: Classifier> Clone for SharedState<C> {
    fn clone(&self) -> Self {
        Self {
            inference_service: self.inference_service.clone(),
            upload: self.upload.clone(),
            response: self.response.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// The full application router: API routes plus the upload ceiling, CORS
/// and request tracing layers.
pub fn create_router<C: Classifier>(state: SharedState<C>) -> Router {
    let max_bytes = state.upload.max_bytes;

    Router::new()
        .merge(api_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<C: Classifier>(
        inference_service: Arc<InferenceService<C>>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let addr = config.server.get_address();

        let app_state = SharedState {
            inference_service,
            upload: config.upload.clone(),
            response: config.response.clone(),
            metrics: Arc::new(Metrics::new()?),
        };

        let router = create_router(app_state);
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting server on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}
