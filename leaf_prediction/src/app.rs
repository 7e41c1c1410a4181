use crate::{
    classifier::load_backend,
    config::Config,
    diseases::DiseaseCatalog,
    inference_service::{InferenceService, ServiceOptions},
    labels::LabelVocabulary,
    preprocess::Preprocessor,
    server::HttpServer,
};
use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let labels_path = config.model.labels_path();
    let vocabulary = match LabelVocabulary::load(&labels_path) {
        Ok(vocabulary) => vocabulary,
        Err(e) => {
            tracing::error!("Failed to load label vocabulary: {}", e);
            return Err(Box::new(e));
        }
    };
    tracing::info!(
        "Loaded {} labels from {:?} (version {})",
        vocabulary.len(),
        labels_path,
        vocabulary.version().unwrap_or("unversioned")
    );

    let classifier = load_backend(&config.model, &config.preprocessing, &vocabulary);
    let inference_service = Arc::new(InferenceService::new(
        classifier,
        Preprocessor::new(config.preprocessing),
        vocabulary,
        DiseaseCatalog::builtin(),
        ServiceOptions {
            allowed_extensions: config.upload.allowed_extensions.clone(),
            top_k: config.response.top_k,
        },
    ));

    let server = HttpServer::new(inference_service, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_handle = server.run(shutdown_tx.subscribe()).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("Server stopped with an error: {}", e),
        Err(e) => tracing::error!("Server task failed: {}", e),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
