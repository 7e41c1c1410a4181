use anyhow::{bail, Context, Result};
use clap::Parser;
use leaf_prediction::{
    classifier::load_backend,
    config::{self, Backend},
    diseases::DiseaseCatalog,
    inference_service::{InferenceService, PredictionResult, ServiceOptions, UploadedImage},
    labels::LabelVocabulary,
    preprocess::Preprocessor,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "leaf_classify")]
#[command(about = "Classify leaf images offline with the configured model")]
struct Args {
    /// Single image to classify
    #[arg(long, conflicts_with = "folder", required_unless_present = "folder")]
    image: Option<PathBuf>,

    /// Classify every image in this folder
    #[arg(long)]
    folder: Option<PathBuf>,

    /// Number of ranked classes to print
    #[arg(long)]
    top_k: Option<usize>,

    /// Use the color heuristic instead of the ONNX model
    #[arg(long)]
    heuristic: bool,

    /// Print results as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_target(false)
        .init();

    let mut config = config::get_configuration().context("failed to load configuration")?;
    if args.heuristic {
        config.model.backend = Backend::ColorHeuristic;
    }

    let vocabulary = LabelVocabulary::load(&config.model.labels_path())?;
    let Some(classifier) = load_backend(&config.model, &config.preprocessing, &vocabulary)
    else {
        bail!("no classifier could be loaded from {:?}", config.model.model_dir);
    };

    let service = InferenceService::new(
        Some(classifier),
        Preprocessor::new(config.preprocessing),
        vocabulary,
        DiseaseCatalog::builtin(),
        ServiceOptions {
            allowed_extensions: config.upload.allowed_extensions.clone(),
            top_k: args.top_k.unwrap_or(config.response.top_k),
        },
    );

    let images = match (&args.image, &args.folder) {
        (Some(image), _) => vec![image.clone()],
        (None, Some(folder)) => list_images(folder, &config.upload.allowed_extensions)?,
        (None, None) => bail!("either --image or --folder is required"),
    };
    if images.is_empty() {
        bail!("no images found");
    }

    let mut failures = 0;
    for path in &images {
        let upload = UploadedImage {
            filename: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            data: std::fs::read(path).with_context(|| format!("failed to read {:?}", path))?,
        };

        match service.predict(Some(upload)).await {
            Ok(result) if args.json => println!("{}", serde_json::to_string(&result)?),
            Ok(result) => print_result(path, &result),
            Err(e) => {
                failures += 1;
                eprintln!("{}: {}", path.display(), e);
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} images failed", failures, images.len());
    }

    Ok(())
}

fn list_images(folder: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(folder).with_context(|| format!("cannot read {:?}", folder))? {
        let path = entry?.path();
        let allowed = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);
        if path.is_file() && allowed {
            images.push(path);
        }
    }
    images.sort();

    Ok(images)
}

fn print_result(path: &Path, result: &PredictionResult) {
    println!(
        "{}: {} ({:.2}%) via {}",
        path.display(),
        result.disease,
        result.confidence * 100.0,
        result.detection_method
    );
    for (rank, prediction) in result.top_predictions.iter().enumerate() {
        println!(
            "  {}. {:<28} {:>6.2}%  [{}]",
            rank + 1,
            prediction.disease,
            prediction.confidence * 100.0,
            prediction.full_label
        );
    }
}
