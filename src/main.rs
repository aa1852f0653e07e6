// Command line capture runner: live frame plus capture over image files

use specimen_workflow::{
    core::Config,
    orchestration::ImagingSession,
    services::{onnx::OnnxProviders, InMemorySpecimenStore, InferenceRepository},
    utils::{load_image_async, Metrics},
};

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::new().context("Failed to load configuration")?;

    let filter = EnvFilter::new(format!(
        "specimen_workflow={},ort=off",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        anyhow::bail!("usage: specimen_capture <image>...");
    }

    info!(
        "Session type {} (box selection {:?}, auto-correct {})",
        config.capture.session_type,
        config.capture.box_selection,
        config.capture.auto_correct_specimen_id
    );

    // Model loading is blocking work
    let inference = config.inference.clone();
    let providers = tokio::task::spawn_blocking(move || OnnxProviders::load(&inference))
        .await
        .context("Model loading task failed")??;

    let metrics = Metrics::new();
    let repository = Arc::new(InferenceRepository::with_metrics(providers, metrics.clone()));
    let store = Arc::new(InMemorySpecimenStore::new());
    let session_id = format!("cli-{}", std::process::id());
    let session = ImagingSession::new(session_id, repository, store.clone(), &config.capture);

    for path in &paths {
        let image = match load_image_async(path.as_str()).await {
            Ok(image) => Arc::new(image),
            Err(e) => {
                warn!("Skipping {}: {:#}", path, e);
                continue;
            }
        };

        let live = session.process_live_frame(image.clone()).await;
        info!(
            "{}: {} detection(s), id {:?}",
            path,
            live.inference_results.len(),
            live.specimen_id
        );

        let specimen_id = Some(live.specimen_id.as_str()).filter(|id| !id.is_empty());
        match session.capture(image, specimen_id).await {
            Ok(record) => println!("{}", serde_json::to_string(&record)?),
            Err(e) => error!("{}: capture failed: {}", path, e),
        }
    }

    session.close().await?;

    info!("Stored {} record(s)", store.len());
    info!("{}", serde_json::to_string(&metrics.snapshot())?);
    Ok(())
}
