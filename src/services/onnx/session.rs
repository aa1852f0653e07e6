// ONNX Runtime session construction with backend selection

use anyhow::{Context, Result};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::{info, warn};

#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;

/// Load a model from disk and build a session.
///
/// With `forced_backend` set (`CPU`, `CUDA`) only that backend is tried.
/// Otherwise accelerated backends compiled in via features are tried first,
/// then plain CPU.
///
/// Returns (backend_name, Session)
pub fn build_session(
    model_path: &Path,
    model_name: &str,
    forced_backend: Option<&str>,
    intra_threads: usize,
) -> Result<(String, Session)> {
    if !model_path.exists() {
        anyhow::bail!(
            "{} model not found at: {}",
            model_name,
            model_path.display()
        );
    }

    if let Some(backend) = forced_backend.filter(|b| !b.eq_ignore_ascii_case("auto")) {
        info!("INFERENCE_BACKEND={}, forcing backend for {}", backend, model_name);
        return try_forced_backend(backend, model_path, model_name, intra_threads);
    }

    #[cfg(feature = "cuda")]
    {
        match cuda_session(model_path, intra_threads) {
            Ok(session) => {
                info!("✓ Using CUDA acceleration for {}", model_name);
                return Ok(("CUDA".to_string(), session));
            }
            Err(e) => warn!("CUDA unavailable for {}: {:#}", model_name, e),
        }
    }

    let session = cpu_session(model_path, intra_threads).with_context(|| {
        format!(
            "Failed to load {} model from {}",
            model_name,
            model_path.display()
        )
    })?;

    info!("Using CPU inference for {} ({} threads)", model_name, intra_threads);
    Ok(("CPU".to_string(), session))
}

fn cpu_session(model_path: &Path, intra_threads: usize) -> Result<Session> {
    let session = Session::builder()
        .context("Failed to create session builder")?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .context("Failed to configure CPU provider")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(intra_threads)
        .context("Failed to configure intra-op threads")?
        .with_inter_threads(1)
        .context("Failed to configure inter-op threads")?
        .commit_from_file(model_path)?;
    Ok(session)
}

#[cfg(feature = "cuda")]
fn cuda_session(model_path: &Path, intra_threads: usize) -> Result<Session> {
    let session = Session::builder()
        .context("Failed to create session builder")?
        .with_execution_providers([CUDAExecutionProvider::default().build().error_on_failure()])
        .context("Failed to configure CUDA provider")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(intra_threads)
        .context("Failed to configure intra-op threads")?
        .with_inter_threads(1)
        .context("Failed to configure inter-op threads")?
        .commit_from_file(model_path)?;
    Ok(session)
}

fn try_forced_backend(
    backend: &str,
    model_path: &Path,
    model_name: &str,
    intra_threads: usize,
) -> Result<(String, Session)> {
    match backend.to_lowercase().as_str() {
        #[cfg(feature = "cuda")]
        "cuda" => {
            let session = cuda_session(model_path, intra_threads)
                .with_context(|| format!("Failed to load {} with CUDA", model_name))?;
            info!("✓ Forced CUDA backend for {}", model_name);
            Ok(("CUDA".to_string(), session))
        }

        "cpu" => {
            let session = cpu_session(model_path, intra_threads)
                .with_context(|| format!("Failed to load {} with CPU", model_name))?;
            info!("✓ Forced CPU backend for {}", model_name);
            Ok(("CPU".to_string(), session))
        }

        _ => {
            warn!(
                "Unknown or unavailable backend '{}', falling back to auto-detection for {}",
                backend, model_name
            );
            build_session(model_path, model_name, None, intra_threads)
        }
    }
}
