pub mod gemini;
pub mod http;
pub mod ollama;

use std::sync::Arc;

use anyhow::{bail, Result};
use patentflow_core::{
    agent::{BackendSet, InferenceBackend},
    config::Config,
};
use tracing::{info, warn};

pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;

/// Constructs one backend by name from the shared configuration.
pub fn backend(name: &str, config: &Config) -> Result<Arc<dyn InferenceBackend>> {
    match name {
        "gemini" => {
            if config.google_api_key.is_empty() {
                warn!("GOOGLE_API_KEY is not set; gemini calls will fail");
            }
            Ok(Arc::new(
                GeminiBackend::new(&config.google_api_key, &config.gemini_model)
                    .with_generation(config.gemini_temperature, config.gemini_max_output_tokens)
                    .with_timeout(config.inference_timeout_s),
            ))
        }
        "ollama" => Ok(Arc::new(
            OllamaBackend::new(&config.ollama_url, &config.ollama_model)
                .with_temperature(config.gemini_temperature)
                .with_timeout(config.inference_timeout_s),
        )),
        other => bail!("unknown inference backend {other:?}"),
    }
}

/// Default backend plus any `STAGE_BACKENDS` overrides.
pub fn backends_from_config(config: &Config) -> Result<BackendSet> {
    let mut set = BackendSet::new(backend(&config.inference_backend, config)?);
    for (stage, name) in config.stage_backend_overrides()? {
        info!(stage = %stage, backend = %name, "stage backend override");
        set = set.with_override(stage, backend(&name, config)?);
    }
    Ok(set)
}
