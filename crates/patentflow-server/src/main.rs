use std::{sync::Arc, time::Instant};

use anyhow::{Context, Result};
use patentflow_core::{
    config::Config,
    engine::{Collaborators, Pipeline},
    jobs::{JobRegistry, JobRunner},
    storage::{DocumentFetcher, DocumentStore, HttpBlobStore, LocalDirStore},
};
use patentflow_domains::{load_prompts, TechPackLibrary};
use patentflow_server::{
    logging::{new_ring, BroadcastLayer, DEFAULT_FILTER},
    router, AppState,
};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

type DocumentIo = (Arc<dyn DocumentFetcher>, Arc<dyn DocumentStore>);

fn document_io(config: &Config) -> Result<DocumentIo> {
    match config.storage_backend.as_str() {
        "local" => {
            info!(dir = %config.local_store_dir, "using local document store");
            let store = Arc::new(LocalDirStore::new(&config.local_store_dir));
            Ok((store.clone(), store))
        }
        _ => {
            info!("using http blob store");
            let store = Arc::new(
                HttpBlobStore::new(config.inference_timeout_s)
                    .context("building blob client")?
                    .with_sas_token(config.azure_storage_sas_token.clone()),
            );
            Ok((store.clone(), store))
        }
    }
}

// ── main ──────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    let (log_tx, _log_rx) = broadcast::channel::<String>(256);
    let log_ring = new_ring();
    let json = config.log_format == "json";
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer()))
        .with(BroadcastLayer {
            tx: log_tx.clone(),
            ring: Arc::clone(&log_ring),
        })
        .init();

    info!(
        backend = %config.inference_backend,
        storage = %config.storage_backend,
        search_intel = config.search_intel_enabled,
        "starting patentflow server"
    );

    let backends = patentflow_agent::backends_from_config(&config)?;
    let (fetcher, store) = document_io(&config)?;
    let collab = Collaborators {
        backends,
        prompts: load_prompts(&config.prompts_dir),
        fetcher,
        store,
        packs: Arc::new(TechPackLibrary::new(&config.tech_pack_dir)),
    };

    let (pipeline, _pipeline_rx) = Pipeline::new(collab, config.engine_config());
    let event_tx = pipeline.event_tx.clone();
    let runner = Arc::new(JobRunner::new(
        Arc::new(pipeline),
        JobRegistry::new(),
        config.max_concurrent_runs as usize,
    ));

    let state = Arc::new(AppState {
        runner,
        start_time: Instant::now(),
        log_tx,
        log_ring,
        event_tx,
    });
    let app = router(state);

    let addr = format!("{}:{}", config.api_bind, config.api_port);
    info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
