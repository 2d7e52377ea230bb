use std::{sync::Arc, time::Instant};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
    routing::{get, post},
    Router,
};
use patentflow_core::{
    jobs::{JobRunner, JobSnapshot},
    types::{PipelineEvent, RunRequest, RunStatus},
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, UnboundedReceiverStream};
use tokio_stream::StreamExt;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::logging::LogRing;

// ── AppState ──────────────────────────────────────────────────────────────

pub struct AppState {
    pub runner: Arc<JobRunner>,
    pub start_time: Instant,
    pub log_tx: broadcast::Sender<String>,
    pub log_ring: LogRing,
    pub event_tx: broadcast::Sender<PipelineEvent>,
}

// ── Error helper ──────────────────────────────────────────────────────────

fn bad_request(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

// ── Request body types ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    #[serde(default)]
    pub patent_pdf_url: String,
    #[serde(default)]
    pub history_pdf_url: String,
    #[serde(default)]
    pub tech_center_override: Option<String>,
}

impl GenerateBody {
    fn into_request(self) -> Result<RunRequest, (StatusCode, Json<Value>)> {
        if self.history_pdf_url.trim().is_empty() {
            return Err(bad_request("history_pdf_url is required"));
        }
        let mut request = RunRequest::new(self.patent_pdf_url.trim(), self.history_pdf_url.trim());
        if let Some(code) = self.tech_center_override.filter(|c| !c.trim().is_empty()) {
            request = request.with_tech_center(code.trim());
        }
        Ok(request)
    }
}

// ── Router ────────────────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(health))
        // Reports
        .route("/api/patent-reports/generate", post(generate))
        .route("/api/patent-reports/generate/async", post(generate_async))
        .route("/api/patent-reports/status/:job_id", get(job_status))
        .route("/api/patent-reports/jobs", get(list_jobs))
        // SSE
        .route("/api/logs", get(sse_logs))
        .route("/api/events", get(sse_events))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_s": state.start_time.elapsed().as_secs(),
    }))
}

async fn generate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateBody>,
) -> (StatusCode, Json<Value>) {
    let request = match body.into_request() {
        Ok(r) => r,
        Err(rejection) => return rejection,
    };
    let summary = state.runner.run(request).await;
    let status = if summary.pipeline_status == RunStatus::Failed {
        warn!(run_id = %summary.run_id, "report generation failed");
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    match serde_json::to_value(&summary) {
        Ok(body) => (status, Json(body)),
        Err(e) => {
            tracing::error!("internal error: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() })))
        }
    }
}

async fn generate_async(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateBody>,
) -> Result<(StatusCode, Json<JobSnapshot>), (StatusCode, Json<Value>)> {
    let request = body.into_request()?;
    let snapshot = state.runner.start(request);
    info!(job_id = %snapshot.job_id, "report job accepted");
    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobSnapshot>, StatusCode> {
    state.runner.poll(&job_id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobSnapshot>> {
    Json(state.runner.jobs())
}

// SSE logs: replays the ring, then streams live lines

async fn sse_logs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    // Subscribe before snapshotting the ring so no line falls between them
    let live_rx = state.log_tx.subscribe();
    let history: Vec<String> = state
        .log_ring
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .iter()
        .cloned()
        .collect();
    tokio::spawn(async move {
        for line in history {
            if tx.send(line).is_err() {
                return;
            }
        }
        let mut live_rx = live_rx;
        loop {
            match live_rx.recv().await {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    });
    let stream = UnboundedReceiverStream::new(rx)
        .map(|data| Ok::<_, std::convert::Infallible>(Event::default().data(data)));
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("ping"),
    )
}

// SSE pipeline events: live only, lagged events are skipped

async fn sse_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let stream = BroadcastStream::new(state.event_tx.subscribe()).filter_map(|evt| {
        let evt = evt.ok()?;
        let data = serde_json::to_string(&evt).ok()?;
        Some(Ok(Event::default().event(evt.kind()).data(data)))
    });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("ping"),
    )
}
