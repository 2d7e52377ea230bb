// Tests for the REST surface.
//
// The router is served on an ephemeral port over a real pipeline whose
// backend answers every stage with a fixed reply. Source documents and
// artifacts live in a temporary directory through the local store.

use std::{path::PathBuf, sync::Arc, time::Duration, time::Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::broadcast;
use tracing_test::traced_test;

use patentflow_core::{
    agent::{BackendSet, InferenceBackend, InferenceRequest},
    domain::{DomainPack, DomainPackLoader},
    engine::{Collaborators, EngineConfig, Pipeline},
    error::InferenceError,
    jobs::{JobRegistry, JobRunner},
    prompt::PromptSet,
    retry::RetryPolicy,
    storage::LocalDirStore,
    types::StageKind,
};
use patentflow_server::{logging::new_ring, router, AppState};

// ── Fakes ────────────────────────────────────────────────────────────────────

struct FixedBackend;

#[async_trait]
impl InferenceBackend for FixedBackend {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        let reply = match request.stage {
            StageKind::Extract => EXTRACTION,
            StageKind::ClaimConstruction => r#"{"claim_construction_rows": [{"term": "widget"}], "estoppel_matrix_rows": [], "construction_summary": "c", "estoppel_summary": "e"}"#,
            StageKind::SearchTechnical => r#"{"technical_reps": [{"rep": "r"}], "search_gap_analysis": [], "convergence_rows": [{"reference": "Smith"}], "technical_summary": "t", "search_summary": "s"}"#,
            StageKind::Timeline => r#"{"event_forensics": [], "global_findings": null, "timeline_summary": "tl"}"#,
            StageKind::Write => "# Litigation Report\n\nDraft body.",
            StageKind::Qc => QC_PASS,
            StageKind::SearchIntel => "# Search Intelligence\n\nNarrow search.",
            other => return Err(InferenceError::fatal(format!("unexpected stage {other}"))),
        };
        Ok(reply.to_string())
    }
}

struct StaticPacks;

#[async_trait]
impl DomainPackLoader for StaticPacks {
    async fn load_domain_pack(&self, code: &str) -> DomainPack {
        DomainPack {
            code: code.to_string(),
            name: "software".into(),
            content: "Software conventions.".into(),
        }
    }
}

const EXTRACTION: &str = r#"{
  "metadata": {"application_number": "16/123,456", "title": "Widget", "tech_center": "2100"},
  "events": [{"date": "2020-01-01", "type": "Non-Final Rejection"}],
  "claims_diff": [],
  "key_quotes": {},
  "search_records": {"searches": [{"query": "widget"}]},
  "record_discrepancies": []
}"#;

const QC_PASS: &str = "### QC_JSON_OUTPUT\n```json\n{\"quality_grade\": \"A\", \"qc_issues\": []}\n```\n\n### FINAL_REPORT_OUTPUT\n```markdown\n# Litigation Report\n\nCorrected body.\n```\n";

// ── Harness ──────────────────────────────────────────────────────────────────

struct Server {
    base: String,
    dir: TempDir,
    client: reqwest::Client,
}

impl Server {
    fn history(&self) -> String {
        self.dir.path().join("case42.pdf").display().to_string()
    }

    fn artifact(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{path}", self.base))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(format!("{}{path}", self.base)).send().await.unwrap()
    }
}

async fn serve() -> Server {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("case42.pdf"), b"%PDF-1.7 history").unwrap();

    let store = Arc::new(LocalDirStore::new(dir.path()));
    let collab = Collaborators {
        backends: BackendSet::new(Arc::new(FixedBackend)),
        prompts: PromptSet::new(),
        fetcher: store.clone(),
        store,
        packs: Arc::new(StaticPacks),
    };
    let config = EngineConfig {
        retry: RetryPolicy::immediate(1),
        ..EngineConfig::default()
    };
    let (pipeline, _rx) = Pipeline::new(collab, config);
    let event_tx = pipeline.event_tx.clone();
    let (log_tx, _) = broadcast::channel(16);
    let state = Arc::new(AppState {
        runner: Arc::new(JobRunner::new(Arc::new(pipeline), JobRegistry::new(), 2)),
        start_time: Instant::now(),
        log_tx,
        log_ring: new_ring(),
        event_tx,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    Server {
        base: format!("http://{addr}"),
        dir,
        client: reqwest::Client::new(),
    }
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn health_reports_ok() {
    let server = serve().await;
    let body: Value = server.get("/api/health").await.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

// =============================================================================
// Synchronous generation
// =============================================================================

#[tokio::test]
async fn generate_runs_to_completion_and_writes_artifacts() {
    let server = serve().await;

    let resp = server
        .post("/api/patent-reports/generate", json!({ "history_pdf_url": server.history() }))
        .await;

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["pipeline_status"], "completed");
    assert_eq!(body["qc_score"], 10);
    assert_eq!(body["revision_count"], 0);
    assert!(body["final_report_url"].as_str().unwrap().ends_with("case42_Final_Report.md"));
    assert!(body["search_intel_url"].is_string());

    let final_report = std::fs::read_to_string(server.artifact("case42_Final_Report.md")).unwrap();
    assert!(final_report.contains("Corrected body."));
    assert!(server.artifact("case42_QC_Findings.json").exists());
}

#[tokio::test]
async fn generate_without_history_is_rejected() {
    let server = serve().await;

    let resp = server
        .post("/api/patent-reports/generate", json!({ "patent_pdf_url": "https://acct/cases/p.pdf" }))
        .await;

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("history_pdf_url"));
}

#[tokio::test]
#[traced_test]
async fn failed_run_returns_500_with_error() {
    let server = serve().await;
    let missing = server.dir.path().join("absent.pdf").display().to_string();

    let resp = server
        .post("/api/patent-reports/generate", json!({ "history_pdf_url": missing }))
        .await;

    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["pipeline_status"], "failed");
    assert!(body["error"].as_str().unwrap().contains("Document ingest"));
    assert!(body["final_report_url"].is_null());
    assert!(logs_contain("report generation failed"));
}

// =============================================================================
// Background jobs
// =============================================================================

#[tokio::test]
async fn async_job_is_accepted_then_polled_to_completion() {
    let server = serve().await;

    let resp = server
        .post(
            "/api/patent-reports/generate/async",
            json!({ "history_pdf_url": server.history(), "tech_center_override": "2400" }),
        )
        .await;

    assert_eq!(resp.status(), 202);
    let queued: Value = resp.json().await.unwrap();
    assert_eq!(queued["status"], "pending");
    assert_eq!(queued["current_stage"], "queued");
    assert_eq!(queued["progress_percent"], 0);
    let job_id = queued["job_id"].as_str().unwrap().to_string();

    let mut snapshot = Value::Null;
    for _ in 0..200 {
        snapshot = server
            .get(&format!("/api/patent-reports/status/{job_id}"))
            .await
            .json()
            .await
            .unwrap();
        if snapshot["status"] == "completed" || snapshot["status"] == "failed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(snapshot["status"], "completed", "{snapshot}");
    assert_eq!(snapshot["progress_percent"], 100);
    assert_eq!(snapshot["result"]["run_id"], job_id.as_str());

    let jobs: Vec<Value> = server.get("/api/patent-reports/jobs").await.json().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["job_id"], job_id.as_str());
}

#[tokio::test]
async fn unknown_job_is_404() {
    let server = serve().await;
    let resp = server.get("/api/patent-reports/status/no-such-job").await;
    assert_eq!(resp.status(), 404);
}
