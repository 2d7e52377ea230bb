use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    engine::{Pipeline, RunObserver},
    state::PipelineState,
    types::{Decision, RunRequest, RunStatus, RunSummary, Stage},
};

/// What a poller sees for one background run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub status: RunStatus,
    pub current_stage: String,
    pub progress_percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<RunSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobSnapshot {
    fn queued(job_id: String) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            status: RunStatus::Pending,
            current_stage: "queued".into(),
            progress_percent: 0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ── Registry ─────────────────────────────────────────────────────────────

/// In-memory job table. Entries live for the life of the process.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, JobSnapshot>>,
}

impl JobRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, JobSnapshot>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, job_id: &str) -> JobSnapshot {
        let snapshot = JobSnapshot::queued(job_id.to_string());
        self.lock().insert(job_id.to_string(), snapshot.clone());
        snapshot
    }

    /// Records progress. Terminal jobs are left untouched.
    pub fn update(&self, job_id: &str, stage: &Stage) {
        let mut jobs = self.lock();
        let Some(job) = jobs.get_mut(job_id) else { return };
        if job.status.is_terminal() {
            return;
        }
        job.status = RunStatus::Processing;
        job.current_stage = stage.to_string();
        job.progress_percent = job.progress_percent.max(stage.progress_percent());
        job.updated_at = Utc::now();
    }

    pub fn complete(&self, job_id: &str, summary: RunSummary) {
        let mut jobs = self.lock();
        let Some(job) = jobs.get_mut(job_id) else { return };
        job.status = summary.pipeline_status;
        job.current_stage = summary.current_stage.to_string();
        job.progress_percent = 100;
        job.error = summary.error.clone();
        job.result = Some(summary);
        job.updated_at = Utc::now();
    }

    pub fn fail(&self, job_id: &str, message: impl Into<String>) {
        let mut jobs = self.lock();
        let Some(job) = jobs.get_mut(job_id) else { return };
        job.status = RunStatus::Failed;
        job.current_stage = Stage::Aborted.to_string();
        job.progress_percent = 100;
        job.error = Some(message.into());
        job.updated_at = Utc::now();
    }

    pub fn get(&self, job_id: &str) -> Option<JobSnapshot> {
        self.lock().get(job_id).cloned()
    }

    /// All jobs, newest first.
    pub fn list(&self) -> Vec<JobSnapshot> {
        let mut jobs: Vec<JobSnapshot> = self.lock().values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }
}

/// Mirrors engine progress into the registry.
pub struct JobProgress {
    job_id: String,
    registry: Arc<JobRegistry>,
}

impl RunObserver for JobProgress {
    fn on_step(&self, state: &PipelineState, _decision: &Decision) {
        self.registry.update(&self.job_id, &state.current_stage);
    }

    fn on_finish(&self, state: &PipelineState) {
        self.registry.complete(&self.job_id, state.summary());
    }
}

// ── Runner ───────────────────────────────────────────────────────────────

/// Front door for runs: synchronous, or started in the background and polled.
/// Concurrent runs are bounded by a semaphore.
pub struct JobRunner {
    pipeline: Arc<Pipeline>,
    registry: Arc<JobRegistry>,
    permits: Arc<Semaphore>,
}

impl JobRunner {
    pub fn new(pipeline: Arc<Pipeline>, registry: Arc<JobRegistry>, max_concurrent: usize) -> Self {
        Self {
            pipeline,
            registry,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Runs to completion and returns the summary.
    pub async fn run(&self, request: RunRequest) -> RunSummary {
        let run_id = Uuid::new_v4().to_string();
        let _permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(run_id = %run_id, "run limiter closed: {e}");
                None
            }
        };
        self.pipeline.run_observed(run_id, request, &()).await.summary()
    }

    /// Registers a job and runs it in the background. Returns immediately.
    pub fn start(&self, request: RunRequest) -> JobSnapshot {
        let job_id = Uuid::new_v4().to_string();
        let snapshot = self.registry.register(&job_id);
        info!(job_id = %job_id, "job queued");

        let pipeline = Arc::clone(&self.pipeline);
        let registry = Arc::clone(&self.registry);
        let permits = Arc::clone(&self.permits);
        let id = job_id.clone();
        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(p) => p,
                Err(e) => {
                    registry.fail(&id, format!("run limiter closed: {e}"));
                    return;
                }
            };
            let observer = JobProgress {
                job_id: id.clone(),
                registry: Arc::clone(&registry),
            };
            // Inner task so a panicking run still leaves the job terminal
            let run_id = id.clone();
            let run = tokio::spawn(async move { pipeline.run_observed(run_id, request, &observer).await });
            match run.await {
                Ok(state) => info!(job_id = %id, status = %state.status, "job finished"),
                Err(e) => {
                    error!(job_id = %id, "job run aborted: {e}");
                    registry.fail(&id, format!("run aborted: {e}"));
                }
            }
        });

        snapshot
    }

    pub fn poll(&self, job_id: &str) -> Option<JobSnapshot> {
        self.registry.get(job_id)
    }

    pub fn jobs(&self) -> Vec<JobSnapshot> {
        self.registry.list()
    }
}
