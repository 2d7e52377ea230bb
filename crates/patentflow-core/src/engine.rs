use std::sync::Arc;

use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    agent::BackendSet,
    domain::DomainPackLoader,
    error::StageFailure,
    merge::merge,
    prompt::PromptSet,
    retry::RetryPolicy,
    stages::{
        ClaimConstructionStage, ClarifyStage, ExtractStage, IngestStage, PersistStage, QcStage,
        ReviseStage, RouteStage, SearchIntelStage, SearchTechnicalStage, StageContext, StageExecutor,
        StageOutcome, TimelineStage, WriteStage,
    },
    state::{PipelineState, StageDelta},
    storage::{sanitize_url, DocumentFetcher, DocumentStore},
    supervisor::{LoopPolicy, Supervisor},
    types::{Action, Decision, PipelineEvent, RunRequest, StageKind},
};

// ── Wiring ───────────────────────────────────────────────────────────────

/// External collaborators a pipeline needs.
pub struct Collaborators {
    pub backends: BackendSet,
    pub prompts: PromptSet,
    pub fetcher: Arc<dyn DocumentFetcher>,
    pub store: Arc<dyn DocumentStore>,
    pub packs: Arc<dyn DomainPackLoader>,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub loop_policy: LoopPolicy,
    pub retry: RetryPolicy,
    pub search_intel_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            loop_policy: LoopPolicy::default(),
            retry: RetryPolicy::default(),
            search_intel_enabled: true,
        }
    }
}

/// Receives progress for one run. Called synchronously between steps.
pub trait RunObserver: Send + Sync {
    fn on_step(&self, _state: &PipelineState, _decision: &Decision) {}

    fn on_finish(&self, _state: &PipelineState) {}
}

impl RunObserver for () {}

struct Stages {
    ingest: IngestStage,
    extract: ExtractStage,
    route: RouteStage,
    claim_construction: ClaimConstructionStage,
    search_technical: SearchTechnicalStage,
    timeline: TimelineStage,
    write: WriteStage,
    revise: ReviseStage,
    qc: QcStage,
    clarify: ClarifyStage,
    search_intel: Arc<SearchIntelStage>,
    persist: PersistStage,
}

/// Search intelligence task. Dropping it unawaited aborts the task.
struct Sidecar(JoinHandle<Result<Option<String>, StageFailure>>);

impl Drop for Sidecar {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────

/// Drives runs through the stage graph. One instance serves any number of
/// concurrent runs; each run's state lives only inside its own future.
pub struct Pipeline {
    stages: Stages,
    supervisor: Supervisor,
    config: EngineConfig,
    pub event_tx: broadcast::Sender<PipelineEvent>,
}

impl Pipeline {
    pub fn new(collab: Collaborators, config: EngineConfig) -> (Self, broadcast::Receiver<PipelineEvent>) {
        let (tx, rx) = broadcast::channel(256);
        let ctx = Arc::new(StageContext::new(collab.backends, collab.prompts, config.retry));
        let stages = Stages {
            ingest: IngestStage::new(collab.fetcher),
            extract: ExtractStage::new(Arc::clone(&ctx)),
            route: RouteStage::new(collab.packs),
            claim_construction: ClaimConstructionStage::new(Arc::clone(&ctx)),
            search_technical: SearchTechnicalStage::new(Arc::clone(&ctx)),
            timeline: TimelineStage::new(Arc::clone(&ctx)),
            write: WriteStage::new(Arc::clone(&ctx)),
            revise: ReviseStage::new(Arc::clone(&ctx)),
            qc: QcStage::new(Arc::clone(&ctx)),
            clarify: ClarifyStage::new(Arc::clone(&ctx)),
            search_intel: Arc::new(SearchIntelStage::new(ctx)),
            persist: PersistStage::new(collab.store),
        };
        let pipeline = Self {
            stages,
            supervisor: Supervisor::new(config.loop_policy),
            config,
            event_tx: tx,
        };
        (pipeline, rx)
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Runs to a terminal state under a fresh run id.
    pub async fn run(&self, request: RunRequest) -> PipelineState {
        self.run_observed(Uuid::new_v4().to_string(), request, &()).await
    }

    pub async fn run_observed(
        &self,
        run_id: String,
        request: RunRequest,
        observer: &dyn RunObserver,
    ) -> PipelineState {
        let mut state = PipelineState::new(run_id, request);
        state.begin();
        info!(
            run_id = %state.run_id,
            history = %sanitize_url(&state.history_ref),
            patent = %sanitize_url(&state.patent_ref),
            "pipeline run started"
        );

        self.step(&mut state, &self.stages.ingest).await;

        let mut sidecar: Option<Sidecar> = None;
        loop {
            let decision = self.supervisor.decide(&state);
            info!(
                run_id = %state.run_id,
                stage = %state.current_stage,
                action = %decision.action,
                "supervisor: {}",
                decision.reason
            );
            self.emit(PipelineEvent::Decision {
                run_id: state.run_id.clone(),
                stage: state.current_stage.clone(),
                action: decision.action,
                reason: decision.reason.clone(),
            });
            observer.on_step(&state, &decision);

            match decision.action {
                Action::Extract => {
                    if self.step(&mut state, &self.stages.extract).await {
                        self.step(&mut state, &self.stages.route).await;
                    }
                }
                Action::Analyze => {
                    if self.analyze(&mut state).await && self.config.search_intel_enabled {
                        sidecar = Some(self.spawn_search_intel(&state));
                    }
                }
                Action::Write => {
                    self.step(&mut state, &self.stages.write).await;
                }
                Action::Qc => {
                    self.step(&mut state, &self.stages.qc).await;
                }
                Action::Clarify => {
                    self.step(&mut state, &self.stages.clarify).await;
                }
                Action::Revise => {
                    self.step(&mut state, &self.stages.revise).await;
                }
                Action::Finalize => {
                    self.finalize(&mut state, sidecar.take(), &decision).await;
                    break;
                }
                Action::Abort => {
                    if let Some(task) = sidecar.take() {
                        task.0.abort();
                    }
                    state.abort(decision.reason);
                    break;
                }
            }
        }

        let message = match &state.error {
            Some(e) => {
                error!(run_id = %state.run_id, stage = %state.current_stage, "pipeline run failed: {e}");
                e.clone()
            }
            None => {
                info!(
                    run_id = %state.run_id,
                    qc_score = state.qc_score,
                    revisions = state.revision_count,
                    clarifications = state.clarification_count,
                    warnings = state.warnings.len(),
                    "pipeline run completed"
                );
                format!("completed with QC score {}", state.qc_score)
            }
        };
        self.emit(PipelineEvent::Finished {
            run_id: state.run_id.clone(),
            status: state.status,
            message,
        });
        observer.on_finish(&state);
        state
    }

    // ── Steps ─────────────────────────────────────────────────────────────

    async fn step<E: StageExecutor>(&self, state: &mut PipelineState, executor: &E) -> bool {
        let outcome = executor.execute(state).await;
        self.commit(state, executor.kind(), outcome)
    }

    fn commit(&self, state: &mut PipelineState, kind: StageKind, outcome: StageOutcome) -> bool {
        match outcome {
            Ok(delta) => match state.apply(delta) {
                Ok(()) => true,
                Err(e) => {
                    warn!(run_id = %state.run_id, stage = %kind, "{e}");
                    false
                }
            },
            Err(failure) => {
                error!(run_id = %state.run_id, stage = %kind, "{failure}");
                state.fail(failure.to_string());
                false
            }
        }
    }

    /// 2A, then 2B and 2C concurrently, then merge. Merge runs only when both
    /// branches succeeded.
    async fn analyze(&self, state: &mut PipelineState) -> bool {
        if !self.step(state, &self.stages.claim_construction).await {
            return false;
        }

        let snapshot: &PipelineState = state;
        let (b, c) = tokio::join!(
            self.stages.search_technical.execute(snapshot),
            self.stages.timeline.execute(snapshot),
        );

        let mut joined = true;
        for (kind, outcome) in [(StageKind::SearchTechnical, b), (StageKind::Timeline, c)] {
            match outcome {
                Err(failure) if !joined => {
                    error!(run_id = %state.run_id, stage = %kind, "{failure}");
                }
                outcome => joined &= self.commit(state, kind, outcome),
            }
        }
        if !joined {
            return false;
        }

        let (Some(a), Some(b), Some(c)) = (&state.claim_construction, &state.search_technical, &state.timeline)
        else {
            state.fail(StageFailure::missing(StageKind::Merge, "analysis sections").to_string());
            return false;
        };
        let record = merge(a, b, c);
        info!(
            run_id = %state.run_id,
            constructions = record.claim_construction_rows.len(),
            convergence_rows = record.convergence_rows.len(),
            event_forensics = record.event_forensics.len(),
            "forensic record merged"
        );
        self.commit(state, StageKind::Merge, Ok(StageDelta::Merged(record)))
    }

    fn spawn_search_intel(&self, state: &PipelineState) -> Sidecar {
        let stage = Arc::clone(&self.stages.search_intel);
        let snapshot = state.clone();
        Sidecar(tokio::spawn(async move { stage.generate(&snapshot).await }))
    }

    async fn finalize(&self, state: &mut PipelineState, sidecar: Option<Sidecar>, decision: &Decision) {
        if decision.degraded {
            warn!(run_id = %state.run_id, "degraded acceptance: {}", decision.reason);
            self.warn(state, decision.reason.clone());
        }

        let intel = match sidecar {
            None => None,
            Some(mut task) => match (&mut task.0).await {
                Ok(Ok(report)) => report,
                Ok(Err(failure)) => {
                    warn!(run_id = %state.run_id, "{failure}, finalizing without it");
                    self.warn(state, failure.to_string());
                    None
                }
                Err(e) => {
                    warn!(run_id = %state.run_id, "search intelligence task did not complete: {e}");
                    self.warn(state, format!("Search intelligence task did not complete: {e}"));
                    None
                }
            },
        };
        self.commit(state, StageKind::SearchIntel, Ok(StageDelta::SearchIntel(intel)));

        if !self.step(state, &self.stages.persist).await {
            let reason = state.error.clone().unwrap_or_default();
            state.abort(reason);
            return;
        }
        if state.search_intel_report.is_some() && state.artifacts.search_intel_url.is_none() {
            self.warn(state, "Search intelligence report could not be stored".to_string());
        }
        state.finalize();
    }

    fn warn(&self, state: &mut PipelineState, message: String) {
        self.emit(PipelineEvent::Warning {
            run_id: state.run_id.clone(),
            message: message.clone(),
        });
        state.warn(message);
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.event_tx.send(event);
    }
}
