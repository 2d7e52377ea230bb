//! Stage executors. Each reads the run state, makes at most one external call
//! and returns either a delta for the engine to apply or a failure marker.

pub mod analyze;
pub mod clarify;
pub mod extract;
pub mod ingest;
pub mod persist;
pub mod qc;
pub mod route;
pub mod search_intel;
pub mod write;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    agent::{Attachment, BackendSet, InferenceRequest, ResponseShape},
    error::{InferenceError, StageFailure},
    prompt::PromptSet,
    retry::RetryPolicy,
    state::{PipelineState, StageDelta},
    types::StageKind,
};

pub use analyze::{ClaimConstructionStage, SearchTechnicalStage, TimelineStage};
pub use clarify::ClarifyStage;
pub use extract::ExtractStage;
pub use ingest::IngestStage;
pub use persist::PersistStage;
pub use qc::QcStage;
pub use route::RouteStage;
pub use search_intel::SearchIntelStage;
pub use write::{ReviseStage, WriteStage};

pub type StageOutcome = Result<StageDelta, StageFailure>;

#[async_trait]
pub trait StageExecutor: Send + Sync {
    fn kind(&self) -> StageKind;

    async fn execute(&self, state: &PipelineState) -> StageOutcome;
}

/// Backends, prompts and retry policy shared by the model-backed stages.
pub struct StageContext {
    pub backends: BackendSet,
    pub prompts: PromptSet,
    pub retry: RetryPolicy,
}

impl StageContext {
    pub fn new(backends: BackendSet, prompts: PromptSet, retry: RetryPolicy) -> Self {
        Self {
            backends,
            prompts,
            retry,
        }
    }

    /// One model call for `stage`, parsed by `parse`, retried as a unit.
    pub(crate) async fn call<T, P>(
        &self,
        state: &PipelineState,
        stage: StageKind,
        prompt: String,
        attachments: Vec<Attachment>,
        shape: ResponseShape,
        parse: P,
    ) -> Result<T, InferenceError>
    where
        T: Send,
        P: Fn(&str) -> Result<T, InferenceError> + Sync,
    {
        let backend = self.backends.resolve(stage);
        let request = InferenceRequest {
            run_id: state.run_id.clone(),
            stage,
            system_prompt: self.prompts.get(stage).system,
            prompt,
            attachments,
            shape,
        };

        let backend = &backend;
        let request = &request;
        let parse = &parse;
        self.retry
            .run(stage, move |attempt| async move {
                debug!(
                    run_id = %request.run_id,
                    stage = %stage,
                    backend = backend.name(),
                    attempt,
                    prompt_len = request.prompt.len(),
                    "calling inference backend"
                );
                let text = backend.infer(request).await?;
                parse(&text)
            })
            .await
    }

    pub(crate) fn instruction(&self, stage: StageKind) -> String {
        self.prompts.get(stage).instruction
    }
}

/// Executors refuse to run on a failed state.
pub(crate) fn ensure_live(state: &PipelineState, stage: StageKind) -> Result<(), StageFailure> {
    if state.is_failed() {
        return Err(StageFailure::new(stage, "skipped, run already failed"));
    }
    Ok(())
}

pub(crate) fn inference_failure(stage: StageKind) -> impl Fn(InferenceError) -> StageFailure {
    move |e| StageFailure::new(stage, e.to_string())
}

/// Logs advisory schema problems. Output is kept either way.
pub(crate) fn report_schema(state: &PipelineState, stage: StageKind, problems: &[String]) {
    if problems.is_empty() {
        return;
    }
    warn!(
        run_id = %state.run_id,
        stage = %stage,
        problems = problems.len(),
        first = %problems[0],
        "stage output does not match the strict schema, continuing"
    );
}
