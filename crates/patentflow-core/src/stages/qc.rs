use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{ensure_live, inference_failure, StageContext, StageExecutor, StageOutcome};
use crate::{
    agent::ResponseShape,
    error::StageFailure,
    parse::split_qc_response,
    prompt::PromptBuilder,
    qc::{QcVerdict, Severity},
    state::{PipelineState, StageDelta},
    types::StageKind,
};

/// Stage 4: verifies the draft against the record, grades it and returns a
/// corrected copy.
pub struct QcStage {
    ctx: Arc<StageContext>,
}

impl QcStage {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StageExecutor for QcStage {
    fn kind(&self) -> StageKind {
        StageKind::Qc
    }

    async fn execute(&self, state: &PipelineState) -> StageOutcome {
        const KIND: StageKind = StageKind::Qc;
        ensure_live(state, KIND)?;
        let draft = state
            .report
            .as_deref()
            .ok_or_else(|| StageFailure::missing(KIND, "report draft"))?;

        let mut prompt = PromptBuilder::new(&self.ctx.instruction(KIND));
        if let Some(extraction) = &state.extraction {
            prompt = prompt.json("STAGE 1 EXTRACTION", extraction);
        }
        if let Some(forensic) = &state.forensic {
            prompt = prompt.json("STAGE 2 FORENSIC RECORD", forensic);
        }
        let prompt = prompt.text("STAGE 3 REPORT", draft).build();

        let (findings, corrected) = self
            .ctx
            .call(state, KIND, prompt, Vec::new(), ResponseShape::QcSections, split_qc_response)
            .await
            .map_err(inference_failure(KIND))?;

        let verdict = QcVerdict::evaluate(findings, corrected, draft);
        info!(
            run_id = %state.run_id,
            score = verdict.score,
            grade = ?verdict.grade,
            critical = verdict.findings.count(Severity::Critical),
            major = verdict.findings.count(Severity::Major),
            passed = verdict.passed,
            needs_revision = verdict.needs_revision,
            needs_clarification = verdict.needs_clarification,
            "QC verdict"
        );
        Ok(StageDelta::QcComplete(verdict))
    }
}
