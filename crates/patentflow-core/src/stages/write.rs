use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{ensure_live, inference_failure, StageContext, StageExecutor, StageOutcome};
use crate::{
    agent::ResponseShape,
    error::StageFailure,
    parse::markdown_body,
    prompt::PromptBuilder,
    state::{PipelineState, StageDelta},
    types::StageKind,
};

/// Stage 3: drafts the litigation report from the extraction and forensic
/// record. After a clarification round it regenerates with the answers.
pub struct WriteStage {
    ctx: Arc<StageContext>,
}

impl WriteStage {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StageExecutor for WriteStage {
    fn kind(&self) -> StageKind {
        StageKind::Write
    }

    async fn execute(&self, state: &PipelineState) -> StageOutcome {
        const KIND: StageKind = StageKind::Write;
        ensure_live(state, KIND)?;
        let extraction = state
            .extraction
            .as_ref()
            .ok_or_else(|| StageFailure::missing(KIND, "extraction data"))?;
        let forensic = state
            .forensic
            .as_ref()
            .ok_or_else(|| StageFailure::missing(KIND, "forensic record"))?;

        let mut prompt = PromptBuilder::new(&self.ctx.instruction(KIND))
            .json("STAGE 1 EXTRACTION", extraction)
            .json("STAGE 2 FORENSIC RECORD", forensic);
        if !state.clarification_answers.is_empty() {
            prompt = prompt.json("CLARIFICATIONS", &state.clarification_answers);
        }
        let regenerating = state.report.is_some();

        let report = self
            .ctx
            .call(state, KIND, prompt.build(), Vec::new(), ResponseShape::Markdown, markdown_body)
            .await
            .map_err(inference_failure(KIND))?;

        info!(
            run_id = %state.run_id,
            report_len = report.len(),
            regenerating,
            clarifications = state.clarification_answers.len(),
            "report drafted"
        );
        Ok(StageDelta::Written(report))
    }
}

/// Rewrites the current draft against the last QC issue list.
pub struct ReviseStage {
    ctx: Arc<StageContext>,
}

impl ReviseStage {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StageExecutor for ReviseStage {
    fn kind(&self) -> StageKind {
        StageKind::Revise
    }

    async fn execute(&self, state: &PipelineState) -> StageOutcome {
        const KIND: StageKind = StageKind::Revise;
        ensure_live(state, KIND)?;
        let draft = state
            .report
            .as_deref()
            .ok_or_else(|| StageFailure::missing(KIND, "report draft"))?;
        let findings = state
            .qc_result
            .as_ref()
            .ok_or_else(|| StageFailure::missing(KIND, "QC findings"))?;

        let mut prompt = PromptBuilder::new(&self.ctx.instruction(KIND))
            .text("CURRENT REPORT", draft)
            .json("QC ISSUES", &findings.qc_issues)
            .text("QC SUMMARY", &findings.summary);
        if let Some(forensic) = &state.forensic {
            prompt = prompt.json("STAGE 2 FORENSIC RECORD", forensic);
        }

        let report = self
            .ctx
            .call(state, KIND, prompt.build(), Vec::new(), ResponseShape::Markdown, markdown_body)
            .await
            .map_err(inference_failure(KIND))?;

        info!(
            run_id = %state.run_id,
            revision = state.revision_count + 1,
            issues = findings.qc_issues.len(),
            report_len = report.len(),
            "report revised"
        );
        Ok(StageDelta::Revised(report))
    }
}
