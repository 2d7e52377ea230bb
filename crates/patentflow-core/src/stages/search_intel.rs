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

/// Sidecar report on examiner search quality. Depends only on extraction and
/// the forensic record; the engine never lets its failure fail the run.
pub struct SearchIntelStage {
    ctx: Arc<StageContext>,
}

impl SearchIntelStage {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }

    /// `Ok(None)` when the record carries nothing to analyze.
    pub async fn generate(&self, state: &PipelineState) -> Result<Option<String>, StageFailure> {
        const KIND: StageKind = StageKind::SearchIntel;
        ensure_live(state, KIND)?;

        let (Some(extraction), Some(forensic)) = (&state.extraction, &state.forensic) else {
            info!(run_id = %state.run_id, "search intelligence skipped, analysis incomplete");
            return Ok(None);
        };
        if !extraction.has_search_records() {
            info!(run_id = %state.run_id, "search intelligence skipped, no search records");
            return Ok(None);
        }

        let mut prompt = PromptBuilder::new(&self.ctx.instruction(KIND))
            .json("SEARCH RECORDS", &extraction.search_records)
            .json("CONVERGENCE ANALYSIS", &forensic.convergence_rows)
            .json("TECHNICAL REPRESENTATIONS", &forensic.technical_reps);
        if let Some(pack) = &state.domain_pack {
            prompt = prompt.text("TECH PACK", &pack.content);
        }

        let report = self
            .ctx
            .call(state, KIND, prompt.build(), Vec::new(), ResponseShape::Markdown, markdown_body)
            .await
            .map_err(inference_failure(KIND))?;

        info!(run_id = %state.run_id, report_len = report.len(), "search intelligence report generated");
        Ok(Some(report))
    }
}

#[async_trait]
impl StageExecutor for SearchIntelStage {
    fn kind(&self) -> StageKind {
        StageKind::SearchIntel
    }

    async fn execute(&self, state: &PipelineState) -> StageOutcome {
        self.generate(state).await.map(StageDelta::SearchIntel)
    }
}
