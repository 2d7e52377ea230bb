use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{ensure_live, inference_failure, report_schema, StageContext, StageExecutor, StageOutcome};
use crate::{
    agent::{Attachment, ResponseShape},
    error::StageFailure,
    parse::parse_json,
    prompt::PromptBuilder,
    records::Extraction,
    state::{PipelineState, StageDelta},
    types::StageKind,
    validate,
};

/// Stage 1: metadata, events, claim amendments, quotes and search records
/// from the file wrapper (and the issued patent when supplied).
pub struct ExtractStage {
    ctx: Arc<StageContext>,
}

impl ExtractStage {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StageExecutor for ExtractStage {
    fn kind(&self) -> StageKind {
        StageKind::Extract
    }

    async fn execute(&self, state: &PipelineState) -> StageOutcome {
        const KIND: StageKind = StageKind::Extract;
        ensure_live(state, KIND)?;

        let history = state
            .history_pdf
            .clone()
            .ok_or_else(|| StageFailure::missing(KIND, "prosecution history document"))?;
        let base = state.base_name.as_deref().unwrap_or("document");

        let mut attachments = vec![Attachment::pdf(format!("{base}.pdf"), history)];
        let mut documents = "Attached: the prosecution history file wrapper.".to_string();
        if let Some(patent) = state.patent_pdf.clone() {
            attachments.push(Attachment::pdf("issued_patent.pdf", patent));
            documents.push_str(" Also attached: the issued patent.");
        }

        let prompt = PromptBuilder::new(&self.ctx.instruction(KIND))
            .text("DOCUMENTS", &documents)
            .build();

        let extraction: Extraction = self
            .ctx
            .call(state, KIND, prompt, attachments, ResponseShape::Json, parse_json)
            .await
            .map_err(inference_failure(KIND))?;

        report_schema(state, KIND, &validate::extraction(&extraction));
        info!(
            run_id = %state.run_id,
            events = extraction.events.len(),
            claims = extraction.claims_diff.len(),
            discrepancies = extraction.record_discrepancies.len(),
            "extraction complete"
        );
        Ok(StageDelta::Extracted(extraction))
    }
}
