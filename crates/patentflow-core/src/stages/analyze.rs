use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::info;

use super::{ensure_live, inference_failure, report_schema, StageContext, StageExecutor, StageOutcome};
use crate::{
    agent::ResponseShape,
    error::StageFailure,
    parse::parse_json,
    prompt::PromptBuilder,
    records::{ClaimConstruction, Extraction, SearchTechnical, TimelineSynthesis},
    state::{PipelineState, StageDelta},
    types::StageKind,
    validate,
};

fn extraction(state: &PipelineState, kind: StageKind) -> Result<&Extraction, StageFailure> {
    state
        .extraction
        .as_ref()
        .ok_or_else(|| StageFailure::missing(kind, "extraction data"))
}

fn claim_construction(state: &PipelineState, kind: StageKind) -> Result<&ClaimConstruction, StageFailure> {
    state
        .claim_construction
        .as_ref()
        .ok_or_else(|| StageFailure::missing(kind, "claim construction (2A) output"))
}

fn tech_pack(state: &PipelineState) -> &str {
    state.domain_pack.as_ref().map_or("", |p| p.content.as_str())
}

async fn analyze<T>(ctx: &StageContext, state: &PipelineState, kind: StageKind, prompt: String) -> Result<T, StageFailure>
where
    T: DeserializeOwned + Send,
{
    ctx.call(state, kind, prompt, Vec::new(), ResponseShape::Json, parse_json)
        .await
        .map_err(inference_failure(kind))
}

// ── 2A ───────────────────────────────────────────────────────────────────

/// Claim construction and estoppel matrix. Runs first; 2B and 2C build on it.
pub struct ClaimConstructionStage {
    ctx: Arc<StageContext>,
}

impl ClaimConstructionStage {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StageExecutor for ClaimConstructionStage {
    fn kind(&self) -> StageKind {
        StageKind::ClaimConstruction
    }

    async fn execute(&self, state: &PipelineState) -> StageOutcome {
        const KIND: StageKind = StageKind::ClaimConstruction;
        ensure_live(state, KIND)?;
        let ex = extraction(state, KIND)?;

        let prompt = PromptBuilder::new(&self.ctx.instruction(KIND))
            .json("STAGE 1 EXTRACTION", ex)
            .text("TECH PACK", tech_pack(state))
            .build();
        let out: ClaimConstruction = analyze(&self.ctx, state, KIND, prompt).await?;

        report_schema(state, KIND, &validate::claim_construction(&out));
        info!(
            run_id = %state.run_id,
            constructions = out.claim_construction_rows.len(),
            estoppel_rows = out.estoppel_matrix_rows.len(),
            "stage 2A complete"
        );
        Ok(StageDelta::ClaimConstruction(out))
    }
}

// ── 2B ───────────────────────────────────────────────────────────────────

pub struct SearchTechnicalStage {
    ctx: Arc<StageContext>,
}

impl SearchTechnicalStage {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StageExecutor for SearchTechnicalStage {
    fn kind(&self) -> StageKind {
        StageKind::SearchTechnical
    }

    async fn execute(&self, state: &PipelineState) -> StageOutcome {
        const KIND: StageKind = StageKind::SearchTechnical;
        ensure_live(state, KIND)?;
        let ex = extraction(state, KIND)?;
        let a = claim_construction(state, KIND)?;

        let record = json!({
            "metadata": ex.metadata,
            "claims_diff": ex.claims_diff,
            "key_quotes": ex.key_quotes,
            "search_records": ex.search_records,
        });
        let prompt = PromptBuilder::new(&self.ctx.instruction(KIND))
            .json("STAGE 1 EXTRACTION", &record)
            .json("STAGE 2A CLAIM CONSTRUCTION", a)
            .text("TECH PACK", tech_pack(state))
            .build();
        let out: SearchTechnical = analyze(&self.ctx, state, KIND, prompt).await?;

        report_schema(state, KIND, &validate::search_technical(&out));
        info!(
            run_id = %state.run_id,
            technical_reps = out.technical_reps.len(),
            search_gaps = out.search_gap_analysis.len(),
            convergence_rows = out.convergence_rows.len(),
            "stage 2B complete"
        );
        Ok(StageDelta::SearchTechnical(out))
    }
}

// ── 2C ───────────────────────────────────────────────────────────────────

pub struct TimelineStage {
    ctx: Arc<StageContext>,
}

impl TimelineStage {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StageExecutor for TimelineStage {
    fn kind(&self) -> StageKind {
        StageKind::Timeline
    }

    async fn execute(&self, state: &PipelineState) -> StageOutcome {
        const KIND: StageKind = StageKind::Timeline;
        ensure_live(state, KIND)?;
        let ex = extraction(state, KIND)?;
        let a = claim_construction(state, KIND)?;

        let record = json!({
            "metadata": ex.metadata,
            "events": ex.events,
            "record_discrepancies": ex.record_discrepancies,
        });
        let prompt = PromptBuilder::new(&self.ctx.instruction(KIND))
            .json("STAGE 1 EXTRACTION", &record)
            .json("STAGE 2A CLAIM CONSTRUCTION", a)
            .text("TECH PACK", tech_pack(state))
            .build();
        let out: TimelineSynthesis = analyze(&self.ctx, state, KIND, prompt).await?;

        report_schema(state, KIND, &validate::timeline(&out));
        info!(
            run_id = %state.run_id,
            event_forensics = out.event_forensics.len(),
            global_findings = out.global_findings.is_some(),
            "stage 2C complete"
        );
        Ok(StageDelta::Timeline(out))
    }
}
