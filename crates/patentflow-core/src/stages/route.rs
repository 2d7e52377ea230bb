use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{ensure_live, StageExecutor, StageOutcome};
use crate::{
    domain::{resolve_tech_center, DomainPackLoader},
    records::PatentMetadata,
    state::{PipelineState, StageDelta},
    types::StageKind,
};

/// Selects the tech pack for the run. Never fails on its own.
pub struct RouteStage {
    loader: Arc<dyn DomainPackLoader>,
}

impl RouteStage {
    pub fn new(loader: Arc<dyn DomainPackLoader>) -> Self {
        Self { loader }
    }
}

#[async_trait]
impl StageExecutor for RouteStage {
    fn kind(&self) -> StageKind {
        StageKind::Route
    }

    async fn execute(&self, state: &PipelineState) -> StageOutcome {
        ensure_live(state, StageKind::Route)?;

        let fallback = PatentMetadata::default();
        let metadata = state.extraction.as_ref().map_or(&fallback, |e| &e.metadata);
        let tech_center = resolve_tech_center(state.tech_center_override.as_deref(), metadata);
        let pack = self.loader.load_domain_pack(&tech_center).await;

        info!(
            run_id = %state.run_id,
            tech_center = %tech_center,
            pack = %pack.name,
            pack_len = pack.content.len(),
            "tech pack selected"
        );
        Ok(StageDelta::Routed { tech_center, pack })
    }
}
