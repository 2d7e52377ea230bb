use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{ensure_live, StageExecutor, StageOutcome};
use crate::{
    error::StageFailure,
    state::{PipelineState, StageDelta},
    storage::{base_name, sanitize_url, split_container_and_name, DocumentFetcher},
    types::StageKind,
};

/// Fetches the source PDFs and derives where outputs will be written.
pub struct IngestStage {
    fetcher: Arc<dyn DocumentFetcher>,
}

impl IngestStage {
    pub fn new(fetcher: Arc<dyn DocumentFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl StageExecutor for IngestStage {
    fn kind(&self) -> StageKind {
        StageKind::Ingest
    }

    async fn execute(&self, state: &PipelineState) -> StageOutcome {
        const KIND: StageKind = StageKind::Ingest;
        ensure_live(state, KIND)?;

        let history_ref = state.history_ref.trim();
        if history_ref.is_empty() {
            return Err(StageFailure::missing(KIND, "prosecution history reference"));
        }
        let fail = |e: crate::error::DocumentError| StageFailure::new(KIND, e.to_string());

        let (container_url, _) = split_container_and_name(history_ref).map_err(fail)?;
        let base_name = base_name(history_ref)
            .ok_or_else(|| StageFailure::new(KIND, format!("no file name in {}", sanitize_url(history_ref))))?;

        let patent_ref = state.patent_ref.trim();
        let (history, patent) = if patent_ref.is_empty() {
            (self.fetcher.fetch(history_ref).await, None)
        } else {
            let (h, p) = tokio::join!(self.fetcher.fetch(history_ref), self.fetcher.fetch(patent_ref));
            (h, Some(p))
        };
        let history_pdf = history.map_err(fail)?;
        let patent_pdf = patent.transpose().map_err(fail)?;

        info!(
            run_id = %state.run_id,
            base_name = %base_name,
            history_bytes = history_pdf.len(),
            patent_bytes = patent_pdf.as_ref().map_or(0, |p| p.len()),
            "source documents ingested"
        );

        Ok(StageDelta::Ingested {
            patent_pdf,
            history_pdf,
            container_url,
            base_name,
        })
    }
}
