use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{info, warn};

use super::{ensure_live, StageExecutor, StageOutcome};
use crate::{
    error::StageFailure,
    qc::findings_document,
    state::{PipelineState, StageDelta},
    storage::DocumentStore,
    types::{OutputArtifacts, StageKind},
};

const MARKDOWN: &str = "text/markdown";
const JSON: &str = "application/json";

pub fn report_name(base: &str) -> String {
    format!("{base}_Litigation_Report.md")
}

pub fn final_report_name(base: &str) -> String {
    format!("{base}_Final_Report.md")
}

pub fn qc_findings_name(base: &str) -> String {
    format!("{base}_QC_Findings.json")
}

pub fn search_intel_name(base: &str) -> String {
    format!("{base}_Search_Intelligence_Report.md")
}

/// Writes the finished artifacts next to the source history.
pub struct PersistStage {
    store: Arc<dyn DocumentStore>,
}

impl PersistStage {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn put(&self, container: &str, name: &str, body: Vec<u8>, content_type: &str) -> Result<String, StageFailure> {
        self.store
            .store(container, name, Bytes::from(body), content_type)
            .await
            .map_err(|e| StageFailure::new(StageKind::Persist, e.to_string()))
    }
}

#[async_trait]
impl StageExecutor for PersistStage {
    fn kind(&self) -> StageKind {
        StageKind::Persist
    }

    async fn execute(&self, state: &PipelineState) -> StageOutcome {
        const KIND: StageKind = StageKind::Persist;
        ensure_live(state, KIND)?;

        let container = state
            .container_url
            .as_deref()
            .ok_or_else(|| StageFailure::missing(KIND, "output container"))?;
        let base = state
            .base_name
            .as_deref()
            .ok_or_else(|| StageFailure::missing(KIND, "document base name"))?;
        let draft = state
            .report
            .as_deref()
            .ok_or_else(|| StageFailure::missing(KIND, "report draft"))?;
        let findings = state
            .qc_result
            .as_ref()
            .ok_or_else(|| StageFailure::missing(KIND, "QC findings"))?;
        let final_report = state.corrected_report.as_deref().unwrap_or(draft);

        let qc_json = serde_json::to_vec_pretty(&findings_document(findings, state.qc_score))
            .map_err(|e| StageFailure::new(KIND, format!("encode QC findings: {e}")))?;

        let mut artifacts = OutputArtifacts {
            report_url: Some(self.put(container, &report_name(base), draft.as_bytes().to_vec(), MARKDOWN).await?),
            final_report_url: Some(
                self.put(container, &final_report_name(base), final_report.as_bytes().to_vec(), MARKDOWN)
                    .await?,
            ),
            qc_url: Some(self.put(container, &qc_findings_name(base), qc_json, JSON).await?),
            search_intel_url: None,
        };

        if let Some(intel) = &state.search_intel_report {
            match self
                .put(container, &search_intel_name(base), intel.as_bytes().to_vec(), MARKDOWN)
                .await
            {
                Ok(url) => artifacts.search_intel_url = Some(url),
                Err(e) => warn!(run_id = %state.run_id, "{e}, continuing without it"),
            }
        }

        info!(
            run_id = %state.run_id,
            final_report = artifacts.final_report_url.as_deref().unwrap_or_default(),
            search_intel = artifacts.search_intel_url.is_some(),
            "artifacts persisted"
        );
        Ok(StageDelta::Persisted(artifacts))
    }
}
