use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::DomainPack,
    error::StateError,
    qc::{QcFindings, QcVerdict},
    records::{ClaimConstruction, Extraction, ForensicRecord, SearchTechnical, TimelineSynthesis},
    types::{OutputArtifacts, RunRequest, RunStatus, RunSummary, Stage, StageKind},
};

/// Everything one run accumulates. Owned by the engine; stages read it and
/// hand back a [`StageDelta`], they never write it directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub run_id: String,
    pub patent_ref: String,
    pub history_ref: String,
    pub tech_center_override: Option<String>,

    // Ingest
    #[serde(skip)]
    pub patent_pdf: Option<Bytes>,
    #[serde(skip)]
    pub history_pdf: Option<Bytes>,
    pub container_url: Option<String>,
    pub base_name: Option<String>,

    // Routing
    pub tech_center: Option<String>,
    pub domain_pack: Option<DomainPack>,

    // Stage outputs
    pub extraction: Option<Extraction>,
    pub claim_construction: Option<ClaimConstruction>,
    pub search_technical: Option<SearchTechnical>,
    pub timeline: Option<TimelineSynthesis>,
    pub forensic: Option<ForensicRecord>,
    pub report: Option<String>,
    pub report_history: Vec<String>,
    pub clarification_answers: BTreeMap<String, Value>,
    pub qc_result: Option<QcFindings>,
    pub corrected_report: Option<String>,
    pub search_intel_report: Option<String>,
    pub artifacts: OutputArtifacts,

    // Control
    pub current_stage: Stage,
    pub status: RunStatus,
    pub error: Option<String>,
    pub revision_count: u32,
    pub clarification_count: u32,
    pub qc_score: u8,
    pub qc_passed: bool,
    pub needs_revision: bool,
    pub needs_clarification: bool,
    pub clarification_questions: Vec<String>,
    pub warnings: Vec<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Partial update produced by one stage. Each variant touches only the fields
/// its stage owns.
#[derive(Debug, Clone)]
pub enum StageDelta {
    Ingested {
        patent_pdf: Option<Bytes>,
        history_pdf: Bytes,
        container_url: String,
        base_name: String,
    },
    Extracted(Extraction),
    Routed {
        tech_center: String,
        pack: DomainPack,
    },
    ClaimConstruction(ClaimConstruction),
    SearchTechnical(SearchTechnical),
    Timeline(TimelineSynthesis),
    Merged(ForensicRecord),
    Written(String),
    QcComplete(QcVerdict),
    Clarified(BTreeMap<String, Value>),
    Revised(String),
    SearchIntel(Option<String>),
    Persisted(OutputArtifacts),
}

impl StageDelta {
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Ingested { .. } => StageKind::Ingest,
            Self::Extracted(_) => StageKind::Extract,
            Self::Routed { .. } => StageKind::Route,
            Self::ClaimConstruction(_) => StageKind::ClaimConstruction,
            Self::SearchTechnical(_) => StageKind::SearchTechnical,
            Self::Timeline(_) => StageKind::Timeline,
            Self::Merged(_) => StageKind::Merge,
            Self::Written(_) => StageKind::Write,
            Self::QcComplete(_) => StageKind::Qc,
            Self::Clarified(_) => StageKind::Clarify,
            Self::Revised(_) => StageKind::Revise,
            Self::SearchIntel(_) => StageKind::SearchIntel,
            Self::Persisted(_) => StageKind::Persist,
        }
    }
}

impl PipelineState {
    pub fn new(run_id: impl Into<String>, request: RunRequest) -> Self {
        Self {
            run_id: run_id.into(),
            patent_ref: request.patent_ref,
            history_ref: request.history_ref,
            tech_center_override: request.tech_center_override,
            patent_pdf: None,
            history_pdf: None,
            container_url: None,
            base_name: None,
            tech_center: None,
            domain_pack: None,
            extraction: None,
            claim_construction: None,
            search_technical: None,
            timeline: None,
            forensic: None,
            report: None,
            report_history: Vec::new(),
            clarification_answers: BTreeMap::new(),
            qc_result: None,
            corrected_report: None,
            search_intel_report: None,
            artifacts: OutputArtifacts::default(),
            current_stage: Stage::Start,
            status: RunStatus::Pending,
            error: None,
            revision_count: 0,
            clarification_count: 0,
            qc_score: 0,
            qc_passed: false,
            needs_revision: false,
            needs_clarification: false,
            clarification_questions: Vec::new(),
            warnings: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == RunStatus::Failed
    }

    pub fn begin(&mut self) {
        if self.status == RunStatus::Pending {
            self.status = RunStatus::Processing;
        }
    }

    /// Folds a stage's output into the state. Refused once the run failed.
    pub fn apply(&mut self, delta: StageDelta) -> Result<(), StateError> {
        if self.is_failed() {
            return Err(StateError::Sealed(delta.kind()));
        }
        match delta {
            StageDelta::Ingested {
                patent_pdf,
                history_pdf,
                container_url,
                base_name,
            } => {
                self.patent_pdf = patent_pdf;
                self.history_pdf = Some(history_pdf);
                self.container_url = Some(container_url);
                self.base_name = Some(base_name);
            }
            StageDelta::Extracted(extraction) => {
                self.extraction = Some(extraction);
                self.current_stage = Stage::Extracted;
            }
            StageDelta::Routed { tech_center, pack } => {
                self.tech_center = Some(tech_center);
                self.domain_pack = Some(pack);
            }
            StageDelta::ClaimConstruction(a) => self.claim_construction = Some(a),
            StageDelta::SearchTechnical(b) => self.search_technical = Some(b),
            StageDelta::Timeline(c) => self.timeline = Some(c),
            StageDelta::Merged(record) => {
                self.forensic = Some(record);
                self.current_stage = Stage::Analyzed;
            }
            StageDelta::Written(report) => {
                self.replace_report(report);
                self.current_stage = Stage::Written;
            }
            StageDelta::QcComplete(verdict) => {
                self.qc_score = verdict.score;
                self.qc_passed = verdict.passed;
                self.needs_revision = verdict.needs_revision;
                self.needs_clarification = verdict.needs_clarification;
                self.clarification_questions = verdict.clarification_questions;
                self.corrected_report = Some(verdict.corrected_report);
                self.qc_result = Some(verdict.findings);
                self.current_stage = Stage::QcComplete;
            }
            StageDelta::Clarified(answers) => {
                self.clarification_answers = answers;
                self.clarification_count += 1;
                self.current_stage = Stage::Clarified;
            }
            StageDelta::Revised(report) => {
                self.replace_report(report);
                self.revision_count += 1;
                self.current_stage = Stage::Revised;
            }
            StageDelta::SearchIntel(report) => self.search_intel_report = report,
            StageDelta::Persisted(artifacts) => self.artifacts = artifacts,
        }
        Ok(())
    }

    fn replace_report(&mut self, report: String) {
        if let Some(previous) = self.report.replace(report) {
            self.report_history.push(previous);
        }
    }

    /// Marks the run failed. The first message wins.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(message.into());
        }
        self.status = RunStatus::Failed;
    }

    pub fn abort(&mut self, reason: impl Into<String>) {
        self.fail(reason);
        self.current_stage = Stage::Aborted;
        self.finished_at = Some(Utc::now());
    }

    pub fn finalize(&mut self) {
        self.current_stage = Stage::Finalized;
        self.status = RunStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id.clone(),
            pipeline_status: self.status,
            current_stage: self.current_stage.clone(),
            qc_score: self.qc_score,
            revision_count: self.revision_count,
            clarification_count: self.clarification_count,
            artifacts: self.artifacts.clone(),
            warnings: self.warnings.clone(),
            error: self.error.clone(),
        }
    }
}
