use std::fmt;

use serde::{Deserialize, Serialize};

// ── Stage tags ───────────────────────────────────────────────────────────

/// Position of a run in the report state machine.
///
/// Serialized as its snake_case tag. Tags the engine does not know survive a
/// round trip as `Unrecognized` so the supervisor can abort on them instead of
/// failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Stage {
    Start,
    Extracted,
    Analyzed,
    Written,
    QcComplete,
    Revised,
    Clarified,
    Finalized,
    Aborted,
    Unrecognized(String),
}

impl Stage {
    pub fn parse(s: &str) -> Self {
        match s {
            "start" => Self::Start,
            "extracted" => Self::Extracted,
            "analyzed" => Self::Analyzed,
            "written" => Self::Written,
            "qc_complete" => Self::QcComplete,
            "revised" => Self::Revised,
            "clarified" => Self::Clarified,
            "finalized" => Self::Finalized,
            "aborted" => Self::Aborted,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Start => "start",
            Self::Extracted => "extracted",
            Self::Analyzed => "analyzed",
            Self::Written => "written",
            Self::QcComplete => "qc_complete",
            Self::Revised => "revised",
            Self::Clarified => "clarified",
            Self::Finalized => "finalized",
            Self::Aborted => "aborted",
            Self::Unrecognized(s) => s,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Aborted)
    }

    /// Coarse progress figure reported to polling clients.
    pub fn progress_percent(&self) -> u8 {
        match self {
            Self::Start | Self::Unrecognized(_) => 5,
            Self::Extracted => 20,
            Self::Analyzed => 50,
            Self::Written => 65,
            Self::Revised | Self::Clarified => 70,
            Self::QcComplete => 80,
            Self::Finalized | Self::Aborted => 100,
        }
    }
}

impl From<String> for Stage {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Stage> for String {
    fn from(s: Stage) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Run status ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Supervisor output ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Extract,
    Analyze,
    Write,
    Qc,
    Clarify,
    Revise,
    Finalize,
    Abort,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Analyze => "analyze",
            Self::Write => "write",
            Self::Qc => "qc",
            Self::Clarify => "clarify",
            Self::Revise => "revise",
            Self::Finalize => "finalize",
            Self::Abort => "abort",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalize | Self::Abort)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing decision produced by the supervisor for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub reason: String,
    /// Finalize taken because an iteration budget ran out.
    #[serde(default)]
    pub degraded: bool,
}

impl Decision {
    pub fn new(action: Action, reason: impl Into<String>) -> Self {
        Self {
            action,
            reason: reason.into(),
            degraded: false,
        }
    }

    pub fn degraded(mut self) -> Self {
        self.degraded = true;
        self
    }
}

// ── Stage executors ──────────────────────────────────────────────────────

/// Identifies a unit of work inside a run. Used for logging, backend
/// resolution, prompt lookup and failure messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Ingest,
    Extract,
    Route,
    ClaimConstruction,
    SearchTechnical,
    Timeline,
    Merge,
    Write,
    Revise,
    Qc,
    Clarify,
    SearchIntel,
    Persist,
}

impl StageKind {
    pub const ALL: [StageKind; 13] = [
        Self::Ingest,
        Self::Extract,
        Self::Route,
        Self::ClaimConstruction,
        Self::SearchTechnical,
        Self::Timeline,
        Self::Merge,
        Self::Write,
        Self::Revise,
        Self::Qc,
        Self::Clarify,
        Self::SearchIntel,
        Self::Persist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Extract => "extract",
            Self::Route => "route",
            Self::ClaimConstruction => "claim_construction",
            Self::SearchTechnical => "search_technical",
            Self::Timeline => "timeline",
            Self::Merge => "merge",
            Self::Write => "write",
            Self::Revise => "revise",
            Self::Qc => "qc",
            Self::Clarify => "clarify",
            Self::SearchIntel => "search_intel",
            Self::Persist => "persist",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Human-readable label used in terminal error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ingest => "Document ingest",
            Self::Extract => "Stage 1 extraction",
            Self::Route => "Tech pack routing",
            Self::ClaimConstruction => "Stage 2A claim construction",
            Self::SearchTechnical => "Stage 2B search and technical analysis",
            Self::Timeline => "Stage 2C timeline synthesis",
            Self::Merge => "Forensic merge",
            Self::Write => "Stage 3 report generation",
            Self::Revise => "Report revision",
            Self::Qc => "Stage 4 QC",
            Self::Clarify => "Clarification",
            Self::SearchIntel => "Search intelligence",
            Self::Persist => "Report persistence",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Run inputs / outputs ─────────────────────────────────────────────────

/// Source documents for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Issued patent PDF. Empty when only the file history is available.
    #[serde(default)]
    pub patent_ref: String,
    /// Prosecution history (file wrapper) PDF.
    pub history_ref: String,
    /// Forces a technology-center pack instead of deriving it from extraction.
    #[serde(default)]
    pub tech_center_override: Option<String>,
}

impl RunRequest {
    pub fn new(patent_ref: impl Into<String>, history_ref: impl Into<String>) -> Self {
        Self {
            patent_ref: patent_ref.into(),
            history_ref: history_ref.into(),
            tech_center_override: None,
        }
    }

    pub fn with_tech_center(mut self, code: impl Into<String>) -> Self {
        self.tech_center_override = Some(code.into());
        self
    }
}

/// Locations of everything written at finalize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputArtifacts {
    pub report_url: Option<String>,
    pub final_report_url: Option<String>,
    pub qc_url: Option<String>,
    pub search_intel_url: Option<String>,
}

/// Caller-facing result of a terminal run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub pipeline_status: RunStatus,
    pub current_stage: Stage,
    pub qc_score: u8,
    pub revision_count: u32,
    pub clarification_count: u32,
    #[serde(flatten)]
    pub artifacts: OutputArtifacts,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

// ── Pipeline Events ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Decision {
        run_id: String,
        stage: Stage,
        action: Action,
        reason: String,
    },
    Warning {
        run_id: String,
        message: String,
    },
    Finished {
        run_id: String,
        status: RunStatus,
        message: String,
    },
}

impl PipelineEvent {
    pub fn kind(&self) -> &str {
        match self {
            Self::Decision { .. } => "decision",
            Self::Warning { .. } => "warning",
            Self::Finished { .. } => "finished",
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            Self::Decision { run_id, .. }
            | Self::Warning { run_id, .. }
            | Self::Finished { run_id, .. } => run_id,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Decision { reason, .. } => reason,
            Self::Warning { message, .. } | Self::Finished { message, .. } => message,
        }
    }
}
