use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::records::de;

/// Score at or above which a report passes QC.
pub const PASS_THRESHOLD: u8 = 8;
/// Score below which a report needs revision.
pub const REVISION_THRESHOLD: u8 = 5;

const CLARIFICATION_ISSUE_TYPES: [&str; 3] = ["missing_analysis", "unclear_reasoning", "data_mismatch"];

// ── Grade / severity ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// Parses a letter grade. Anything outside A-F is unknown.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            "F" => Some(Self::F),
            _ => None,
        }
    }

    pub fn base_score(self) -> i32 {
        match self {
            Self::A => 10,
            Self::B => 8,
            Self::C => 6,
            Self::D => 4,
            Self::F => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    Major,
    Minor,
    Other,
}

impl Severity {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Self::Critical,
            "major" => Self::Major,
            "minor" => Self::Minor,
            _ => Self::Other,
        }
    }
}

// ── Findings as returned by the QC model ─────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QcIssue {
    #[serde(rename = "type", deserialize_with = "de::nullable")]
    pub issue_type: String,
    #[serde(deserialize_with = "de::nullable")]
    pub severity: String,
    #[serde(deserialize_with = "de::nullable")]
    pub location: String,
    #[serde(alias = "issue", deserialize_with = "de::nullable")]
    pub description: String,
    #[serde(alias = "suggested_correction", deserialize_with = "de::nullable")]
    pub correction: String,
}

impl QcIssue {
    pub fn severity(&self) -> Severity {
        Severity::from_str(&self.severity)
    }

    pub fn needs_clarification(&self) -> bool {
        CLARIFICATION_ISSUE_TYPES.contains(&self.issue_type.trim())
    }

    fn clarification_question(&self) -> String {
        let subject = if self.description.trim().is_empty() {
            self.location.trim()
        } else {
            self.description.trim()
        };
        format!("Please clarify: {subject}")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QcFindings {
    #[serde(deserialize_with = "de::opt_string")]
    pub quality_grade: Option<String>,
    #[serde(deserialize_with = "de::nullable")]
    pub qc_issues: Vec<QcIssue>,
    #[serde(deserialize_with = "de::nullable")]
    pub auto_fixes_applied: Vec<Value>,
    #[serde(deserialize_with = "de::nullable")]
    pub summary: String,
    /// Metrics and sections beyond the scored core.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QcFindings {
    pub fn grade(&self) -> Option<Grade> {
        self.quality_grade.as_deref().and_then(Grade::parse)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.qc_issues.iter().filter(|i| i.severity() == severity).count()
    }
}

/// Base score for the grade (unknown grades count as C), minus two per
/// critical and one per major issue, clamped to 0..=10.
pub fn compute_score(grade: Option<Grade>, issues: &[QcIssue]) -> u8 {
    let base = grade.unwrap_or(Grade::C).base_score();
    let mut critical = 0i32;
    let mut major = 0i32;
    for issue in issues {
        match issue.severity() {
            Severity::Critical => critical += 1,
            Severity::Major => major += 1,
            Severity::Minor | Severity::Other => {}
        }
    }
    let score = (base - 2 * critical - major).clamp(0, 10);
    u8::try_from(score).unwrap_or(0)
}

// ── Verdict ──────────────────────────────────────────────────────────────

/// Scored judgment of one draft. Built once per QC pass and folded into the
/// run state; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QcVerdict {
    pub score: u8,
    pub grade: Option<Grade>,
    pub passed: bool,
    pub needs_revision: bool,
    pub needs_clarification: bool,
    pub clarification_questions: Vec<String>,
    pub findings: QcFindings,
    pub corrected_report: String,
}

impl QcVerdict {
    /// Falls back to `draft` when the model returned no corrected report.
    pub fn evaluate(findings: QcFindings, corrected_report: Option<String>, draft: &str) -> Self {
        let grade = findings.grade();
        let score = compute_score(grade, &findings.qc_issues);
        let clarification_questions: Vec<String> = findings
            .qc_issues
            .iter()
            .filter(|i| i.needs_clarification())
            .map(QcIssue::clarification_question)
            .collect();
        let corrected_report = corrected_report
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| draft.to_string());

        Self {
            score,
            grade,
            passed: score >= PASS_THRESHOLD,
            needs_revision: score < REVISION_THRESHOLD,
            needs_clarification: !clarification_questions.is_empty(),
            clarification_questions,
            findings,
            corrected_report,
        }
    }
}

/// QC findings document persisted next to the final report.
pub fn findings_document(findings: &QcFindings, score: u8) -> Value {
    let mut doc = serde_json::to_value(findings).unwrap_or_else(|_| json!({}));
    if let Value::Object(map) = &mut doc {
        map.insert("qc_score".into(), json!(score));
        map.insert("critical_issues".into(), json!(findings.count(Severity::Critical)));
        map.insert("major_issues".into(), json!(findings.count(Severity::Major)));
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(kind: &str, severity: &str) -> QcIssue {
        QcIssue {
            issue_type: kind.into(),
            severity: severity.into(),
            location: "Section 2".into(),
            description: format!("{kind} problem"),
            correction: String::new(),
        }
    }

    #[test]
    fn grade_b_with_one_critical_and_one_major_scores_five() {
        let issues = vec![issue("citation_error", "critical"), issue("formatting", "major")];
        assert_eq!(compute_score(Some(Grade::B), &issues), 5);
    }

    #[test]
    fn score_clamps_at_zero() {
        let issues = vec![issue("x", "critical"); 6];
        assert_eq!(compute_score(Some(Grade::D), &issues), 0);
    }

    #[test]
    fn unknown_grade_counts_as_c() {
        assert_eq!(Grade::parse("b"), Some(Grade::B));
        assert_eq!(Grade::parse("B+"), None);
        assert_eq!(compute_score(None, &[]), 6);
    }

    #[test]
    fn severity_from_str() {
        assert_eq!(Severity::from_str("Critical"), Severity::Critical);
        assert_eq!(Severity::from_str(" major "), Severity::Major);
        assert_eq!(Severity::from_str("minor"), Severity::Minor);
        assert_eq!(Severity::from_str("blocker"), Severity::Other);
    }

    #[test]
    fn thresholds_follow_score() {
        for (grade, expect_pass, expect_revise) in [
            ("A", true, false),
            ("B", true, false),
            ("C", false, false),
            ("D", false, true),
            ("F", false, true),
        ] {
            let findings = QcFindings {
                quality_grade: Some(grade.into()),
                ..Default::default()
            };
            let v = QcVerdict::evaluate(findings, None, "draft");
            assert_eq!(v.passed, expect_pass, "grade {grade}");
            assert_eq!(v.needs_revision, expect_revise, "grade {grade}");
        }
    }

    #[test]
    fn clarification_questions_come_from_issue_types() {
        let findings = QcFindings {
            quality_grade: Some("A".into()),
            qc_issues: vec![
                issue("missing_analysis", "minor"),
                issue("formatting", "minor"),
                issue("data_mismatch", "minor"),
            ],
            ..Default::default()
        };
        let v = QcVerdict::evaluate(findings, Some("fixed".into()), "draft");
        assert!(v.passed);
        assert!(v.needs_clarification);
        assert_eq!(
            v.clarification_questions,
            vec![
                "Please clarify: missing_analysis problem".to_string(),
                "Please clarify: data_mismatch problem".to_string(),
            ]
        );
        assert_eq!(v.corrected_report, "fixed");
    }

    #[test]
    fn empty_corrected_report_falls_back_to_draft() {
        let v = QcVerdict::evaluate(QcFindings::default(), Some("  ".into()), "draft");
        assert_eq!(v.corrected_report, "draft");
    }

    #[test]
    fn issue_aliases_are_accepted() {
        let raw = r#"{"type": "unclear_reasoning", "severity": "major", "issue": "why?", "correction": "because"}"#;
        let i: QcIssue = serde_json::from_str(raw).unwrap();
        assert_eq!(i.description, "why?");
        assert_eq!(i.correction, "because");
        assert!(i.needs_clarification());
    }

    #[test]
    fn findings_document_carries_score() {
        let findings = QcFindings {
            quality_grade: Some("C".into()),
            qc_issues: vec![issue("x", "major")],
            ..Default::default()
        };
        let doc = findings_document(&findings, 5);
        assert_eq!(doc["qc_score"], 5);
        assert_eq!(doc["major_issues"], 1);
        assert_eq!(doc["quality_grade"], "C");
    }
}
