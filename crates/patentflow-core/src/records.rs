//! Structured outputs of the extraction and analysis stages.
//!
//! Models answer with loosely shaped JSON, so every field defaults when
//! missing or null and row lists are kept as raw JSON values. Strict row
//! shapes are checked separately by [`crate::validate`] and only warned on.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub(crate) mod de {
    use super::*;

    /// Treats `null` like a missing field.
    pub fn nullable<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Default + Deserialize<'de>,
    {
        Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
    }

    /// Accepts a string or a bare number (art units often come back numeric).
    pub fn opt_string<'de, D>(d: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(d)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(serde::de::Error::custom(format!(
                "expected string or number, found {other}"
            ))),
        }
    }
}

// ── Stage 1 ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatentMetadata {
    #[serde(deserialize_with = "de::opt_string")]
    pub application_number: Option<String>,
    #[serde(deserialize_with = "de::opt_string")]
    pub patent_number: Option<String>,
    #[serde(deserialize_with = "de::opt_string")]
    pub title: Option<String>,
    #[serde(deserialize_with = "de::opt_string")]
    pub filing_date: Option<String>,
    #[serde(deserialize_with = "de::opt_string")]
    pub issue_date: Option<String>,
    #[serde(deserialize_with = "de::nullable")]
    pub inventors: Vec<Value>,
    #[serde(deserialize_with = "de::opt_string")]
    pub assignee: Option<String>,
    #[serde(deserialize_with = "de::opt_string")]
    pub art_unit: Option<String>,
    #[serde(deserialize_with = "de::opt_string")]
    pub tech_center: Option<String>,
    #[serde(deserialize_with = "de::opt_string")]
    pub examiner: Option<String>,
    /// Classifications, priority claims and anything else the model returns.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Stage 1 output: facts pulled from the file wrapper and patent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Extraction {
    #[serde(deserialize_with = "de::nullable")]
    pub metadata: PatentMetadata,
    #[serde(deserialize_with = "de::nullable")]
    pub events: Vec<Value>,
    #[serde(deserialize_with = "de::nullable")]
    pub claims_diff: Vec<Value>,
    pub key_quotes: Value,
    pub search_records: Value,
    #[serde(deserialize_with = "de::nullable")]
    pub record_discrepancies: Vec<Value>,
}

impl Extraction {
    pub fn has_search_records(&self) -> bool {
        match &self.search_records {
            Value::Null => false,
            Value::Object(m) => !m.is_empty(),
            Value::Array(a) => !a.is_empty(),
            _ => true,
        }
    }
}

// ── Stage 2 ──────────────────────────────────────────────────────────────

/// Stage 2A: claim construction and prosecution history estoppel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimConstruction {
    #[serde(deserialize_with = "de::nullable")]
    pub claim_construction_rows: Vec<Value>,
    #[serde(deserialize_with = "de::nullable")]
    pub estoppel_matrix_rows: Vec<Value>,
    #[serde(deserialize_with = "de::nullable")]
    pub construction_summary: String,
    #[serde(deserialize_with = "de::nullable")]
    pub estoppel_summary: String,
}

/// Stage 2B: technical representations, search gaps and prior-art convergence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchTechnical {
    #[serde(deserialize_with = "de::nullable")]
    pub technical_reps: Vec<Value>,
    #[serde(deserialize_with = "de::nullable")]
    pub search_gap_analysis: Vec<Value>,
    #[serde(deserialize_with = "de::nullable")]
    pub convergence_rows: Vec<Value>,
    #[serde(deserialize_with = "de::nullable")]
    pub technical_summary: String,
    #[serde(deserialize_with = "de::nullable")]
    pub search_summary: String,
}

/// Stage 2C: event forensics and global findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineSynthesis {
    #[serde(deserialize_with = "de::nullable")]
    pub event_forensics: Vec<Value>,
    pub global_findings: Option<Value>,
    #[serde(deserialize_with = "de::nullable")]
    pub timeline_summary: String,
}

/// Union of the three analysis sub-records. Each section keeps the keys of the
/// stage that produced it, so the record is flat and collision free.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForensicRecord {
    // 2A
    pub claim_construction_rows: Vec<Value>,
    pub estoppel_matrix_rows: Vec<Value>,
    pub construction_summary: String,
    pub estoppel_summary: String,
    // 2B
    pub technical_reps: Vec<Value>,
    pub search_gap_analysis: Vec<Value>,
    pub convergence_rows: Vec<Value>,
    pub technical_summary: String,
    pub search_summary: String,
    // 2C
    pub event_forensics: Vec<Value>,
    pub global_findings: Option<Value>,
    pub timeline_summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_tolerates_nulls_and_numeric_art_unit() {
        let raw = r#"{
            "metadata": {"application_number": "16/123,456", "art_unit": 2145, "cpc_classifications": ["G06F"]},
            "events": null,
            "claims_diff": [{"claim_number": 1}]
        }"#;
        let ex: Extraction = serde_json::from_str(raw).unwrap();
        assert_eq!(ex.metadata.art_unit.as_deref(), Some("2145"));
        assert!(ex.events.is_empty());
        assert_eq!(ex.claims_diff.len(), 1);
        assert!(ex.metadata.extra.contains_key("cpc_classifications"));
        assert!(!ex.has_search_records());
    }

    #[test]
    fn analysis_record_rejects_wrong_container_type() {
        let raw = r#"{"claim_construction_rows": "not a list"}"#;
        assert!(serde_json::from_str::<ClaimConstruction>(raw).is_err());
    }

    #[test]
    fn null_summary_becomes_empty() {
        let raw = r#"{"event_forensics": [], "global_findings": null, "timeline_summary": null}"#;
        let c: TimelineSynthesis = serde_json::from_str(raw).unwrap();
        assert_eq!(c.timeline_summary, "");
        assert!(c.global_findings.is_none());
    }
}
