use serde::de::DeserializeOwned;

use crate::{error::InferenceError, qc::QcFindings};

const QC_JSON_MARKER: &str = "QC_JSON_OUTPUT";
const FINAL_REPORT_MARKER: &str = "FINAL_REPORT_OUTPUT";

/// Strips one surrounding code fence (with optional language tag).
pub fn strip_fences(text: &str) -> &str {
    let t = text.trim();
    if !t.starts_with("```") {
        return t;
    }
    let nl = match t.find('\n') {
        Some(i) => i,
        None => return t,
    };
    let inner = &t[nl + 1..];
    if inner.ends_with("```") {
        inner[..inner.len() - 3].trim_end()
    } else {
        inner
    }
}

/// Body of the first ```json block if there is one, else the fence-stripped text.
pub fn json_block(text: &str) -> &str {
    if let Some(start) = text.find("```json") {
        let body = &text[start + 7..];
        return match body.find("```") {
            Some(end) => body[..end].trim(),
            None => body.trim(),
        };
    }
    strip_fences(text)
}

pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, InferenceError> {
    serde_json::from_str(json_block(text))
        .map_err(|e| InferenceError::InvalidResponseShape(format!("expected JSON: {e}")))
}

/// Markdown report body with any wrapping fence removed. Empty output is a
/// shape error so it gets retried.
pub fn markdown_body(text: &str) -> Result<String, InferenceError> {
    let body = strip_fences(text);
    if body.is_empty() {
        return Err(InferenceError::InvalidResponseShape("empty report".into()));
    }
    Ok(body.to_string())
}

/// Splits a QC response into its findings JSON and, when present, the
/// corrected report.
pub fn split_qc_response(text: &str) -> Result<(QcFindings, Option<String>), InferenceError> {
    let search_from = text.find(QC_JSON_MARKER).unwrap_or(0);
    let json_start = text[search_from..]
        .find("```json")
        .map(|i| search_from + i + 7)
        .ok_or_else(|| InferenceError::InvalidResponseShape("QC response has no JSON block".into()))?;
    let json_end = text[json_start..]
        .find("```")
        .map_or(text.len(), |i| json_start + i);
    let findings: QcFindings = serde_json::from_str(text[json_start..json_end].trim())
        .map_err(|e| InferenceError::InvalidResponseShape(format!("QC JSON: {e}")))?;

    Ok((findings, corrected_report(text, json_end)))
}

fn corrected_report(text: &str, after: usize) -> Option<String> {
    let last_fence = text.rfind("```")?;
    let body_start = if let Some(marker) = text.find(FINAL_REPORT_MARKER) {
        let fence = marker + text[marker..].find("```")?;
        fence + text[fence..].find('\n')? + 1
    } else {
        let fence = text.rfind("```markdown")?;
        if fence < after {
            return None;
        }
        fence + "```markdown".len()
    };
    if last_fence <= body_start {
        return None;
    }
    let body = text[body_start..last_fence].trim();
    (!body.is_empty()).then(|| body.to_string())
}
