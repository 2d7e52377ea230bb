//! Typed client for the patentflow report API.
//!
//! ```no_run
//! # async fn demo() -> Result<(), patentflow_sdk::Error> {
//! use std::time::Duration;
//! use patentflow_sdk::{Client, GenerateRequest};
//!
//! let client = Client::new("http://localhost:8000");
//! let job = client
//!     .start(&GenerateRequest::new("https://acct.blob.core.windows.net/cases/case42.pdf?sv=..."))
//!     .await?;
//! let report = client
//!     .wait_for_completion(&job.job_id, Duration::from_secs(5), Duration::from_secs(1800))
//!     .await?;
//! println!("{:?}", report.final_report_url);
//! # Ok(())
//! # }
//! ```

use std::time::{Duration, Instant};

use reqwest::{Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

// ── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },
    #[error("job {job_id} still running after {waited:?}")]
    Timeout { job_id: String, waited: Duration },
}

pub type Result<T> = std::result::Result<T, Error>;

// ── Wire types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Issued patent PDF; empty when only the file history is available.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub patent_pdf_url: String,
    pub history_pdf_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tech_center_override: Option<String>,
}

impl GenerateRequest {
    pub fn new(history_pdf_url: impl Into<String>) -> Self {
        Self {
            history_pdf_url: history_pdf_url.into(),
            ..Self::default()
        }
    }

    pub fn with_patent(mut self, patent_pdf_url: impl Into<String>) -> Self {
        self.patent_pdf_url = patent_pdf_url.into();
        self
    }

    pub fn with_tech_center(mut self, code: impl Into<String>) -> Self {
        self.tech_center_override = Some(code.into());
        self
    }
}

/// Outcome of one finished run.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReportResult {
    pub run_id: String,
    pub pipeline_status: String,
    pub current_stage: String,
    pub qc_score: u8,
    pub revision_count: u32,
    pub clarification_count: u32,
    pub report_url: Option<String>,
    pub final_report_url: Option<String>,
    pub qc_url: Option<String>,
    pub search_intel_url: Option<String>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct JobStatus {
    pub job_id: String,
    pub status: String,
    pub current_stage: String,
    pub progress_percent: u8,
    pub result: Option<ReportResult>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "completed" | "failed")
    }
}

// ── Client ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Client {
    base_url: String,
    http: reqwest::Client,
}

impl Client {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http_client(base_url, reqwest::Client::new())
    }

    pub fn with_http_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn health(&self) -> Result<()> {
        let resp = self.http.get(self.url("/api/health")).send().await?;
        decode::<Value>(resp).await.map(|_| ())
    }

    /// Runs a report to completion in one request.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<ReportResult> {
        let resp = self
            .http
            .post(self.url("/api/patent-reports/generate"))
            .json(request)
            .send()
            .await?;
        decode(resp).await
    }

    /// Queues a report and returns the pending job.
    pub async fn start(&self, request: &GenerateRequest) -> Result<JobStatus> {
        let resp = self
            .http
            .post(self.url("/api/patent-reports/generate/async"))
            .json(request)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn status(&self, job_id: &str) -> Result<JobStatus> {
        let path = format!("/api/patent-reports/status/{}", urlencoding::encode(job_id));
        let resp = self.http.get(self.url(&path)).send().await?;
        decode(resp).await
    }

    pub async fn jobs(&self) -> Result<Vec<JobStatus>> {
        let resp = self.http.get(self.url("/api/patent-reports/jobs")).send().await?;
        decode(resp).await
    }

    /// Polls until the job is terminal. A failed job surfaces as
    /// [`Error::JobFailed`] carrying the server's error message.
    pub async fn wait_for_completion(
        &self,
        job_id: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<ReportResult> {
        let started = Instant::now();
        loop {
            let job = self.status(job_id).await?;
            match job.status.as_str() {
                "completed" => {
                    return job.result.ok_or_else(|| Error::Api {
                        status: 200,
                        message: format!("job {job_id} completed without a result"),
                    })
                }
                "failed" => {
                    return Err(Error::JobFailed {
                        job_id: job_id.to_string(),
                        message: job.error.unwrap_or_else(|| "unknown error".into()),
                    })
                }
                _ => {}
            }
            if started.elapsed() >= timeout {
                return Err(Error::Timeout {
                    job_id: job_id.to_string(),
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }
    let text = resp.text().await.unwrap_or_default();
    Err(Error::Api {
        status: status.as_u16(),
        message: error_message(status, &text),
    })
}

/// The `error` field of a JSON error body, else the raw body, else the
/// status reason.
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        if let Some(msg) = map.get("error").and_then(Value::as_str) {
            return msg.to_string();
        }
    }
    if !body.trim().is_empty() {
        return body.trim().to_string();
    }
    status.canonical_reason().unwrap_or("request failed").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_json_error_field() {
        let body = r#"{"pipeline_status": "failed", "error": "Document ingest failed: 404"}"#;
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, body),
            "Document ingest failed: 404"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, "upstream down"), "upstream down");
        assert_eq!(error_message(StatusCode::NOT_FOUND, ""), "Not Found");
    }

    #[test]
    fn request_omits_empty_optionals() {
        let body = serde_json::to_value(GenerateRequest::new("https://a/c/h.pdf")).unwrap();
        assert_eq!(body, serde_json::json!({ "history_pdf_url": "https://a/c/h.pdf" }));

        let body = serde_json::to_value(
            GenerateRequest::new("h").with_patent("p").with_tech_center("3700"),
        )
        .unwrap();
        assert_eq!(body["patent_pdf_url"], "p");
        assert_eq!(body["tech_center_override"], "3700");
    }
}
