// Tests for patentflow_sdk::Client against a scripted local server.
//
// The server answers successive connections with canned responses in order
// and records the request line of each.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use patentflow_sdk::{Client, Error, GenerateRequest};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};

type Seen = Arc<Mutex<Vec<String>>>;

async fn scripted(replies: Vec<(&'static str, String)>) -> (String, Seen) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen: Seen = Arc::default();
    let log = Arc::clone(&seen);
    tokio::spawn(async move {
        for (status, body) in replies {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length").then(|| v.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            let request = String::from_utf8_lossy(&buf).to_string();
            log.lock().unwrap().push(request.lines().next().unwrap_or_default().to_string());
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        }
    });
    (format!("http://{addr}"), seen)
}

fn job(status: &str, progress: u8, extra: &str) -> String {
    format!(
        r#"{{"job_id": "job-1", "status": "{status}", "current_stage": "analyzed", "progress_percent": {progress}, "created_at": "2026-01-01T00:00:00Z", "updated_at": "2026-01-01T00:00:01Z"{extra}}}"#
    )
}

// =============================================================================
// Single requests
// =============================================================================

#[tokio::test]
async fn generate_returns_report_urls() {
    let body = r#"{"run_id": "r-1", "pipeline_status": "completed", "current_stage": "finalized", "qc_score": 9,
        "revision_count": 1, "clarification_count": 0, "report_url": "https://a/c/x_Litigation_Report.md",
        "final_report_url": "https://a/c/x_Final_Report.md", "qc_url": null, "search_intel_url": null, "warnings": []}"#;
    let (url, seen) = scripted(vec![("200 OK", body.to_string())]).await;

    let report = Client::new(url).generate(&GenerateRequest::new("https://a/c/x.pdf")).await.unwrap();

    assert_eq!(report.qc_score, 9);
    assert_eq!(report.revision_count, 1);
    assert_eq!(report.final_report_url.as_deref(), Some("https://a/c/x_Final_Report.md"));
    assert!(seen.lock().unwrap()[0].starts_with("POST /api/patent-reports/generate "));
}

#[tokio::test]
async fn failed_generation_is_an_api_error() {
    let body = r#"{"pipeline_status": "failed", "error": "Stage 1 extraction failed: quota"}"#;
    let (url, _) = scripted(vec![("500 Internal Server Error", body.to_string())]).await;

    let err = Client::new(url).generate(&GenerateRequest::new("h.pdf")).await.unwrap_err();

    match err {
        Error::Api { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "Stage 1 extraction failed: quota");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unknown_job_status_is_404() {
    let (url, seen) = scripted(vec![("404 Not Found", String::new())]).await;

    let err = Client::new(url).status("job 9").await.unwrap_err();

    assert!(matches!(err, Error::Api { status: 404, .. }));
    assert!(seen.lock().unwrap()[0].starts_with("GET /api/patent-reports/status/job%209 "));
}

// =============================================================================
// Polling
// =============================================================================

#[tokio::test]
async fn wait_for_completion_polls_until_done() {
    let result = r#", "result": {"run_id": "job-1", "pipeline_status": "completed", "qc_score": 10, "final_report_url": "https://a/c/x_Final_Report.md"}"#;
    let (url, seen) = scripted(vec![
        ("200 OK", job("processing", 20, "")),
        ("200 OK", job("processing", 50, "")),
        ("200 OK", job("completed", 100, result)),
    ])
    .await;

    let report = Client::new(url)
        .wait_for_completion("job-1", Duration::from_millis(1), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(report.run_id, "job-1");
    assert_eq!(report.qc_score, 10);
    assert_eq!(seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn wait_for_completion_surfaces_job_failure() {
    let (url, _) = scripted(vec![(
        "200 OK",
        job("failed", 20, r#", "error": "Document ingest failed: 403""#),
    )])
    .await;

    let err = Client::new(url)
        .wait_for_completion("job-1", Duration::from_millis(1), Duration::from_secs(5))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::JobFailed { ref message, .. } if message == "Document ingest failed: 403"));
}

#[tokio::test]
async fn wait_for_completion_times_out() {
    let (url, _) = scripted(vec![("200 OK", job("processing", 50, ""))]).await;

    let err = Client::new(url)
        .wait_for_completion("job-1", Duration::from_millis(1), Duration::ZERO)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout { .. }));
}
