// Tests for the Gemini and Ollama inference backends.
//
// Request shaping and response parsing are checked directly; the HTTP paths
// run against a one-shot local server that replies with a canned response.

use std::time::Duration;

use bytes::Bytes;
use serde_json::{json, Value};
use tracing_test::traced_test;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};

use patentflow_agent::{backends_from_config, gemini::response_text, GeminiBackend, OllamaBackend};
use patentflow_core::{
    agent::{Attachment, InferenceBackend, InferenceRequest, ResponseShape},
    config::Config,
    types::StageKind,
};

fn request(stage: StageKind, shape: ResponseShape) -> InferenceRequest {
    InferenceRequest {
        run_id: "run-1".into(),
        stage,
        system_prompt: "You are a patent litigation analyst.".into(),
        prompt: "Extract the record.".into(),
        attachments: Vec::new(),
        shape,
    }
}

/// Serves exactly one request with `status_line`, `headers` and `body`, and
/// hands back the raw request it received.
async fn one_shot(status_line: &str, headers: &str, body: &str) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let response = format!(
        "HTTP/1.1 {status_line}\r\n{headers}Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let handle = tokio::spawn(async move {
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
            if let Some(header_end) = text.find("\r\n\r\n") {
                let length = text[..header_end]
                    .lines()
                    .find_map(|l| {
                        let (k, v) = l.split_once(':')?;
                        k.eq_ignore_ascii_case("content-length").then(|| v.trim().parse::<usize>().ok())?
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + length {
                    break;
                }
            }
        }
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&buf).to_string()
    });
    (format!("http://{addr}"), handle)
}

// =============================================================================
// Gemini request / response shape
// =============================================================================

#[test]
fn gemini_body_inlines_pdfs_and_requests_json() {
    let backend = GeminiBackend::new("key", "gemini-1.5-pro").with_generation(0.2, 4096);
    let mut req = request(StageKind::Extract, ResponseShape::Json);
    req.attachments.push(Attachment::pdf("case.pdf", Bytes::from_static(b"%PDF")));

    let body = backend.request_body(&req);

    let parts = body["contents"][0]["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0]["inline_data"]["mime_type"], "application/pdf");
    assert_eq!(parts[0]["inline_data"]["data"], "JVBERg==");
    assert_eq!(parts[1]["text"], "Extract the record.");
    assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);
    assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You are a patent litigation analyst.");
    assert_eq!(body["safetySettings"].as_array().unwrap().len(), 4);
}

#[test]
fn gemini_markdown_stage_has_no_mime_constraint() {
    let backend = GeminiBackend::new("key", "gemini-1.5-pro");
    let body = backend.request_body(&request(StageKind::Write, ResponseShape::Markdown));
    assert!(body["generationConfig"].get("responseMimeType").is_none());
}

#[test]
fn gemini_text_is_joined_across_parts() {
    let body = json!({
        "candidates": [{
            "content": {"parts": [{"text": "# Report\n"}, {"text": "Body"}]},
            "finishReason": "STOP"
        }]
    });
    assert_eq!(response_text(&body).unwrap(), "# Report\nBody");
}

#[test]
fn gemini_blocked_and_truncated_responses() {
    let blocked = json!({"promptFeedback": {"blockReason": "SAFETY"}});
    let err = response_text(&blocked).unwrap_err();
    assert!(!err.is_retryable());

    let truncated = json!({
        "candidates": [{"content": {"parts": [{"text": "{\"events\": ["}]}, "finishReason": "MAX_TOKENS"}]
    });
    assert_eq!(response_text(&truncated).unwrap_err().code(), "invalid_response_shape");

    let empty = json!({"candidates": []});
    assert!(response_text(&empty).unwrap_err().is_retryable());
}

// =============================================================================
// Gemini over HTTP
// =============================================================================

#[tokio::test]
async fn gemini_round_trip_sends_key_header() {
    let reply = json!({"candidates": [{"content": {"parts": [{"text": "{\"ok\": true}"}]}, "finishReason": "STOP"}]});
    let (url, server) = one_shot("200 OK", "", &reply.to_string()).await;
    let backend = GeminiBackend::new("secret-key", "gemini-1.5-pro").with_base_url(url);

    let text = backend.infer(&request(StageKind::Extract, ResponseShape::Json)).await.unwrap();

    assert_eq!(text, "{\"ok\": true}");
    let raw = server.await.unwrap();
    assert!(raw.starts_with("POST /v1beta/models/gemini-1.5-pro:generateContent"));
    assert!(raw.to_ascii_lowercase().contains("x-goog-api-key: secret-key"));
}

#[tokio::test]
#[traced_test]
async fn gemini_rate_limit_is_retryable_with_hint() {
    let (url, server) = one_shot("429 Too Many Requests", "Retry-After: 7\r\n", "{}").await;
    let backend = GeminiBackend::new("k", "gemini-1.5-pro").with_base_url(url);

    let err = backend
        .infer(&request(StageKind::Qc, ResponseShape::QcSections))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "rate_limited");
    assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    assert!(logs_contain("gemini returned an error"));
    server.await.unwrap();
}

#[tokio::test]
async fn gemini_without_key_is_a_config_error() {
    let backend = GeminiBackend::new("", "gemini-1.5-pro");
    let err = backend.infer(&request(StageKind::Write, ResponseShape::Markdown)).await.unwrap_err();
    assert_eq!(err.code(), "config");
    assert!(!err.is_retryable());
}

// =============================================================================
// Ollama
// =============================================================================

#[test]
fn ollama_json_stages_request_json_format() {
    let backend = OllamaBackend::new("http://localhost:11434", "llama3.1").with_temperature(0.3);
    let body: Value = serde_json::to_value(backend.chat_request(&request(StageKind::Clarify, ResponseShape::Json))).unwrap();
    assert_eq!(body["format"], "json");
    assert_eq!(body["stream"], false);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["content"], "Extract the record.");

    let body: Value = serde_json::to_value(backend.chat_request(&request(StageKind::Write, ResponseShape::Markdown))).unwrap();
    assert!(body.get("format").is_none());
}

#[tokio::test]
async fn ollama_refuses_attachments() {
    let backend = OllamaBackend::new("http://localhost:11434", "llama3.1");
    let mut req = request(StageKind::Extract, ResponseShape::Json);
    req.attachments.push(Attachment::pdf("case.pdf", Bytes::from_static(b"%PDF")));
    let err = backend.infer(&req).await.unwrap_err();
    assert_eq!(err.code(), "config");
    assert!(err.to_string().contains("extract"));
}

#[tokio::test]
async fn ollama_round_trip() {
    let reply = json!({"model": "llama3.1", "message": {"role": "assistant", "content": "# Draft"}, "done": true});
    let (url, server) = one_shot("200 OK", "", &reply.to_string()).await;
    let backend = OllamaBackend::new(url, "llama3.1");

    let text = backend.infer(&request(StageKind::Write, ResponseShape::Markdown)).await.unwrap();

    assert_eq!(text, "# Draft");
    assert!(server.await.unwrap().starts_with("POST /api/chat"));
}

#[tokio::test]
async fn ollama_server_error_is_retryable() {
    let (url, server) = one_shot("503 Service Unavailable", "", "{\"error\": \"loading model\"}").await;
    let backend = OllamaBackend::new(url, "llama3.1");

    let err = backend.infer(&request(StageKind::Write, ResponseShape::Markdown)).await.unwrap_err();

    assert!(err.is_retryable());
    assert!(err.to_string().contains("loading model"));
    server.await.unwrap();
}

// =============================================================================
// Backend selection
// =============================================================================

#[test]
fn stage_overrides_resolve_to_their_backend() {
    let config = Config::from_lookup(|k| match k {
        "INFERENCE_BACKEND" => Some("gemini".into()),
        "STAGE_BACKENDS" => Some("write=ollama,revise=ollama".into()),
        _ => None,
    })
    .unwrap();

    let set = backends_from_config(&config).unwrap();

    assert_eq!(set.resolve(StageKind::Write).name(), "ollama");
    assert_eq!(set.resolve(StageKind::Revise).name(), "ollama");
    assert_eq!(set.resolve(StageKind::Extract).name(), "gemini");
    assert_eq!(set.resolve(StageKind::Qc).name(), "gemini");
}
