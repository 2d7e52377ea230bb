use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use patentflow_core::{
    agent::{InferenceBackend, InferenceRequest, ResponseShape},
    error::InferenceError,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::http;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Google Gemini over the public `generateContent` REST endpoint. Source PDFs
/// travel inline as base64 parts.
pub struct GeminiBackend {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
    pub base_url: String,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.3,
            max_output_tokens: 8192,
            timeout_secs: 600,
            base_url: DEFAULT_BASE_URL.into(),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_generation(mut self, temperature: f32, max_output_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    pub fn request_body(&self, request: &InferenceRequest) -> Value {
        let mut parts: Vec<Value> = request
            .attachments
            .iter()
            .map(|a| {
                json!({
                    "inline_data": {
                        "mime_type": a.mime_type,
                        "data": STANDARD.encode(&a.data),
                    }
                })
            })
            .collect();
        parts.push(json!({ "text": request.prompt }));

        let mut generation = json!({
            "temperature": self.temperature,
            "maxOutputTokens": self.max_output_tokens,
        });
        if request.shape == ResponseShape::Json {
            generation["responseMimeType"] = json!("application/json");
        }

        let safety: Vec<Value> = HARM_CATEGORIES
            .iter()
            .map(|c| json!({ "category": c, "threshold": "BLOCK_NONE" }))
            .collect();

        let mut body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": generation,
            "safetySettings": safety,
        });
        if !request.system_prompt.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": request.system_prompt }] });
        }
        body
    }
}

/// Concatenated text of the first candidate. Blocked prompts are fatal,
/// empty or truncated candidates are shape errors.
pub fn response_text(body: &Value) -> Result<String, InferenceError> {
    if let Some(reason) = body.pointer("/promptFeedback/blockReason").and_then(Value::as_str) {
        return Err(InferenceError::fatal(format!("prompt blocked by provider: {reason}")));
    }
    let candidate = body
        .pointer("/candidates/0")
        .ok_or_else(|| InferenceError::InvalidResponseShape("gemini returned no candidates".into()))?;

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| parts.iter().filter_map(|p| p.get("text").and_then(Value::as_str)).collect())
        .unwrap_or_default();

    let finish = candidate.get("finishReason").and_then(Value::as_str).unwrap_or("");
    if text.trim().is_empty() {
        return Err(InferenceError::InvalidResponseShape(format!(
            "gemini candidate has no text (finish reason {finish:?})"
        )));
    }
    if finish == "MAX_TOKENS" {
        return Err(InferenceError::InvalidResponseShape(
            "gemini output truncated at max_output_tokens".into(),
        ));
    }
    Ok(text)
}

#[async_trait]
impl InferenceBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        if self.api_key.is_empty() {
            return Err(InferenceError::Config("GOOGLE_API_KEY is not set".into()));
        }

        let body = self.request_body(request);
        info!(
            run_id = %request.run_id,
            stage = %request.stage,
            model = %self.model,
            attachments = request.attachments.len(),
            "calling gemini generateContent"
        );

        let client = http::client(self.timeout_secs)?;
        let response = match client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(run_id = %request.run_id, stage = %request.stage, "gemini request failed: {}", e);
                return Err(http::transport_error(e, self.timeout_secs));
            }
        };
        let response = http::check(response).await.inspect_err(|e| {
            warn!(run_id = %request.run_id, stage = %request.stage, "gemini returned an error: {}", e);
        })?;

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| InferenceError::InvalidResponseShape(format!("gemini response: {e}")))?;
        if let Some(usage) = parsed.get("usageMetadata") {
            debug!(run_id = %request.run_id, stage = %request.stage, usage = %usage, "gemini usage");
        }
        let output = response_text(&parsed)?;

        info!(
            run_id = %request.run_id,
            stage = %request.stage,
            output_len = output.len(),
            "gemini response received"
        );
        Ok(output)
    }
}
