use async_trait::async_trait;
use patentflow_core::{
    agent::{InferenceBackend, InferenceRequest, ResponseShape},
    error::InferenceError,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::http;

/// Calls a locally-hosted Ollama model via its native chat API.
///
/// Intended for deployments where case documents must not leave the local
/// machine. Ollama cannot read PDFs, so stages that attach source documents
/// must be routed to another backend.
pub struct OllamaBackend {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: Option<f32>,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            timeout_secs: 600,
            temperature: None,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn chat_request(&self, request: &InferenceRequest) -> OllamaChatRequest {
        let mut messages = Vec::new();
        if !request.system_prompt.is_empty() {
            messages.push(OllamaMessage {
                role: "system".into(),
                content: request.system_prompt.clone(),
            });
        }
        messages.push(OllamaMessage {
            role: "user".into(),
            content: request.prompt.clone(),
        });

        OllamaChatRequest {
            model: self.model.clone(),
            messages,
            stream: false,
            format: (request.shape == ResponseShape::Json).then(|| "json".to_string()),
            options: self.temperature.map(|temperature| OllamaOptions { temperature }),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
pub struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Serialize)]
pub struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        if !request.attachments.is_empty() {
            return Err(InferenceError::Config(format!(
                "ollama cannot read {} attached document(s) for {}; route this stage to gemini",
                request.attachments.len(),
                request.stage
            )));
        }

        let body = self.chat_request(request);
        info!(
            run_id = %request.run_id,
            stage = %request.stage,
            model = %self.model,
            base_url = %self.base_url,
            "calling ollama chat API"
        );

        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let client = http::client(self.timeout_secs)?;

        let response = match client.post(&url).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(run_id = %request.run_id, stage = %request.stage, "ollama request failed: {}", e);
                return Err(http::transport_error(e, self.timeout_secs));
            }
        };
        let response = http::check(response).await.inspect_err(|e| {
            warn!(run_id = %request.run_id, stage = %request.stage, "ollama returned an error: {}", e);
        })?;

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::InvalidResponseShape(format!("ollama response: {e}")))?;
        let output = parsed.message.content;

        info!(
            run_id = %request.run_id,
            stage = %request.stage,
            output_len = output.len(),
            "ollama response received"
        );
        Ok(output)
    }
}
