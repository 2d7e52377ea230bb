use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{error::InferenceError, types::StageKind};

/// What the caller will parse out of the model's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    Json,
    Markdown,
    /// Fenced QC JSON followed by a fenced corrected report.
    QcSections,
}

/// Binary document sent alongside the prompt (source PDFs).
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl Attachment {
    pub fn pdf(name: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            mime_type: "application/pdf".into(),
            data,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub run_id: String,
    pub stage: StageKind,
    pub system_prompt: String,
    pub prompt: String,
    pub attachments: Vec<Attachment>,
    pub shape: ResponseShape,
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &str;

    /// One model call. Returns the raw response text; parsing belongs to the
    /// stage that asked.
    async fn infer(&self, request: &InferenceRequest) -> Result<String, InferenceError>;
}

/// Default backend plus per-stage overrides.
#[derive(Clone)]
pub struct BackendSet {
    default: Arc<dyn InferenceBackend>,
    overrides: HashMap<StageKind, Arc<dyn InferenceBackend>>,
}

impl BackendSet {
    pub fn new(default: Arc<dyn InferenceBackend>) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, stage: StageKind, backend: Arc<dyn InferenceBackend>) -> Self {
        self.overrides.insert(stage, backend);
        self
    }

    pub fn resolve(&self, stage: StageKind) -> Arc<dyn InferenceBackend> {
        self.overrides
            .get(&stage)
            .map(Arc::clone)
            .unwrap_or_else(|| Arc::clone(&self.default))
    }
}
