use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{ensure_live, inference_failure, StageContext, StageExecutor, StageOutcome};
use crate::{
    agent::ResponseShape,
    error::{InferenceError, StageFailure},
    parse::parse_json,
    prompt::PromptBuilder,
    state::{PipelineState, StageDelta},
    types::StageKind,
};

/// Answers the questions QC raised, from the record alone.
pub struct ClarifyStage {
    ctx: Arc<StageContext>,
}

impl ClarifyStage {
    pub fn new(ctx: Arc<StageContext>) -> Self {
        Self { ctx }
    }
}

/// Accepts `{question: answer}` or the same map wrapped in `answers`.
fn parse_answers(text: &str) -> Result<BTreeMap<String, Value>, InferenceError> {
    match parse_json::<Value>(text)? {
        Value::Object(mut map) => match map.remove("answers") {
            Some(Value::Object(inner)) => Ok(inner.into_iter().collect()),
            Some(other) => {
                map.insert("answers".into(), other);
                Ok(map.into_iter().collect())
            }
            None => Ok(map.into_iter().collect()),
        },
        other => Err(InferenceError::InvalidResponseShape(format!(
            "expected an object of answers, found {}",
            kind_of(&other)
        ))),
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl StageExecutor for ClarifyStage {
    fn kind(&self) -> StageKind {
        StageKind::Clarify
    }

    async fn execute(&self, state: &PipelineState) -> StageOutcome {
        const KIND: StageKind = StageKind::Clarify;
        ensure_live(state, KIND)?;
        if state.clarification_questions.is_empty() {
            return Err(StageFailure::missing(KIND, "clarification questions"));
        }

        let mut prompt = PromptBuilder::new(&self.ctx.instruction(KIND))
            .list("QUESTIONS", &state.clarification_questions);
        if let Some(extraction) = &state.extraction {
            prompt = prompt.json("STAGE 1 EXTRACTION", extraction);
        }
        if let Some(forensic) = &state.forensic {
            prompt = prompt.json("STAGE 2 FORENSIC RECORD", forensic);
        }
        if let Some(report) = &state.report {
            prompt = prompt.text("CURRENT REPORT", report);
        }

        let answers = self
            .ctx
            .call(state, KIND, prompt.build(), Vec::new(), ResponseShape::Json, parse_answers)
            .await
            .map_err(inference_failure(KIND))?;

        info!(
            run_id = %state.run_id,
            questions = state.clarification_questions.len(),
            answers = answers.len(),
            "clarifications answered"
        );
        Ok(StageDelta::Clarified(answers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_and_bare_answers() {
        let bare = parse_answers(r#"{"Please clarify: x": "y"}"#).unwrap();
        assert_eq!(bare["Please clarify: x"], "y");
        let wrapped = parse_answers("```json\n{\"answers\": {\"q\": \"a\"}}\n```").unwrap();
        assert_eq!(wrapped.len(), 1);
        assert_eq!(wrapped["q"], "a");
    }

    #[test]
    fn list_is_a_shape_error() {
        let err = parse_answers("[1, 2]").unwrap_err();
        assert!(err.to_string().contains("array"));
    }
}
