use std::collections::HashMap;

use serde::Serialize;

use crate::types::StageKind;

/// System prompt and task instruction for one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagePrompt {
    pub system: String,
    pub instruction: String,
}

#[derive(Debug, Clone, Default)]
pub struct PromptSet {
    prompts: HashMap<StageKind, StagePrompt>,
}

impl PromptSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, stage: StageKind, system: impl Into<String>, instruction: impl Into<String>) -> Self {
        self.insert(stage, system, instruction);
        self
    }

    pub fn insert(&mut self, stage: StageKind, system: impl Into<String>, instruction: impl Into<String>) {
        self.prompts.insert(
            stage,
            StagePrompt {
                system: system.into(),
                instruction: instruction.into(),
            },
        );
    }

    /// Replaces only the instruction, keeping the system prompt.
    pub fn override_instruction(&mut self, stage: StageKind, instruction: impl Into<String>) {
        self.prompts.entry(stage).or_default().instruction = instruction.into();
    }

    pub fn get(&self, stage: StageKind) -> StagePrompt {
        self.prompts.get(&stage).cloned().unwrap_or_default()
    }

    pub fn contains(&self, stage: StageKind) -> bool {
        self.prompts.contains_key(&stage)
    }
}

/// Composes the user prompt for a stage: the instruction followed by
/// titled context sections. All stages use this so the layout stays uniform.
pub struct PromptBuilder {
    s: String,
}

impl PromptBuilder {
    pub fn new(instruction: &str) -> Self {
        Self {
            s: instruction.trim().to_string(),
        }
    }

    fn heading(&mut self, title: &str) {
        self.s.push_str("\n\n---\n\n## ");
        self.s.push_str(title);
        self.s.push_str("\n\n");
    }

    pub fn json<T: Serialize + ?Sized>(mut self, title: &str, value: &T) -> Self {
        let body = serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".into());
        self.heading(title);
        self.s.push_str("```json\n");
        self.s.push_str(&body);
        self.s.push_str("\n```");
        self
    }

    pub fn text(mut self, title: &str, text: &str) -> Self {
        if text.trim().is_empty() {
            return self;
        }
        self.heading(title);
        self.s.push_str(text.trim());
        self
    }

    pub fn list(mut self, title: &str, items: &[String]) -> Self {
        if items.is_empty() {
            return self;
        }
        self.heading(title);
        for (i, item) in items.iter().enumerate() {
            self.s.push_str(&format!("{}. {}\n", i + 1, item));
        }
        self
    }

    pub fn build(self) -> String {
        self.s
    }
}
