use std::{collections::HashMap, time::Duration};

use anyhow::{bail, Result};

use crate::{
    engine::EngineConfig,
    retry::RetryPolicy,
    supervisor::LoopPolicy,
    types::StageKind,
};

/// Full application configuration. Read once at startup from the process
/// environment, falling back to `.env` in the working directory.
#[derive(Debug, Clone)]
pub struct Config {
    // API
    pub api_bind: String,
    pub api_port: u16,

    // Inference
    /// "gemini" (default) or "ollama".
    pub inference_backend: String,
    /// Raw `stage=backend` list, e.g. `write=ollama,qc=ollama`.
    pub stage_backends: String,
    pub google_api_key: String,
    pub gemini_model: String,
    pub gemini_temperature: f32,
    pub gemini_max_output_tokens: u32,
    pub ollama_url: String,
    pub ollama_model: String,
    pub inference_timeout_s: u64,

    // Retry
    pub retry_max_attempts: u32,
    pub retry_min_backoff_s: u64,
    pub retry_max_backoff_s: u64,

    // Loops
    pub max_revisions: u32,
    pub max_clarifications: u32,
    pub max_total_iterations: u32,

    pub max_concurrent_runs: u32,
    pub search_intel_enabled: bool,

    // Storage
    /// "http" (default) writes next to the source blob, "local" under `local_store_dir`.
    pub storage_backend: String,
    pub local_store_dir: String,
    pub azure_storage_sas_token: String,

    // On-disk overrides
    pub tech_pack_dir: String,
    pub prompts_dir: String,

    /// "pretty" (default) or "json".
    pub log_format: String,
}

fn parse_dotenv() -> HashMap<String, String> {
    let Ok(contents) = std::fs::read_to_string(".env") else {
        return HashMap::new();
    };
    parse_dotenv_str(&contents)
}

fn parse_dotenv_str(contents: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            let v = v.trim().trim_matches('"');
            map.insert(k.trim().to_string(), v.to_string());
        }
    }
    map
}

/// Key lookup with typed getters. Empty values count as unset.
struct Source<F: Fn(&str) -> Option<String>> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Source<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn get_str(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).as_deref() {
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(_) => default,
            None => default,
        }
    }

    fn get_parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let dotenv = parse_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok().or_else(|| dotenv.get(key).cloned()))
    }

    /// Builds a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let s = Source { lookup };
        let loops = LoopPolicy::default();
        let retry = RetryPolicy::default();

        let config = Self {
            api_bind: s.get_str("API_BIND", "0.0.0.0"),
            api_port: s.get_parsed("API_PORT", 8000),
            inference_backend: s.get_str("INFERENCE_BACKEND", "gemini").to_lowercase(),
            stage_backends: s.get_str("STAGE_BACKENDS", ""),
            google_api_key: s.get_str("GOOGLE_API_KEY", ""),
            gemini_model: s.get_str("GEMINI_MODEL", "gemini-1.5-pro"),
            gemini_temperature: s.get_parsed("GEMINI_TEMPERATURE", 0.3),
            gemini_max_output_tokens: s.get_parsed("GEMINI_MAX_OUTPUT_TOKENS", 8192),
            ollama_url: s.get_str("OLLAMA_URL", "http://localhost:11434"),
            ollama_model: s.get_str("OLLAMA_MODEL", "llama3.1"),
            inference_timeout_s: s.get_parsed("INFERENCE_TIMEOUT_S", retry.call_timeout.as_secs()),
            retry_max_attempts: s.get_parsed("RETRY_MAX_ATTEMPTS", retry.max_attempts),
            retry_min_backoff_s: s.get_parsed("RETRY_MIN_BACKOFF_S", retry.min_backoff.as_secs()),
            retry_max_backoff_s: s.get_parsed("RETRY_MAX_BACKOFF_S", retry.max_backoff.as_secs()),
            max_revisions: s.get_parsed("MAX_REVISIONS", loops.max_revisions),
            max_clarifications: s.get_parsed("MAX_CLARIFICATIONS", loops.max_clarifications),
            max_total_iterations: s.get_parsed("MAX_TOTAL_ITERATIONS", loops.max_total_iterations),
            max_concurrent_runs: s.get_parsed("MAX_CONCURRENT_RUNS", 4),
            search_intel_enabled: s.get_bool("SEARCH_INTEL_ENABLED", true),
            storage_backend: s.get_str("STORAGE_BACKEND", "http").to_lowercase(),
            local_store_dir: s.get_str("LOCAL_STORE_DIR", "./data/reports"),
            azure_storage_sas_token: s.get_str("AZURE_STORAGE_SAS_TOKEN", ""),
            tech_pack_dir: s.get_str("TECH_PACK_DIR", "./techpacks"),
            prompts_dir: s.get_str("PROMPTS_DIR", "./prompts"),
            log_format: s.get_str("LOG_FORMAT", "pretty").to_lowercase(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for backend in std::iter::once(self.inference_backend.as_str())
            .chain(self.stage_backend_overrides()?.iter().map(|(_, b)| b.as_str()))
        {
            if !matches!(backend, "gemini" | "ollama") {
                bail!("unknown inference backend {backend:?}, expected gemini or ollama");
            }
        }
        if !matches!(self.storage_backend.as_str(), "http" | "local") {
            bail!("unknown STORAGE_BACKEND {:?}, expected http or local", self.storage_backend);
        }
        Ok(())
    }

    /// Parses `STAGE_BACKENDS` into (stage, backend) pairs.
    pub fn stage_backend_overrides(&self) -> Result<Vec<(StageKind, String)>> {
        let mut overrides = Vec::new();
        for entry in self.stage_backends.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let Some((stage, backend)) = entry.split_once('=') else {
                bail!("STAGE_BACKENDS entry {entry:?} is not stage=backend");
            };
            let Some(kind) = StageKind::parse(stage.trim()) else {
                bail!("STAGE_BACKENDS names unknown stage {:?}", stage.trim());
            };
            overrides.push((kind, backend.trim().to_lowercase()));
        }
        Ok(overrides)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts.max(1),
            min_backoff: Duration::from_secs(self.retry_min_backoff_s),
            max_backoff: Duration::from_secs(self.retry_max_backoff_s.max(self.retry_min_backoff_s)),
            call_timeout: Duration::from_secs(self.inference_timeout_s.max(1)),
        }
    }

    pub fn loop_policy(&self) -> LoopPolicy {
        LoopPolicy {
            max_revisions: self.max_revisions,
            max_clarifications: self.max_clarifications,
            max_total_iterations: self.max_total_iterations,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            loop_policy: self.loop_policy(),
            retry: self.retry_policy(),
            search_intel_enabled: self.search_intel_enabled,
        }
    }
}
