use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EmberError, Result};

/// Top-level configuration for the Ember agent.
///
/// Loaded from `~/.ember/config.toml` by default. Every section is optional
/// and falls back to its defaults when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmberConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub dialog: DialogConfig,
    #[serde(default)]
    pub completion_log: CompletionLogConfig,
}

impl EmberConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EmberConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let retrieval = &self.retrieval;
        if !matches!(retrieval.embedding_backend.as_str(), "term-hash" | "onnx") {
            return Err(EmberError::Config(format!(
                "unknown embedding_backend {:?}",
                retrieval.embedding_backend
            )));
        }
        if retrieval.embedding_dim == 0 {
            return Err(EmberError::Config("embedding_dim must be positive".into()));
        }
        // Cosine similarity of unit vectors lies in [-1, 1].
        for (name, value) in [
            ("confidence_threshold", retrieval.confidence_threshold),
            ("term_hash_threshold", retrieval.term_hash_threshold),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(EmberError::Config(format!(
                    "{name} {value} is outside [-1, 1]"
                )));
            }
        }
        if retrieval.encode_timeout_ms == 0 {
            return Err(EmberError::Config("encode_timeout_ms must be positive".into()));
        }
        if self.completion_log.sink_timeout_ms == 0 {
            return Err(EmberError::Config("sink_timeout_ms must be positive".into()));
        }
        if !matches!(
            self.dialog.fallback_policy.to_ascii_lowercase().as_str(),
            "permissive" | "strict"
        ) {
            return Err(EmberError::Config(format!(
                "unknown fallback_policy {:?}",
                self.dialog.fallback_policy
            )));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Semantic fallback retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Embedding backend: "onnx" or "term-hash". When the onnx model cannot
    /// be loaded the term-hash backend is used instead.
    pub embedding_backend: String,
    /// Directory holding `model.onnx` and `tokenizer.json` for the onnx backend.
    pub model_dir: String,
    /// Vector dimensionality for the term-hash backend.
    pub embedding_dim: usize,
    /// Minimum similarity (inclusive) for a knowledge-base answer.
    pub confidence_threshold: f64,
    /// Threshold applied instead of `confidence_threshold` while the
    /// term-hash backend is in use. Bag-of-terms scores run higher for
    /// unrelated questions than sentence-embedding scores.
    pub term_hash_threshold: f64,
    /// Upper bound on a single encode call, in milliseconds.
    pub encode_timeout_ms: u64,
    /// Optional JSON file of (query, answer, source) triples. The bundled
    /// knowledge base is used when unset.
    pub knowledge_base: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            embedding_backend: "onnx".to_string(),
            model_dir: "~/.ember/models/all-MiniLM-L6-v2".to_string(),
            embedding_dim: 384,
            confidence_threshold: 0.6,
            term_hash_threshold: 0.65,
            encode_timeout_ms: 2000,
            knowledge_base: None,
        }
    }
}

/// Conversation engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogConfig {
    /// How the generic advance rule treats unrecognized input:
    /// "permissive" (any non-retreat input advances) or "strict"
    /// (blank input re-prompts).
    pub fallback_policy: String,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            fallback_policy: "permissive".to_string(),
        }
    }
}

/// Completion event delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionLogConfig {
    /// Whether completion events are written to `path`. When disabled they
    /// are only emitted as tracing events.
    pub enabled: bool,
    /// JSON-lines file receiving one record per completed flow.
    pub path: String,
    /// Maximum summary length in characters.
    pub summary_max_chars: usize,
    /// Upper bound on delivering one event, in milliseconds.
    pub sink_timeout_ms: u64,
}

impl Default for CompletionLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "~/.ember/completions.jsonl".to_string(),
            summary_max_chars: 50,
            sink_timeout_ms: 2000,
        }
    }
}
