//! Engine configuration
//!
//! Every section carries defaults matching the tuned production constants,
//! so a bare `Config::default()` is a fully working configuration. Files and
//! environment variables only override what they name.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Interaction mode of the assistant session.
///
/// Chat front-loads context into the prompt; agent fetches it just-in-time
/// through tools, so ranking and budgets differ between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    Chat,
    Agent,
}

/// Model routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Main model used when auto-routing is disabled and as the final
    /// fallback of the tier chain.
    pub main_model: String,
    /// Enable complexity-based model routing.
    pub auto_route: bool,
    pub simple_model: Option<String>,
    pub moderate_model: Option<String>,
    pub complex_model: Option<String>,
    /// Per-tier context token budgets; unset tiers fall back to the
    /// mode default scaled by a tier multiplier.
    pub simple_budget: Option<usize>,
    pub moderate_budget: Option<usize>,
    pub complex_budget: Option<usize>,
    /// Default context budget in chat mode.
    pub chat_default_budget: usize,
    /// Default context budget in agent mode.
    pub agent_default_budget: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            main_model: "claude-sonnet".to_string(),
            auto_route: true,
            simple_model: None,
            moderate_model: None,
            complex_model: None,
            simple_budget: None,
            moderate_budget: None,
            complex_budget: None,
            chat_default_budget: 3000,
            agent_default_budget: 6000,
        }
    }
}

/// Context ranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Query-match score above which the conversation-memory penalty is
    /// softened (the user is explicitly asking about that material again).
    pub memory_override_threshold: f32,
    /// Factor applied to the memory penalty when the override triggers.
    pub memory_override_factor: f32,
    /// Context items required before the semantic index is consulted.
    pub semantic_min_items: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            memory_override_threshold: 30.0,
            memory_override_factor: 0.5,
            semantic_min_items: 10,
        }
    }
}

/// Conversation history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Recent messages kept verbatim.
    pub window_size: usize,
    /// Minimum number of older messages before summarization kicks in.
    pub min_summarize: usize,
    /// Output-token cap for the synthesized summary.
    pub summary_max_tokens: usize,
    /// TTL for summaries keyed by the exact source message sequence.
    pub summary_cache_ttl_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window_size: 8,
            min_summarize: 4,
            summary_max_tokens: 300,
            summary_cache_ttl_secs: 300,
        }
    }
}

/// Context formatting cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    /// Terminal state older than this is likely stale anyway.
    pub max_age_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            max_age_secs: 30,
        }
    }
}

/// Streaming output buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Buffered size that forces an immediate synchronous flush.
    pub flush_threshold_chars: usize,
    /// Scheduled flush delay after an append.
    pub flush_interval_ms: u64,
    /// Quiet-period flush in case the stream pauses.
    pub idle_flush_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            flush_threshold_chars: 500,
            flush_interval_ms: 50,
            idle_flush_ms: 150,
        }
    }
}

/// Prompt enhancement configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    pub enabled: bool,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Summarization client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/v1/chat/completions".to_string(),
            api_key: None,
            model: None,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub mode: SessionMode,
    /// Embedding model for the semantic index; unset disables it.
    pub embedding_model: Option<String>,
    pub routing: RoutingConfig,
    pub ranking: RankingConfig,
    pub history: HistoryConfig,
    pub cache: CacheConfig,
    pub stream: StreamConfig,
    pub enhancement: EnhancementConfig,
    pub summarizer: SummarizerConfig,
}

impl Config {
    /// Load configuration from a TOML file with `CONTEXT_ROUTER__*`
    /// environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix("CONTEXT_ROUTER").separator("__"))
            .build()
            .map_err(|e| EngineError::Configuration(e.to_string()))?;

        let cfg: Config = settings
            .try_deserialize()
            .map_err(|e| EngineError::Configuration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate that the configuration is internally consistent.
    pub fn validate(&self) -> Result<()> {
        if self.routing.main_model.trim().is_empty() {
            return Err(EngineError::Configuration(
                "routing.main_model must be set".to_string(),
            ));
        }
        if self.history.window_size == 0 {
            return Err(EngineError::Configuration(
                "history.window_size must be positive".to_string(),
            ));
        }
        if self.cache.capacity == 0 {
            return Err(EngineError::Configuration(
                "cache.capacity must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.ranking.memory_override_factor) {
            return Err(EngineError::Configuration(format!(
                "ranking.memory_override_factor {} outside [0, 1]",
                self.ranking.memory_override_factor
            )));
        }
        Ok(())
    }

    /// Default context budget for the configured mode.
    pub fn default_budget(&self) -> usize {
        match self.mode {
            SessionMode::Chat => self.routing.chat_default_budget,
            SessionMode::Agent => self.routing.agent_default_budget,
        }
    }
}
