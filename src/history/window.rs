//! Sliding-window conversation history with summarization of older turns

use super::summarizer::{extractive_summary, Summarizer};
use crate::config::HistoryConfig;
use crate::tokens::approx_tokens;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One conversation message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
        }
    }

    pub fn system(content: String) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: String) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: String) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Bounded recent conversation plus an optional synthesized summary of
/// older turns. Rebuilt each request from the full history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationWindow {
    /// Summary message (when present) followed by the verbatim recent tail.
    pub messages: Vec<ChatMessage>,
    pub summarized: bool,
    pub total_original_count: usize,
    pub tokens_saved: usize,
}

impl ConversationWindow {
    /// The verbatim recent messages, excluding any synthetic summary.
    pub fn recent(&self) -> &[ChatMessage] {
        if self.summarized {
            &self.messages[1..]
        } else {
            &self.messages
        }
    }
}

/// Prepares the conversation window for each request
pub struct HistoryManager {
    config: HistoryConfig,
    summarizer: Arc<dyn Summarizer>,
    /// Summaries keyed by the exact ordered message-id sequence they cover.
    summary_cache: Cache<String, String>,
}

impl HistoryManager {
    pub fn new(config: HistoryConfig, summarizer: Arc<dyn Summarizer>) -> Self {
        let summary_cache = Cache::builder()
            .max_capacity(32)
            .time_to_live(Duration::from_secs(config.summary_cache_ttl_secs))
            .build();
        Self {
            config,
            summarizer,
            summary_cache,
        }
    }

    /// Build the window: recent tail verbatim, older head summarized when
    /// large enough. An old head smaller than `min_summarize` is dropped
    /// outright rather than summarized or kept verbatim: the window never
    /// exceeds `window_size` messages, and the dropped text still counts
    /// toward `tokens_saved`. Never fails; a broken summarizer degrades to
    /// the extractive fallback.
    pub async fn prepare(&self, messages: &[ChatMessage]) -> ConversationWindow {
        let non_system: Vec<ChatMessage> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect();
        let total = non_system.len();

        if total <= self.config.window_size {
            return ConversationWindow {
                messages: non_system,
                summarized: false,
                total_original_count: total,
                tokens_saved: 0,
            };
        }

        let split = total - self.config.window_size;
        let (old, recent) = non_system.split_at(split);
        let old_tokens: usize = old.iter().map(|m| approx_tokens(&m.content)).sum();

        if old.len() < self.config.min_summarize {
            debug!(dropped = old.len(), "old head too small to summarize, dropping");
            return ConversationWindow {
                messages: recent.to_vec(),
                summarized: false,
                total_original_count: total,
                tokens_saved: old_tokens,
            };
        }

        let summary = self.summarize_old(old).await;
        let summary_tokens = approx_tokens(&summary);
        let mut window = Vec::with_capacity(recent.len() + 1);
        window.push(ChatMessage::system(format!(
            "[Summary of {} earlier messages] {}",
            old.len(),
            summary
        )));
        window.extend_from_slice(recent);

        ConversationWindow {
            messages: window,
            summarized: true,
            total_original_count: total,
            tokens_saved: old_tokens.saturating_sub(summary_tokens),
        }
    }

    async fn summarize_old(&self, old: &[ChatMessage]) -> String {
        let cache_key = old
            .iter()
            .map(|m| m.id.as_str())
            .collect::<Vec<_>>()
            .join("|");
        if let Some(cached) = self.summary_cache.get(&cache_key) {
            debug!("summary cache hit");
            return cached;
        }

        let summary = if self.summarizer.is_available() {
            match self
                .summarizer
                .summarize(old, self.config.summary_max_tokens)
                .await
            {
                Ok(s) if !s.trim().is_empty() => s,
                Ok(_) => {
                    crate::metrics::METRICS.summarization_fallbacks.inc();
                    extractive_summary(old)
                }
                Err(e) => {
                    warn!(error = %e, "summarizer failed, using extractive fallback");
                    crate::metrics::METRICS.summarization_fallbacks.inc();
                    extractive_summary(old)
                }
            }
        } else {
            crate::metrics::METRICS.summarization_fallbacks.inc();
            extractive_summary(old)
        };

        self.summary_cache.insert(cache_key, summary.clone());
        summary
    }
}
