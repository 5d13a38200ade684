//! Conversation summarization with a deterministic fallback
//!
//! The primary summarizer asks a model to compress old turns into a short
//! brief. The extractive fallback never fails and never touches the network,
//! so a slow or broken summarizer can never block a request.

use super::window::{ChatMessage, Role};
use crate::config::SummarizerConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Summarizer errors
#[derive(Debug, Error)]
pub enum SummarizerError {
    #[error("Summarizer not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Summarization strategy over a span of conversation turns
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Compress `messages` into a brief of at most `max_tokens` output
    /// tokens.
    async fn summarize(
        &self,
        messages: &[ChatMessage],
        max_tokens: usize,
    ) -> Result<String, SummarizerError>;

    /// Whether this summarizer can actually be called (model configured).
    fn is_available(&self) -> bool {
        true
    }
}

/// Model-backed summarizer using an OpenAI-compatible chat completions API
pub struct ChatSummarizer {
    client: Client,
    config: SummarizerConfig,
}

impl ChatSummarizer {
    pub fn new(config: SummarizerConfig) -> Result<Self, SummarizerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SummarizerError::NotConfigured(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn build_prompt(&self, messages: &[ChatMessage], max_tokens: usize) -> String {
        let transcript = messages
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        format!(
            "Summarize this earlier part of a terminal-assistant conversation. \
            Cover the key topics, decisions made, files/commands/errors involved, \
            and the user's current goal. Keep it under {} tokens.\n\n{}",
            max_tokens, transcript
        )
    }
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    fn is_available(&self) -> bool {
        self.config.model.is_some()
    }

    async fn summarize(
        &self,
        messages: &[ChatMessage],
        max_tokens: usize,
    ) -> Result<String, SummarizerError> {
        if messages.is_empty() {
            return Ok(String::new());
        }
        let model = self
            .config
            .model
            .clone()
            .ok_or_else(|| SummarizerError::NotConfigured("no summary model set".to_string()))?;

        debug!(
            count = messages.len(),
            max_tokens, "requesting conversation summary"
        );

        let request = ChatCompletionRequest {
            model,
            messages: vec![
                WireMessage {
                    role: "system".to_string(),
                    content: "You compress conversation history into concise briefs. \
                        Preserve decisions, file paths, commands, and errors."
                        .to_string(),
                },
                WireMessage {
                    role: "user".to_string(),
                    content: self.build_prompt(messages, max_tokens),
                },
            ],
            max_tokens: Some(max_tokens),
            temperature: Some(0.3),
        };

        let mut last_error = None;
        for attempt in 0..self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(100 * (1 << attempt))).await;
            }

            let mut req = self.client.post(&self.config.endpoint).json(&request);
            if let Some(ref api_key) = self.config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            match req.send().await {
                Ok(response) => {
                    if !response.status().is_success() {
                        let status = response.status();
                        let body = response.text().await.unwrap_or_default();
                        last_error =
                            Some(SummarizerError::ApiError(format!("HTTP {}: {}", status, body)));
                        continue;
                    }
                    match response.json::<ChatCompletionResponse>().await {
                        Ok(resp) => {
                            if let Some(choice) = resp.choices.into_iter().next() {
                                return Ok(choice.message.content);
                            }
                            last_error =
                                Some(SummarizerError::ApiError("no choices in response".to_string()));
                        }
                        Err(e) => {
                            last_error = Some(SummarizerError::ApiError(format!(
                                "failed to parse response: {}",
                                e
                            )));
                        }
                    }
                }
                Err(e) => {
                    last_error = Some(SummarizerError::NetworkError(e.to_string()));
                }
            }
        }

        warn!(
            retries = self.config.max_retries,
            "summarization failed, caller will fall back"
        );
        Err(last_error
            .unwrap_or_else(|| SummarizerError::ApiError("no attempts made".to_string())))
    }
}

/// Deterministic extractive summary: code spans, file-looking tokens, and
/// the most frequent meaningful words, plus the latest user goal.
///
/// Never fails, never suspends.
pub fn extractive_summary(messages: &[ChatMessage]) -> String {
    let combined: String = messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let code_spans = extract_code_spans(&combined);
    let files = extract_file_tokens(&combined);
    let topics = frequent_words(&combined, 5);
    let goal = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone());

    let mut parts = Vec::new();
    if !topics.is_empty() {
        parts.push(format!("Topics discussed: {}.", topics.join(", ")));
    }
    if !files.is_empty() {
        parts.push(format!("Files and commands mentioned: {}.", files.join(", ")));
    }
    if !code_spans.is_empty() {
        let joined = code_spans
            .iter()
            .map(|s| truncate_chars(s, 80))
            .collect::<Vec<_>>()
            .join("; ");
        parts.push(format!("Code referenced: {}.", joined));
    }
    if let Some(goal) = goal {
        parts.push(format!("Most recent user request: {}", truncate_chars(&goal, 200)));
    }
    if parts.is_empty() {
        parts.push(format!("Earlier conversation of {} messages.", messages.len()));
    }
    parts.join(" ")
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}…", cut)
    }
}

/// Spans between ``` fences or single backticks.
fn extract_code_spans(text: &str) -> Vec<String> {
    let mut spans = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find('`') {
        let fence = if rest[start..].starts_with("```") { 3 } else { 1 };
        let after = &rest[start + fence..];
        let close = if fence == 3 { after.find("```") } else { after.find('`') };
        match close {
            Some(end) => {
                let span = after[..end].trim();
                if !span.is_empty() && spans.len() < 5 {
                    spans.push(span.to_string());
                }
                rest = &after[end + fence..];
            }
            None => break,
        }
    }
    spans
}

/// Tokens that look like paths or filenames.
fn extract_file_tokens(text: &str) -> Vec<String> {
    let mut files = Vec::new();
    for word in text.split_whitespace() {
        let word = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '/' && c != '.' && c != '_' && c != '-');
        let looks_like_path = word.contains('/')
            || (word.contains('.')
                && !word.starts_with('.')
                && !word.ends_with('.')
                && word.rsplit('.').next().is_some_and(|ext| {
                    ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric())
                }));
        if looks_like_path && word.len() > 3 && !files.iter().any(|f| f == word) {
            files.push(word.to_string());
            if files.len() >= 8 {
                break;
            }
        }
    }
    files
}

/// Most frequent long lowercase words, as a cheap topic signal.
fn frequent_words(text: &str, top: usize) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.len() >= 5 && word.chars().all(|c| c.is_ascii_lowercase()) {
            *counts.entry(word).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().filter(|(_, n)| *n > 1).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().take(top).map(|(w, _)| w.to_string()).collect()
}

// OpenAI-compatible wire types
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: WireMessage,
}
