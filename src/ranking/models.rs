//! Data models for context ranking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of terminal-derived material a context item holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextItemKind {
    Command,
    CommandOutput,
    File,
    Selection,
}

impl ContextItemKind {
    /// Short label used when listing items inline in a prompt.
    pub fn label(&self) -> &'static str {
        match self {
            ContextItemKind::Command => "command",
            ContextItemKind::CommandOutput => "output",
            ContextItemKind::File => "file",
            ContextItemKind::Selection => "selection",
        }
    }
}

/// How the user wants an item treated by context selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InclusionMode {
    /// Pinned: a large relevance boost keeps it in nearly always.
    Always,
    /// Ranked normally.
    #[default]
    Smart,
    /// Dropped before scoring.
    Exclude,
}

/// Structured metadata attached to a context item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub command: Option<String>,
    pub path: Option<String>,
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub inclusion: InclusionMode,
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl ItemMetadata {
    /// Whether this item carries evidence of a failure.
    pub fn is_error(&self) -> bool {
        self.exit_code.map(|c| c != 0).unwrap_or(false)
    }
}

/// A unit of terminal-derived material eligible for prompt inclusion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextItem {
    pub id: String,
    pub kind: ContextItemKind,
    pub content: String,
    pub redacted_content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_used_in_message_id: Option<String>,
    pub usage_count: u32,
    pub metadata: ItemMetadata,
}

impl ContextItem {
    pub fn new(kind: ContextItemKind, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            content: content.into(),
            redacted_content: None,
            created_at: Utc::now(),
            last_used_at: None,
            last_used_in_message_id: None,
            usage_count: 0,
            metadata: ItemMetadata::default(),
        }
    }

    /// Content as it should appear in a prompt (redacted form wins).
    pub fn effective_content(&self) -> &str {
        self.redacted_content.as_deref().unwrap_or(&self.content)
    }

    /// Identity fingerprint used by deduplication: commands dedup on the
    /// command text, files on the path, everything else on a content prefix.
    pub fn dedup_fingerprint(&self) -> String {
        match self.kind {
            ContextItemKind::Command => {
                if let Some(cmd) = &self.metadata.command {
                    return format!("command:{}", cmd);
                }
            }
            ContextItemKind::File => {
                if let Some(path) = &self.metadata.path {
                    return format!("file:{}", path);
                }
            }
            _ => {}
        }
        let prefix: String = self.content.chars().take(200).collect();
        format!("{}:{}", self.kind.label(), prefix)
    }

    /// Version stamp folded into the context-set fingerprint; changes when
    /// usage bookkeeping mutates the item.
    pub fn version_stamp(&self) -> String {
        format!(
            "{}:{}:{}",
            self.created_at.timestamp_millis(),
            self.last_used_at.map(|t| t.timestamp_millis()).unwrap_or(0),
            self.usage_count
        )
    }
}

/// Per-factor relevance breakdown.
///
/// Kept as an explicit record rather than hidden counters so each factor is
/// independently unit-testable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub recency: f32,
    pub time_decay: f32,
    pub usage_penalty: f32,
    pub memory_penalty: f32,
    pub type_relevance: f32,
    pub query_match: f32,
    pub conversation_match: f32,
    pub mode_bonus: f32,
    pub pin_bonus: f32,
}

impl ScoreBreakdown {
    /// Sum of all factors clamped to [0, 100].
    pub fn total(&self) -> f32 {
        let raw = self.recency
            + self.time_decay
            + self.usage_penalty
            + self.memory_penalty
            + self.type_relevance
            + self.query_match
            + self.conversation_match
            + self.mode_bonus
            + self.pin_bonus;
        raw.clamp(0.0, 100.0)
    }
}

/// A context item with its computed relevance, recomputed per request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedContext {
    pub item: ContextItem,
    pub score: f32,
    pub breakdown: ScoreBreakdown,
    /// Approximate token cost (chars / 4).
    pub token_cost: usize,
}
