//! External collaborator interfaces
//!
//! The engine only consumes these narrow contracts; the actual provider
//! transport, semantic index, and terminal capture live outside this crate.

use crate::error::Result;
use crate::history::ChatMessage;
use crate::ranking::ContextItem;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Token usage reported when a generation finishes
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Typed incremental events from a model generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    TextDelta { text: String },
    ToolCall { name: String, arguments: serde_json::Value },
    ToolResult { name: String, output: String },
    Finish { usage: TokenUsage },
    Error { message: String },
}

/// One generation call handed to the provider transport
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

/// Clonable cancellation flag checked between stream events
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Provider transport producing an event stream for one generation
#[async_trait]
pub trait ModelTransport: Send + Sync {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<BoxStream<'static, StreamEvent>>;
}

/// A scored chunk returned by the semantic index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub item_id: String,
    pub content: String,
    pub score: f32,
}

/// Optional embedding-backed index. Consulted only when an embedding model
/// is configured and enough items exist; every failure falls back silently
/// to the keyword ranker.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    async fn query(
        &self,
        model: &str,
        items: &[ContextItem],
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>>;
}
