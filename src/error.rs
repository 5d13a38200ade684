//! Error types for the context-routing engine

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine errors
///
/// Ranking, caching, routing, history windowing and prompt enhancement are
/// total functions and never produce these; errors come from configuration
/// validation and from the external collaborators (transport, summarizer,
/// semantic index).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Required configuration is missing or inconsistent. Surfaced before
    /// any network activity, never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An external call (generation, summarization, semantic index) failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The caller cancelled the request. Distinguished from failure so the
    /// UI can show "cancelled" rather than "failed".
    #[error("Request cancelled")]
    Cancelled,

    /// Anything unexpected, caught at the orchestration boundary.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether this error represents a user-initiated cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_detection() {
        assert!(EngineError::Cancelled.is_cancelled());
        assert!(!EngineError::Transport("timeout".to_string()).is_cancelled());
    }
}
