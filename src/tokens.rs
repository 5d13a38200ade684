//! Token estimation

use std::sync::Arc;
use tiktoken_rs::{cl100k_base, CoreBPE};

/// Token estimator trait for different tokenization strategies
pub trait TokenEstimator: Send + Sync {
    /// Estimate the number of tokens in the given text
    fn estimate(&self, text: &str) -> usize;

    /// Estimate tokens for multiple texts
    fn estimate_batch(&self, texts: &[&str]) -> Vec<usize> {
        texts.iter().map(|t| self.estimate(t)).collect()
    }
}

/// Character-based estimator: `ceil(chars / 4)`.
///
/// This is the canonical budget proxy used by the ranker, the conversation
/// window and the router so that all budget arithmetic stays consistent.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharEstimator;

impl CharEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl TokenEstimator for CharEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

/// Estimate tokens with the canonical chars/4 proxy.
///
/// Free-function form for call sites that don't need the trait object.
pub fn approx_tokens(text: &str) -> usize {
    CharEstimator.estimate(text)
}

/// Tiktoken-based estimator using cl100k_base.
///
/// Used for precise usage accounting when finalizing request metrics; too
/// slow to sit on the per-item ranking path.
pub struct TiktokenEstimator {
    bpe: Arc<CoreBPE>,
}

impl TiktokenEstimator {
    pub fn new() -> Result<Self, anyhow::Error> {
        let bpe = cl100k_base()?;
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_estimator_rounds_up() {
        let est = CharEstimator::new();
        assert_eq!(est.estimate(""), 0);
        assert_eq!(est.estimate("abc"), 1);
        assert_eq!(est.estimate("abcd"), 1);
        assert_eq!(est.estimate("abcde"), 2);
        assert_eq!(est.estimate(&"x".repeat(400)), 100);
    }

    #[test]
    fn test_approx_matches_trait() {
        assert_eq!(approx_tokens("hello world"), CharEstimator.estimate("hello world"));
    }

    #[test]
    fn test_tiktoken_estimator() {
        let est = TiktokenEstimator::new().unwrap();
        let tokens = est.estimate("Hello, world! This is a test.");
        assert!(tokens > 0);
        assert!(tokens < 20);
    }

    #[test]
    fn test_batch_estimation() {
        let est = CharEstimator::new();
        let tokens = est.estimate_batch(&["abcd", "abcdefgh"]);
        assert_eq!(tokens, vec![1, 2]);
    }
}
