//! Context relevance ranking with budget-constrained selection
//!
//! Scores terminal-derived context items against the current query and
//! conversation, selects the best under a token budget, and memoizes the
//! result in a short-TTL cache keyed on the item set's fingerprint.

pub mod cache;
pub mod models;
pub mod ranker;
pub mod scorer;

pub use cache::{CachedSelection, ContextCache, EvictionObserver, EvictionReason, fingerprint_items};
pub use models::{
    ContextItem, ContextItemKind, InclusionMode, ItemMetadata, RankedContext, ScoreBreakdown,
};
pub use ranker::{dedup_items, format_ranked, rank};
pub use scorer::{extract_terms, score_item, ScoringContext};
