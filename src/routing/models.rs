//! Data models for query classification and model routing

use serde::{Deserialize, Serialize};

/// Complexity tier used to select model and context budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Simple,
    Moderate,
    Complex,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Simple => "simple",
            Tier::Moderate => "moderate",
            Tier::Complex => "complex",
        }
    }

    /// Numeric complexity 1-3.
    pub fn level(&self) -> u8 {
        match self {
            Tier::Simple => 1,
            Tier::Moderate => 2,
            Tier::Complex => 3,
        }
    }

    /// Scale applied to the mode default budget when no per-tier budget is
    /// configured.
    pub fn budget_multiplier(&self) -> f32 {
        match self {
            Tier::Simple => 0.5,
            Tier::Moderate => 0.8,
            Tier::Complex => 1.0,
        }
    }
}

/// Detected query intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Debug,
    ComplexAnalysis,
    CodeAuthoring,
    Creative,
    Factual,
    Explanation,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Debug => "debug",
            QueryType::ComplexAnalysis => "complex_analysis",
            QueryType::CodeAuthoring => "code_authoring",
            QueryType::Creative => "creative",
            QueryType::Factual => "factual",
            QueryType::Explanation => "explanation",
        }
    }

    /// Fixed contribution of the detected type to the complexity score.
    pub fn keyword_factor(&self) -> u32 {
        match self {
            QueryType::Debug => 28,
            QueryType::ComplexAnalysis => 25,
            QueryType::Creative => 20,
            QueryType::CodeAuthoring => 18,
            QueryType::Explanation => 12,
            QueryType::Factual => 5,
        }
    }

    /// Generation temperature preset.
    pub fn temperature(&self) -> f32 {
        match self {
            QueryType::Factual => 0.2,
            QueryType::Debug => 0.2,
            QueryType::CodeAuthoring => 0.4,
            QueryType::ComplexAnalysis => 0.5,
            QueryType::Explanation => 0.6,
            QueryType::Creative => 0.8,
        }
    }
}

/// Independent contributions to the complexity score
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScoreFactors {
    pub length: u32,
    pub context: u32,
    pub keyword: u32,
    pub error: u32,
}

impl ScoreFactors {
    pub fn total(&self) -> u32 {
        (self.length + self.context + self.keyword + self.error).min(100)
    }
}

/// Observability record of how a decision was reached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingReasoning {
    pub query_type: QueryType,
    pub raw_score: u32,
    pub factors: ScoreFactors,
    /// Human-readable note naming a near-miss adjacent tier, when the score
    /// sits close to a boundary. Informational only.
    pub alternative_note: Option<String>,
}

/// Result of classifying one query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub tier: Tier,
    pub complexity: u8,
    pub model: String,
    pub context_budget: usize,
    pub temperature: f32,
    pub fallback_used: bool,
    /// Tier whose model was unset when a fallback substitution occurred.
    pub original_tier: Option<Tier>,
    pub reasoning: RoutingReasoning,
}
