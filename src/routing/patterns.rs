//! Query-type detection as an ordered predicate table
//!
//! Patterns are evaluated top to bottom and the first match wins, so new
//! query types slot in without restructuring control flow. Error evidence in
//! the context always wins first.

use super::models::QueryType;
use crate::ranking::ContextItem;

const DEBUG_KEYWORDS: &[&str] = &[
    "error", "fail", "fix", "bug", "broken", "crash", "panic", "exception", "stack trace",
    "doesn't work", "not working", "wrong",
];

const ANALYSIS_KEYWORDS: &[&str] = &[
    "analyze", "analyse", "compare", "architecture", "refactor", "optimize", "performance",
    "tradeoff", "trade-off", "review", "evaluate", "investigate",
];

const CODE_KEYWORDS: &[&str] = &[
    "write", "implement", "create a", "add a", "build", "generate", "function", "script",
    "refactor this",
];

const CREATIVE_KEYWORDS: &[&str] = &[
    "brainstorm", "idea", "name for", "design a", "suggest", "draft", "compose", "imagine",
];

const FACTUAL_OPENERS: &[&str] = &[
    "what is", "what's", "what are", "which", "when", "where", "who", "how many", "how much",
    "is there", "does ", "do ",
];

/// One row of the detection table
pub struct QueryPattern {
    pub query_type: QueryType,
    pub name: &'static str,
    matcher: fn(&str, &[ContextItem]) -> bool,
}

impl QueryPattern {
    pub fn matches(&self, prompt_lower: &str, items: &[ContextItem]) -> bool {
        (self.matcher)(prompt_lower, items)
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn is_debug(prompt: &str, items: &[ContextItem]) -> bool {
    items.iter().any(|i| i.metadata.is_error()) || contains_any(prompt, DEBUG_KEYWORDS)
}

fn is_analysis(prompt: &str, _items: &[ContextItem]) -> bool {
    contains_any(prompt, ANALYSIS_KEYWORDS)
}

fn is_code(prompt: &str, _items: &[ContextItem]) -> bool {
    contains_any(prompt, CODE_KEYWORDS)
}

fn is_creative(prompt: &str, _items: &[ContextItem]) -> bool {
    contains_any(prompt, CREATIVE_KEYWORDS)
}

fn is_factual(prompt: &str, _items: &[ContextItem]) -> bool {
    let short = prompt.split_whitespace().count() <= 8;
    short && FACTUAL_OPENERS.iter().any(|o| prompt.starts_with(o))
}

/// Detection order matters: error evidence first, factual last before the
/// explanation default.
pub const PATTERNS: &[QueryPattern] = &[
    QueryPattern {
        query_type: QueryType::Debug,
        name: "error-indicator",
        matcher: is_debug,
    },
    QueryPattern {
        query_type: QueryType::ComplexAnalysis,
        name: "complex-analysis",
        matcher: is_analysis,
    },
    QueryPattern {
        query_type: QueryType::CodeAuthoring,
        name: "code-authoring",
        matcher: is_code,
    },
    QueryPattern {
        query_type: QueryType::Creative,
        name: "creative",
        matcher: is_creative,
    },
    QueryPattern {
        query_type: QueryType::Factual,
        name: "short-factual",
        matcher: is_factual,
    },
];

/// Classify the query intent; defaults to explanation when nothing matches.
pub fn detect_query_type(prompt: &str, items: &[ContextItem]) -> QueryType {
    let prompt_lower = prompt.to_lowercase();
    PATTERNS
        .iter()
        .find(|p| p.matches(&prompt_lower, items))
        .map(|p| p.query_type)
        .unwrap_or(QueryType::Explanation)
}

/// Whether the prompt itself carries error vocabulary.
pub fn prompt_mentions_error(prompt_lower: &str) -> bool {
    contains_any(prompt_lower, DEBUG_KEYWORDS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::ContextItemKind;

    #[test]
    fn test_nonzero_exit_code_wins_first() {
        let mut item = ContextItem::new(ContextItemKind::CommandOutput, "output");
        item.metadata.exit_code = Some(1);
        // Prompt looks like code authoring, but the error evidence wins
        assert_eq!(
            detect_query_type("write a function for me", &[item]),
            QueryType::Debug
        );
    }

    #[test]
    fn test_debug_keywords() {
        assert_eq!(
            detect_query_type("why did npm install fail?", &[]),
            QueryType::Debug
        );
        assert_eq!(
            detect_query_type("this doesn't work at all", &[]),
            QueryType::Debug
        );
    }

    #[test]
    fn test_analysis_before_code() {
        assert_eq!(
            detect_query_type("compare these two approaches and write a summary", &[]),
            QueryType::ComplexAnalysis
        );
    }

    #[test]
    fn test_code_authoring() {
        assert_eq!(
            detect_query_type("implement a parser for this format", &[]),
            QueryType::CodeAuthoring
        );
    }

    #[test]
    fn test_creative() {
        assert_eq!(
            detect_query_type("brainstorm some options with me", &[]),
            QueryType::Creative
        );
    }

    #[test]
    fn test_short_factual() {
        assert_eq!(
            detect_query_type("what is the current branch?", &[]),
            QueryType::Factual
        );
        // Too long for short-factual
        assert_eq!(
            detect_query_type(
                "what is the best way to structure this whole module given the constraints",
                &[]
            ),
            QueryType::Explanation
        );
    }

    #[test]
    fn test_explanation_default() {
        assert_eq!(
            detect_query_type("tell me more about the setup", &[]),
            QueryType::Explanation
        );
    }
}
