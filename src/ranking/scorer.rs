//! Relevance scoring factors
//!
//! Each factor is a pure function contributing one field of the
//! [`ScoreBreakdown`]; the ranker sums and clamps them. Missing or unknown
//! metadata contributes zero to the factor that would have used it.

use super::models::{ContextItem, ContextItemKind, InclusionMode, ScoreBreakdown};
use crate::config::{RankingConfig, SessionMode};
use crate::history::{ChatMessage, Role};
use chrono::{DateTime, Utc};

/// Words too common to carry query intent.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "this", "that", "what", "when", "where", "which", "why", "how",
    "can", "could", "should", "would", "will", "you", "your", "was", "were", "are", "does", "did",
    "don", "doesn", "not", "but", "has", "have", "had", "its", "about", "into", "from", "out",
    "there", "their", "them", "then", "than", "please", "just", "like", "some", "any", "all",
];

const MAX_QUERY_TERMS: usize = 10;

/// Inputs shared by every item scored in one request
pub struct ScoringContext<'a> {
    pub query: &'a str,
    pub query_terms: Vec<String>,
    pub conversation_terms: Vec<String>,
    pub recent_messages: &'a [ChatMessage],
    pub mode: SessionMode,
    pub now: DateTime<Utc>,
    pub config: &'a RankingConfig,
}

impl<'a> ScoringContext<'a> {
    pub fn new(
        query: &'a str,
        recent_messages: &'a [ChatMessage],
        mode: SessionMode,
        config: &'a RankingConfig,
    ) -> Self {
        Self {
            query,
            query_terms: extract_terms(query),
            conversation_terms: conversation_terms(recent_messages),
            recent_messages,
            mode,
            now: Utc::now(),
            config,
        }
    }
}

/// Extract significant query terms: lowercased, short and stop words
/// removed, capped at [`MAX_QUERY_TERMS`].
pub fn extract_terms(query: &str) -> Vec<String> {
    let mut terms = Vec::new();
    for word in query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_' && c != '.' && c != '/')
    {
        let word = word.trim_matches('.');
        if word.len() > 2 && !STOP_WORDS.contains(&word) && !terms.iter().any(|t| t == word) {
            terms.push(word.to_string());
            if terms.len() >= MAX_QUERY_TERMS {
                break;
            }
        }
    }
    terms
}

/// Terms from the last three user turns, for conversation-topic relevance.
fn conversation_terms(messages: &[ChatMessage]) -> Vec<String> {
    let mut terms = Vec::new();
    for msg in messages.iter().rev().filter(|m| m.role == Role::User).take(3) {
        for term in extract_terms(&msg.content) {
            if !terms.iter().any(|t| *t == term) {
                terms.push(term);
            }
            if terms.len() >= MAX_QUERY_TERMS {
                return terms;
            }
        }
    }
    terms
}

/// Positive recency component, bucketed into five age bands.
pub fn recency_score(age_minutes: i64) -> f32 {
    match age_minutes {
        m if m < 5 => 25.0,
        m if m < 30 => 18.0,
        m if m < 60 => 12.0,
        m if m < 180 => 6.0,
        _ => 0.0,
    }
}

/// Negative decay for stale items, plus a size penalty for very large
/// content that would crowd out fresher material.
pub fn decay_penalty(age_minutes: i64, content_chars: usize) -> f32 {
    let age_penalty = match age_minutes {
        m if m < 5 => 0.0,
        m if m < 30 => -4.0,
        m if m < 60 => -10.0,
        m if m < 180 => -17.0,
        _ => -25.0,
    };
    let size_penalty = if content_chars > 10_000 {
        -10.0
    } else if content_chars > 5_000 {
        -5.0
    } else {
        0.0
    };
    age_penalty + size_penalty
}

/// Penalty for material already consumed by prior turns, by recency of use
/// and cumulative use count.
pub fn usage_penalty(item: &ContextItem, now: DateTime<Utc>) -> f32 {
    let mut penalty = 0.0;
    if let Some(used_at) = item.last_used_at {
        let minutes = (now - used_at).num_minutes();
        penalty += match minutes {
            m if m < 2 => -30.0,
            m if m < 5 => -20.0,
            m if m < 10 => -10.0,
            m if m < 15 => -5.0,
            _ => 0.0,
        };
    }
    penalty += if item.usage_count > 5 {
        -15.0
    } else if item.usage_count > 3 {
        -10.0
    } else if item.usage_count > 1 {
        -5.0
    } else {
        0.0
    };
    penalty
}

/// Conversation-memory penalty: material delivered in a recent turn is
/// likely still in the model's recall, scaled by how many turns ago it was
/// sent. A strong query match for the same item softens the penalty, since
/// the user is explicitly asking about that material again.
pub fn memory_penalty(
    item: &ContextItem,
    ctx: &ScoringContext<'_>,
    query_match_score: f32,
) -> f32 {
    let Some(used_in) = &item.last_used_in_message_id else {
        return 0.0;
    };
    let Some(position) = ctx
        .recent_messages
        .iter()
        .position(|m| &m.id == used_in)
    else {
        return 0.0;
    };

    let turns_ago = ctx.recent_messages.len() - 1 - position;
    let mut penalty = -(50.0 - 4.5 * turns_ago as f32).max(5.0);

    if query_match_score > ctx.config.memory_override_threshold {
        penalty *= ctx.config.memory_override_factor;
    }
    if ctx.mode == SessionMode::Chat {
        // Front-loading mode repeats context more freely.
        penalty *= 0.8;
    }
    penalty
}

/// Keyword-driven boost for item kinds matching the query's intent, plus an
/// unconditional boost for error-bearing content.
pub fn type_relevance(item: &ContextItem, query_lower: &str) -> f32 {
    let mut score = 0.0;

    let error_intent = ["error", "fail", "fix"]
        .iter()
        .any(|w| query_lower.contains(w));
    let output_kind = matches!(
        item.kind,
        ContextItemKind::CommandOutput | ContextItemKind::Selection
    );
    if error_intent && output_kind && item.metadata.is_error() {
        score += 20.0;
    }
    if (query_lower.contains("file") || query_lower.contains("code"))
        && item.kind == ContextItemKind::File
    {
        score += 15.0;
    }
    if (query_lower.contains("command") || query_lower.contains("ran"))
        && item.kind == ContextItemKind::Command
    {
        score += 15.0;
    }

    let content_lower = item.effective_content().to_lowercase();
    if content_lower.contains("error") || content_lower.contains("fail") {
        score += 10.0;
    }
    score
}

/// Per-term matching against content, command and path fields with a
/// multi-term bonus.
pub fn query_match(item: &ContextItem, terms: &[String]) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let content_lower = item.effective_content().to_lowercase();
    let command_lower = item.metadata.command.as_deref().map(str::to_lowercase);
    let path_lower = item.metadata.path.as_deref().map(str::to_lowercase);

    let mut score = 0.0;
    let mut matched_terms = 0usize;
    for term in terms {
        let mut hit = false;
        if content_lower.contains(term.as_str()) {
            score += 12.0;
            hit = true;
        }
        if command_lower.as_deref().is_some_and(|c| c.contains(term.as_str())) {
            score += 18.0;
            hit = true;
        }
        if path_lower.as_deref().is_some_and(|p| p.contains(term.as_str())) {
            score += 12.0;
            hit = true;
        }
        if hit {
            matched_terms += 1;
        }
    }
    if matched_terms > 1 {
        score += matched_terms as f32 * 8.0;
    }
    score
}

/// Smaller boost for terms the conversation has been circling around.
pub fn conversation_match(item: &ContextItem, terms: &[String]) -> f32 {
    let content_lower = item.effective_content().to_lowercase();
    let command_lower = item.metadata.command.as_deref().map(str::to_lowercase);

    let mut score = 0.0;
    for term in terms {
        if content_lower.contains(term.as_str()) {
            score += 10.0;
        }
        if command_lower.as_deref().is_some_and(|c| c.contains(term.as_str())) {
            score += 15.0;
        }
    }
    score
}

/// Mode-dependent adjustment: chat front-loads recent material, agent only
/// boosts strong matches (it can re-fetch everything else via tools).
pub fn mode_bonus(
    mode: SessionMode,
    age_minutes: i64,
    query_match_score: f32,
) -> f32 {
    match mode {
        SessionMode::Chat if age_minutes < 30 => 8.0,
        SessionMode::Agent if query_match_score >= 24.0 => 10.0,
        _ => 0.0,
    }
}

/// Score one item against the request's scoring context.
pub fn score_item(item: &ContextItem, ctx: &ScoringContext<'_>) -> ScoreBreakdown {
    let age_minutes = (ctx.now - item.created_at).num_minutes();
    let query_lower = ctx.query.to_lowercase();

    let qm = query_match(item, &ctx.query_terms);
    let mut breakdown = ScoreBreakdown {
        recency: recency_score(age_minutes),
        time_decay: decay_penalty(age_minutes, item.effective_content().chars().count()),
        usage_penalty: usage_penalty(item, ctx.now),
        memory_penalty: memory_penalty(item, ctx, qm),
        type_relevance: type_relevance(item, &query_lower),
        query_match: qm,
        conversation_match: conversation_match(item, &ctx.conversation_terms),
        mode_bonus: mode_bonus(ctx.mode, age_minutes, qm),
        pin_bonus: 0.0,
    };
    if item.metadata.inclusion == InclusionMode::Always {
        breakdown.pin_bonus = 50.0;
    }
    breakdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::models::ItemMetadata;
    use chrono::Duration;

    fn item(kind: ContextItemKind, content: &str) -> ContextItem {
        ContextItem::new(kind, content)
    }

    #[test]
    fn test_extract_terms_filters_stop_words() {
        let terms = extract_terms("Why did the npm install fail with this error?");
        assert!(terms.contains(&"npm".to_string()));
        assert!(terms.contains(&"install".to_string()));
        assert!(terms.contains(&"fail".to_string()));
        assert!(!terms.contains(&"the".to_string()));
        assert!(!terms.contains(&"why".to_string()));
    }

    #[test]
    fn test_extract_terms_capped_and_deduped() {
        let terms = extract_terms(
            "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu alpha",
        );
        assert_eq!(terms.len(), 10);
        assert_eq!(terms.iter().filter(|t| *t == "alpha").count(), 1);
    }

    #[test]
    fn test_recency_bands() {
        assert_eq!(recency_score(0), 25.0);
        assert_eq!(recency_score(10), 18.0);
        assert_eq!(recency_score(45), 12.0);
        assert_eq!(recency_score(120), 6.0);
        assert_eq!(recency_score(400), 0.0);
    }

    #[test]
    fn test_decay_and_size_penalty() {
        assert_eq!(decay_penalty(0, 100), 0.0);
        assert_eq!(decay_penalty(400, 100), -25.0);
        assert_eq!(decay_penalty(0, 6_000), -5.0);
        assert_eq!(decay_penalty(0, 11_000), -10.0);
    }

    #[test]
    fn test_usage_penalty_tapers() {
        let now = Utc::now();
        let mut it = item(ContextItemKind::Command, "ls");
        it.last_used_at = Some(now - Duration::seconds(30));
        assert_eq!(usage_penalty(&it, now), -30.0);
        it.last_used_at = Some(now - Duration::minutes(12));
        assert_eq!(usage_penalty(&it, now), -5.0);
        it.last_used_at = Some(now - Duration::minutes(20));
        assert_eq!(usage_penalty(&it, now), 0.0);
    }

    #[test]
    fn test_usage_count_penalty() {
        let now = Utc::now();
        let mut it = item(ContextItemKind::Command, "ls");
        it.usage_count = 2;
        assert_eq!(usage_penalty(&it, now), -5.0);
        it.usage_count = 4;
        assert_eq!(usage_penalty(&it, now), -10.0);
        it.usage_count = 6;
        assert_eq!(usage_penalty(&it, now), -15.0);
    }

    #[test]
    fn test_query_match_field_weights() {
        let mut it = item(ContextItemKind::Command, "npm output here");
        it.metadata.command = Some("npm install".to_string());
        let terms = vec!["npm".to_string()];
        // content +12, command +18, single term so no multi bonus
        assert_eq!(query_match(&it, &terms), 30.0);
    }

    #[test]
    fn test_query_match_multi_term_bonus() {
        let it = item(ContextItemKind::CommandOutput, "npm install failed");
        let terms = vec!["npm".to_string(), "install".to_string()];
        // 2 x content (+12) + 2 terms x 8 bonus
        assert_eq!(query_match(&it, &terms), 40.0);
    }

    #[test]
    fn test_type_relevance_error_boost() {
        let mut it = item(ContextItemKind::CommandOutput, "npm ERR! code ENOENT");
        it.metadata.exit_code = Some(1);
        // error-intent query + error-flagged output (+20) + "error"-ish content...
        // content has "err" but not "error"/"fail"; only the kind boost applies
        assert_eq!(type_relevance(&it, "why did this fail"), 20.0);

        let file = item(ContextItemKind::File, "fn main() {}");
        assert_eq!(type_relevance(&file, "show me the file"), 15.0);
    }

    #[test]
    fn test_memory_penalty_and_override() {
        let config = RankingConfig::default();
        let messages: Vec<ChatMessage> = (0..4)
            .map(|i| ChatMessage::user(format!("turn {}", i)))
            .collect();
        let last_id = messages.last().unwrap().id.clone();

        let mut it = item(ContextItemKind::CommandOutput, "output");
        it.last_used_in_message_id = Some(last_id);

        let ctx = ScoringContext {
            query: "unrelated",
            query_terms: vec![],
            conversation_terms: vec![],
            recent_messages: &messages,
            mode: SessionMode::Agent,
            now: Utc::now(),
            config: &config,
        };
        // Just sent: full -50 in agent mode
        assert_eq!(memory_penalty(&it, &ctx, 0.0), -50.0);
        // Strong query match halves it
        assert_eq!(memory_penalty(&it, &ctx, 40.0), -25.0);
    }

    #[test]
    fn test_memory_penalty_floors_at_five() {
        let config = RankingConfig::default();
        let mut messages: Vec<ChatMessage> =
            (0..15).map(|i| ChatMessage::user(format!("turn {}", i))).collect();
        let first_id = messages.first().unwrap().id.clone();
        let mut it = item(ContextItemKind::CommandOutput, "output");
        it.last_used_in_message_id = Some(first_id);
        messages.push(ChatMessage::user("latest".to_string()));

        let ctx = ScoringContext {
            query: "unrelated",
            query_terms: vec![],
            conversation_terms: vec![],
            recent_messages: &messages,
            mode: SessionMode::Agent,
            now: Utc::now(),
            config: &config,
        };
        assert_eq!(memory_penalty(&it, &ctx, 0.0), -5.0);
    }

    #[test]
    fn test_memory_penalty_softened_in_chat_mode() {
        let config = RankingConfig::default();
        let messages = vec![ChatMessage::user("turn".to_string())];
        let mut it = item(ContextItemKind::CommandOutput, "output");
        it.last_used_in_message_id = Some(messages[0].id.clone());

        let ctx = ScoringContext {
            query: "unrelated",
            query_terms: vec![],
            conversation_terms: vec![],
            recent_messages: &messages,
            mode: SessionMode::Chat,
            now: Utc::now(),
            config: &config,
        };
        assert_eq!(memory_penalty(&it, &ctx, 0.0), -40.0);
    }

    #[test]
    fn test_unknown_metadata_scores_zero() {
        let config = RankingConfig::default();
        let messages = vec![];
        let ctx = ScoringContext::new("anything at all", &messages, SessionMode::Agent, &config);
        let it = item(ContextItemKind::Selection, "");
        let breakdown = score_item(&it, &ctx);
        assert_eq!(breakdown.query_match, 0.0);
        assert_eq!(breakdown.memory_penalty, 0.0);
        assert_eq!(breakdown.usage_penalty, 0.0);
    }

    #[test]
    fn test_pinned_item_bonus() {
        let config = RankingConfig::default();
        let messages = vec![];
        let ctx = ScoringContext::new("query", &messages, SessionMode::Chat, &config);
        let mut it = item(ContextItemKind::File, "pinned content");
        it.metadata.inclusion = InclusionMode::Always;
        let breakdown = score_item(&it, &ctx);
        assert_eq!(breakdown.pin_bonus, 50.0);
    }

    #[test]
    fn test_metadata_default_inclusion_is_smart() {
        assert_eq!(ItemMetadata::default().inclusion, InclusionMode::Smart);
    }
}
