//! Context relevance ranking and budget-constrained selection

use super::models::{ContextItem, InclusionMode, RankedContext};
use super::scorer::{score_item, ScoringContext};
use crate::tokens::approx_tokens;
use std::collections::HashSet;
use tracing::debug;

/// Drop later duplicates of items with identical identity fingerprints.
///
/// Applied before ranking; idempotent.
pub fn dedup_items(items: &[ContextItem]) -> Vec<ContextItem> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(items.len());
    for item in items {
        if seen.insert(item.dedup_fingerprint()) {
            unique.push(item.clone());
        }
    }
    if unique.len() < items.len() {
        debug!(
            dropped = items.len() - unique.len(),
            "deduplicated context items"
        );
    }
    unique
}

/// Score, sort and budget-filter context items.
///
/// The result is sorted descending by score and truncated so the cumulative
/// approximate token cost stays within `token_budget`. Never empty when at
/// least one non-excluded item exists and the budget is positive: a single
/// oversized top item is admitted rather than returning nothing.
pub fn rank(
    items: &[ContextItem],
    token_budget: usize,
    ctx: &ScoringContext<'_>,
) -> Vec<RankedContext> {
    if items.is_empty() || token_budget == 0 {
        return Vec::new();
    }

    let mut scored: Vec<RankedContext> = dedup_items(items)
        .into_iter()
        .filter(|item| item.metadata.inclusion != InclusionMode::Exclude)
        .map(|item| {
            let breakdown = score_item(&item, ctx);
            let token_cost = approx_tokens(item.effective_content());
            RankedContext {
                score: breakdown.total(),
                breakdown,
                token_cost,
                item,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.item.created_at.cmp(&a.item.created_at))
    });

    let mut selected = Vec::new();
    let mut used_tokens = 0usize;
    for ranked in scored {
        if used_tokens + ranked.token_cost > token_budget && !selected.is_empty() {
            break;
        }
        used_tokens += ranked.token_cost;
        selected.push(ranked);
        if used_tokens >= token_budget {
            break;
        }
    }

    debug!(
        selected = selected.len(),
        tokens = used_tokens,
        budget = token_budget,
        "ranked context items"
    );
    selected
}

/// Render a ranked selection into the block of text spliced into the prompt.
pub fn format_ranked(ranked: &[RankedContext]) -> String {
    let mut out = String::new();
    for entry in ranked {
        let header = match (&entry.item.metadata.command, &entry.item.metadata.path) {
            (Some(cmd), _) => match entry.item.metadata.exit_code {
                Some(code) if code != 0 => {
                    format!("[{} `{}` (exit {})]", entry.item.kind.label(), cmd, code)
                }
                _ => format!("[{} `{}`]", entry.item.kind.label(), cmd),
            },
            (None, Some(path)) => format!("[{} {}]", entry.item.kind.label(), path),
            (None, None) => format!("[{}]", entry.item.kind.label()),
        };
        out.push_str(&header);
        out.push('\n');
        out.push_str(entry.item.effective_content());
        out.push_str("\n\n");
    }
    out
}
