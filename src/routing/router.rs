//! Query complexity routing
//!
//! Classifies a prompt into a tier, picks the model for that tier through a
//! downward fallback chain, and derives context budget and temperature. All
//! inputs have safe defaults; classification never fails.

use super::models::{RoutingDecision, RoutingReasoning, ScoreFactors, Tier};
use super::patterns::{detect_query_type, prompt_mentions_error};
use crate::config::Config;
use crate::ranking::{ContextItem, ContextItemKind};
use tracing::debug;

/// Distance from a tier boundary at which the alternative tier is noted.
const BOUNDARY_MARGIN: u32 = 5;

/// Word-count contribution.
fn length_factor(prompt: &str) -> u32 {
    match prompt.split_whitespace().count() {
        0..=5 => 5,
        6..=15 => 10,
        16..=30 => 15,
        _ => 20,
    }
}

/// Context-shape contribution, capped at 25.
fn context_factor(items: &[ContextItem]) -> u32 {
    let mut score = ((items.len() as u32) * 3).min(10);
    if items.iter().any(|i| i.kind == ContextItemKind::File) {
        score += 5;
    }
    if items.iter().any(|i| i.metadata.is_error()) {
        score += 10;
    }
    if items.iter().any(|i| i.content.chars().count() > 5_000) {
        score += 5;
    }
    score.min(25)
}

/// Error-presence contribution: hard evidence in the context outweighs
/// error vocabulary in the prompt.
fn error_factor(prompt_lower: &str, items: &[ContextItem]) -> u32 {
    if items.iter().any(|i| i.metadata.is_error()) {
        25
    } else if prompt_mentions_error(prompt_lower) {
        15
    } else {
        0
    }
}

/// Map a complexity score to its tier.
pub fn tier_for_score(score: u32) -> Tier {
    match score {
        0..=35 => Tier::Simple,
        36..=69 => Tier::Moderate,
        _ => Tier::Complex,
    }
}

fn alternative_note(score: u32, tier: Tier) -> Option<String> {
    let near = |boundary: u32| {
        score.abs_diff(boundary) <= BOUNDARY_MARGIN || score.abs_diff(boundary + 1) <= BOUNDARY_MARGIN
    };
    let alternative = match tier {
        Tier::Simple if near(35) => Some(Tier::Moderate),
        Tier::Moderate if score <= 35 + BOUNDARY_MARGIN + 1 => Some(Tier::Simple),
        Tier::Moderate if near(69) => Some(Tier::Complex),
        Tier::Complex if near(69) => Some(Tier::Moderate),
        _ => None,
    }?;
    Some(format!(
        "score {} is within {} points of the {} boundary; {} was considered",
        score,
        BOUNDARY_MARGIN,
        alternative.as_str(),
        alternative.as_str()
    ))
}

/// Resolve the model for a tier, walking the chain downward and ending at
/// the main model. Returns the model plus the tier a substitution happened
/// from, if any.
fn resolve_model(tier: Tier, config: &Config) -> (String, bool, Option<Tier>) {
    let routing = &config.routing;
    let chain: &[(Tier, &Option<String>)] = match tier {
        Tier::Complex => &[
            (Tier::Complex, &routing.complex_model),
            (Tier::Moderate, &routing.moderate_model),
            (Tier::Simple, &routing.simple_model),
        ],
        Tier::Moderate => &[
            (Tier::Moderate, &routing.moderate_model),
            (Tier::Simple, &routing.simple_model),
        ],
        Tier::Simple => &[(Tier::Simple, &routing.simple_model)],
    };

    for (link_tier, model) in chain {
        if let Some(model) = model {
            let fallback = *link_tier != tier;
            return (model.clone(), fallback, fallback.then_some(tier));
        }
    }
    (routing.main_model.clone(), true, Some(tier))
}

/// Context token budget for a tier: explicit configuration wins, otherwise
/// the mode default scaled by the tier multiplier.
fn resolve_budget(tier: Tier, config: &Config) -> usize {
    let configured = match tier {
        Tier::Simple => config.routing.simple_budget,
        Tier::Moderate => config.routing.moderate_budget,
        Tier::Complex => config.routing.complex_budget,
    };
    configured.unwrap_or_else(|| {
        (config.default_budget() as f32 * tier.budget_multiplier()) as usize
    })
}

/// Classify a prompt and pick model, budget and temperature.
///
/// With auto-routing disabled this short-circuits to the main model with the
/// mode default budget and no classification.
pub fn classify(prompt: &str, items: &[ContextItem], config: &Config) -> RoutingDecision {
    if !config.routing.auto_route {
        return RoutingDecision {
            tier: Tier::Moderate,
            complexity: Tier::Moderate.level(),
            model: config.routing.main_model.clone(),
            context_budget: config.default_budget(),
            temperature: 0.6,
            fallback_used: false,
            original_tier: None,
            reasoning: RoutingReasoning {
                query_type: super::models::QueryType::Explanation,
                raw_score: 0,
                factors: ScoreFactors::default(),
                alternative_note: Some("auto-routing disabled".to_string()),
            },
        };
    }

    let prompt_lower = prompt.to_lowercase();
    let query_type = detect_query_type(prompt, items);

    let factors = ScoreFactors {
        length: length_factor(prompt),
        context: context_factor(items),
        keyword: query_type.keyword_factor(),
        error: error_factor(&prompt_lower, items),
    };
    let score = factors.total();
    let tier = tier_for_score(score);
    let (model, fallback_used, original_tier) = resolve_model(tier, config);

    debug!(
        query_type = query_type.as_str(),
        score,
        tier = tier.as_str(),
        %model,
        fallback_used,
        "classified query"
    );

    RoutingDecision {
        tier,
        complexity: tier.level(),
        model,
        context_budget: resolve_budget(tier, config),
        temperature: query_type.temperature(),
        fallback_used,
        original_tier,
        reasoning: RoutingReasoning {
            query_type,
            raw_score: score,
            factors,
            alternative_note: alternative_note(score, tier),
        },
    }
}
