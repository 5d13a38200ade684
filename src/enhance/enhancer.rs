//! Prompt enhancement for vague or underspecified queries
//!
//! Specific-prompt exclusions run first; a prompt that already names code,
//! files, or errors is left alone. Enhancement is never destructive: the
//! original text is always preserved alongside the rewritten form.

use crate::ranking::{ContextItem, ContextItemKind};
use serde::{Deserialize, Serialize};

const VAGUE_PHRASES: &[&str] = &[
    "fix this",
    "fix it",
    "what's wrong",
    "whats wrong",
    "what is wrong",
    "why doesn't this work",
    "why doesnt this work",
    "why isn't this working",
    "why isnt this working",
    "this is broken",
    "debug this",
    "what happened",
];

const MISSING_REFERENT_PHRASES: &[&str] = &[
    "explain this",
    "explain that",
    "run this",
    "run that",
    "what does this do",
    "what does that do",
    "summarize this",
];

/// Result of an enhancement attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enhancement {
    pub original: String,
    pub enhanced: String,
    pub was_enhanced: bool,
    pub reason: Option<String>,
    /// Which pattern family fired.
    pub pattern: Option<String>,
}

impl Enhancement {
    fn unchanged(prompt: &str, reason: Option<&str>) -> Self {
        Self {
            original: prompt.to_string(),
            enhanced: prompt.to_string(),
            was_enhanced: false,
            reason: reason.map(str::to_string),
            pattern: None,
        }
    }
}

/// A prompt that already carries code, a file/line reference, or explicit
/// error text needs no help.
fn is_already_specific(prompt: &str) -> bool {
    if prompt.contains("```") || prompt.contains('`') {
        return true;
    }
    if has_file_line_reference(prompt) {
        return true;
    }
    let lower = prompt.to_lowercase();
    lower.contains("error:") || lower.contains("err!") || lower.contains("panicked at")
}

/// Detects tokens shaped like `name.ext:123` or explicit paths.
fn has_file_line_reference(prompt: &str) -> bool {
    prompt.split_whitespace().any(|word| {
        let word = word.trim_matches(|c: char| c == ',' || c == ')' || c == '(');
        if word.contains('/') && word.len() > 3 {
            return true;
        }
        match word.split_once(':') {
            Some((file, line)) => {
                file.contains('.') && !line.is_empty() && line.chars().all(|c| c.is_ascii_digit())
            }
            None => false,
        }
    })
}

/// Pick the context item a vague reference most plausibly points at:
/// error-bearing output first, then any file, then any output, then the
/// most recent capture.
fn most_relevant_item(items: &[ContextItem]) -> Option<&ContextItem> {
    items
        .iter()
        .find(|i| i.kind == ContextItemKind::CommandOutput && i.metadata.is_error())
        .or_else(|| items.iter().find(|i| i.kind == ContextItemKind::File))
        .or_else(|| items.iter().find(|i| i.kind == ContextItemKind::CommandOutput))
        .or_else(|| items.iter().max_by_key(|i| i.created_at))
}

/// Short human-readable label for an item.
fn item_label(item: &ContextItem) -> String {
    match (&item.metadata.command, &item.metadata.path) {
        (Some(cmd), _) => match item.metadata.exit_code {
            Some(code) if code != 0 => format!("the command `{}` which exited with code {}", cmd, code),
            _ => format!("the command `{}`", cmd),
        },
        (None, Some(path)) => format!("the file {}", path),
        (None, None) => format!("the most recent {}", item.kind.label()),
    }
}

/// Rewrite vague prompts using the available context.
pub fn enhance(prompt: &str, items: &[ContextItem]) -> Enhancement {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Enhancement::unchanged(prompt, Some("empty prompt"));
    }
    if is_already_specific(trimmed) {
        return Enhancement::unchanged(prompt, Some("prompt is already specific"));
    }

    let lower = trimmed.to_lowercase();

    if VAGUE_PHRASES.iter().any(|p| lower.contains(p)) {
        let Some(item) = most_relevant_item(items) else {
            return Enhancement::unchanged(prompt, Some("no context available to reference"));
        };
        return Enhancement {
            original: prompt.to_string(),
            enhanced: format!("{} (referring to {})", trimmed, item_label(item)),
            was_enhanced: true,
            reason: Some("vague reference resolved against context".to_string()),
            pattern: Some("vague_reference".to_string()),
        };
    }

    if MISSING_REFERENT_PHRASES.iter().any(|p| lower.contains(p)) {
        if items.is_empty() {
            return Enhancement::unchanged(prompt, Some("no context available to reference"));
        }
        let labels: Vec<String> = items.iter().take(3).map(item_label).collect();
        return Enhancement {
            original: prompt.to_string(),
            enhanced: format!("{} (available context: {})", trimmed, labels.join("; ")),
            was_enhanced: true,
            reason: Some("ambiguous referent, listed available context".to_string()),
            pattern: Some("missing_context".to_string()),
        };
    }

    Enhancement::unchanged(prompt, None)
}
