//! Turns raw model replies into canonical [`AnalysisResult`]s.
//!
//! Backends answer with JSON, JSON wrapped in markdown fences, or (for the
//! smaller local models) loose prose. This parser never fails: strict JSON
//! is preferred, everything else goes through a line-oriented heuristic so
//! the user always gets something editable back.

use crate::model::{AnalysisResult, Keyword};
use log::warn;
use serde_json::{Map, Value};

/// Parse a raw response into an [`AnalysisResult`].
///
/// Always returns a success-status result at this layer; whether the HTTP
/// exchange itself failed is decided by the provider and retry client.
pub fn parse(raw: &str) -> AnalysisResult {
    let candidate = extract_fenced(raw).unwrap_or(raw);

    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(Value::Object(map)) => from_json_object(&map),
        _ => {
            warn!("response is not strict JSON, falling back to heuristic text parsing");
            parse_heuristic(raw)
        }
    }
}

/// Extract the content of a markdown code fence, if the reply contains one.
///
/// A ```json fence is always taken; a generic fence only when its content
/// looks like a JSON object.
fn extract_fenced(raw: &str) -> Option<&str> {
    let start = raw.find("```")?;
    let after = &raw[start + 3..];

    // The info string runs to the end of the opening fence line
    let (tag, body) = match after.find('\n') {
        Some(newline) => (after[..newline].trim(), &after[newline + 1..]),
        None => ("", after),
    };

    let end = body.find("```")?;
    let content = body[..end].trim();

    if tag.eq_ignore_ascii_case("json")
        || (content.starts_with('{') && content.ends_with('}'))
    {
        Some(content)
    } else {
        None
    }
}

fn from_json_object(map: &Map<String, Value>) -> AnalysisResult {
    let mut result = AnalysisResult::default();

    result.title = string_field(map, &["title"]);
    result.caption = string_field(map, &["caption"]);
    // Some models answer "description" where we ask for "headline"
    result.headline = string_field(map, &["headline", "description"]);
    result.instructions = string_field(map, &["instructions"]);
    result.location = string_field(map, &["location"]);
    result.copyright = string_field(map, &["copyright"]);

    result.keywords = match map.get("keywords") {
        Some(Value::String(s)) => split_keywords(s),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Keyword::new)
            .collect(),
        _ => Vec::new(),
    };

    result
}

/// First matching key wins; list values are flattened by joining their
/// string elements with single spaces.
fn string_field(map: &Map<String, Value>, keys: &[&str]) -> String {
    for key in keys {
        match map.get(*key) {
            Some(Value::String(s)) => return s.trim().to_string(),
            Some(Value::Array(items)) => {
                return items
                    .iter()
                    .filter_map(|item| item.as_str())
                    .map(str::trim)
                    .collect::<Vec<_>>()
                    .join(" ");
            }
            _ => {}
        }
    }
    String::new()
}

/// Split a comma-separated keyword string, preserving order.
///
/// Hierarchical entries ("Nature > Wildlife > Birds") stay single tokens;
/// expansion is the catalog writer's job.
fn split_keywords(raw: &str) -> Vec<Keyword> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Keyword::new)
        .collect()
}

/// Line-oriented fallback for replies that are not strict JSON.
fn parse_heuristic(raw: &str) -> AnalysisResult {
    let mut result = AnalysisResult::default();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("```") {
            continue;
        }

        if let Some((label, value)) = line.split_once(':') {
            let value = value.trim().trim_matches('"');
            let matched = match label.trim().to_lowercase().as_str() {
                "title" => assign_if_empty(&mut result.title, value),
                "caption" => assign_if_empty(&mut result.caption, value),
                "headline" | "description" => assign_if_empty(&mut result.headline, value),
                "instructions" => assign_if_empty(&mut result.instructions, value),
                "location" => assign_if_empty(&mut result.location, value),
                "keywords" | "tags" => {
                    if result.keywords.is_empty() {
                        result.keywords = split_keywords(value);
                    }
                    true
                }
                _ => false,
            };
            if matched {
                continue;
            }
        }

        // Unlabelled content: the first substantial line becomes the caption
        if result.caption.is_empty() && line.chars().count() > 10 {
            result.caption = line.to_string();
        }
    }

    if result.headline.is_empty() && !result.caption.is_empty() {
        result.headline = result.caption.clone();
    }

    // Last resort: derive a handful of candidate keywords from the raw text
    if result.keywords.is_empty() {
        result.keywords = derive_keywords(raw);
    }

    result
}

fn assign_if_empty(field: &mut String, value: &str) -> bool {
    if field.is_empty() && !value.is_empty() {
        *field = value.to_string();
    }
    true
}

const STOP_WORDS: &[&str] = &[
    "about", "after", "again", "also", "been", "before", "being", "between",
    "both", "could", "does", "down", "each", "from", "have", "here", "image",
    "into", "just", "like", "more", "most", "only", "other", "over", "photo",
    "photograph", "picture", "same", "should", "some", "such", "than", "that",
    "their", "them", "then", "there", "these", "they", "this", "through",
    "under", "very", "were", "what", "when", "where", "which", "while",
    "will", "with", "would", "your",
];

/// Derive up to five candidate keywords by stripping stop words and keeping
/// the longest remaining tokens. A last-resort heuristic, not a guarantee.
fn derive_keywords(raw: &str) -> Vec<Keyword> {
    let mut tokens: Vec<String> = Vec::new();
    for word in raw.split(|c: char| !c.is_alphanumeric()) {
        let token = word.to_lowercase();
        if token.len() < 4 || STOP_WORDS.contains(&token.as_str()) {
            continue;
        }
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }

    // Stable sort keeps first-occurrence order among equal lengths
    tokens.sort_by(|a, b| b.len().cmp(&a.len()));
    tokens.truncate(5);
    tokens.into_iter().map(Keyword::new).collect()
}
