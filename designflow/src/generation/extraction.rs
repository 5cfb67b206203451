//! Ordered fallback extraction of structured payloads from generated text.
//!
//! Strategies are tried in a fixed order until one yields a usable payload:
//!
//! 1. the whole response parsed as JSON
//! 2. the contents of a markdown code block
//! 3. the first balanced `{...}` or `[...]` segment
//! 4. line splitting (bullets and numbered lists), lists only
//! 5. the raw text wrapped as a single item, lists only

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;

use crate::errors::ParseFailure;

/// The strategy that recovered a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// The response was valid JSON as-is.
    DirectJson,
    /// JSON found inside a markdown code block.
    CodeBlock,
    /// JSON found by delimiter matching.
    BalancedDelimiters,
    /// Items split from list-formatted lines.
    LineSplit,
    /// The whole response wrapped as one item.
    RawText,
}

impl ExtractionStrategy {
    /// Returns true for strategies that did not find real JSON.
    #[must_use]
    pub const fn is_heuristic(self) -> bool {
        matches!(self, Self::LineSplit | Self::RawText)
    }
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DirectJson => "direct_json",
            Self::CodeBlock => "code_block",
            Self::BalancedDelimiters => "balanced_delimiters",
            Self::LineSplit => "line_split",
            Self::RawText => "raw_text",
        };
        f.write_str(name)
    }
}

/// A payload together with the strategy that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    /// The recovered payload.
    pub value: T,
    /// How it was recovered.
    pub strategy: ExtractionStrategy,
}

impl<T> Parsed<T> {
    /// Creates a parsed payload.
    pub const fn new(value: T, strategy: ExtractionStrategy) -> Self {
        Self { value, strategy }
    }

    /// Maps the payload, keeping the strategy.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Parsed<U> {
        Parsed {
            value: f(self.value),
            strategy: self.strategy,
        }
    }
}

fn code_block_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").ok())
        .as_ref()
}

fn list_marker_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\s*(?:[-*+•]\s+|\d+[.)]\s+|\(\d+\)\s+)").ok())
        .as_ref()
}

/// Extracts a JSON value using the JSON strategies only.
pub fn extract_json_value(text: &str) -> Result<Parsed<Value>, ParseFailure> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseFailure::Empty);
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(Parsed::new(value, ExtractionStrategy::DirectJson));
    }

    if let Some(pattern) = code_block_pattern() {
        for captures in pattern.captures_iter(trimmed) {
            let Some(body) = captures.get(1) else { continue };
            let body = body.as_str().trim();
            if let Ok(value) = serde_json::from_str::<Value>(body) {
                return Ok(Parsed::new(value, ExtractionStrategy::CodeBlock));
            }
            if let Some(value) = first_balanced_json(body) {
                return Ok(Parsed::new(value, ExtractionStrategy::CodeBlock));
            }
        }
    }

    first_balanced_json(trimmed)
        .map(|value| Parsed::new(value, ExtractionStrategy::BalancedDelimiters))
        .ok_or_else(|| ParseFailure::no_content(trimmed))
}

/// Extracts a list of strings using every strategy in order.
///
/// JSON arrays of strings or of objects with a `name`/`title`/`concept`
/// field are accepted, as are objects wrapping such an array.
pub fn extract_string_list(text: &str) -> Result<Parsed<Vec<String>>, ParseFailure> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseFailure::Empty);
    }

    if let Ok(parsed) = extract_json_value(trimmed) {
        if let Some(items) = strings_from_value(&parsed.value) {
            if !items.is_empty() {
                return Ok(Parsed::new(items, parsed.strategy));
            }
        }
    }

    let lines = split_list_lines(trimmed);
    if lines.len() >= 2 {
        return Ok(Parsed::new(lines, ExtractionStrategy::LineSplit));
    }

    Ok(Parsed::new(vec![trimmed.to_string()], ExtractionStrategy::RawText))
}

fn strings_from_value(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(items.iter().filter_map(item_text).collect()),
        Value::Object(map) => ["concepts", "designs", "ideas", "items", "results"]
            .iter()
            .find_map(|key| map.get(*key))
            .and_then(strings_from_value),
        _ => None,
    }
}

fn item_text(item: &Value) -> Option<String> {
    let text = match item {
        Value::String(s) => s.trim().to_string(),
        Value::Object(map) => {
            let field = |keys: &[&str]| {
                keys.iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_str))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
            };
            match (field(&["concept", "name", "title"]), field(&["description", "summary"])) {
                (Some(name), Some(description)) => format!("{name}: {description}"),
                (Some(name), None) => name.to_string(),
                (None, Some(description)) => description.to_string(),
                (None, None) => return None,
            }
        }
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn split_list_lines(text: &str) -> Vec<String> {
    let marked: Vec<String> = text
        .lines()
        .filter_map(|line| {
            let pattern = list_marker_pattern()?;
            let found = pattern.find(line)?;
            let item = line[found.end()..].trim().trim_matches('*').trim();
            (!item.is_empty()).then(|| item.to_string())
        })
        .collect();
    if marked.len() >= 2 {
        return marked;
    }

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.ends_with(':') && !line.starts_with("```"))
        .map(ToString::to_string)
        .collect()
}

fn first_balanced_json(text: &str) -> Option<Value> {
    text.char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
        .filter_map(|(start, _)| balanced_end(text, start).map(|end| &text[start..end]))
        .find_map(|segment| serde_json::from_str::<Value>(segment).ok())
}

/// Returns the byte index just past the delimiter closing the one at `start`.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(start + offset + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}
