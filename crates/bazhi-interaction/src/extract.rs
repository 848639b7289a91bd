//! Tolerant parsing of the structured extraction call's output.
//!
//! Models wrap JSON in markdown fences or surround it with prose despite
//! instructions, so parsing strips fences, scans for the first balanced
//! object, and normalizes key spellings before validating.

use bazhi_core::elements::{Element, ElementCounts, ElementalProfile};
use bazhi_core::{GuruError, Result};
use serde_json::{Map, Value};

/// Structured fields recovered from the extraction call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementalExtraction {
    pub elements: ElementCounts,
    pub description_zh: String,
    pub description_en: String,
    pub summary_zh: String,
    pub summary_en: String,
}

impl ElementalExtraction {
    /// Combines the extraction with the full native analysis into a
    /// persistable profile. The English analysis arrives later through a
    /// separate merge update.
    pub fn into_profile(self, full_analysis_zh: impl Into<String>) -> ElementalProfile {
        ElementalProfile {
            elements: self.elements,
            description_zh: self.description_zh,
            description_en: self.description_en,
            summary_zh: self.summary_zh,
            summary_en: self.summary_en,
            full_analysis_zh: full_analysis_zh.into(),
            full_analysis_en: None,
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Parses the raw model output of the extraction call.
///
/// # Returns
/// * `Ok(ElementalExtraction)` - Counts summing to 8 plus the four text fields
/// * `Err(GuruError::Parse)` - If no object is found, the JSON is invalid,
///   a field is missing or malformed, or the counts do not sum to 8
pub fn parse_extraction(raw: &str) -> Result<ElementalExtraction> {
    let cleaned = strip_code_fences(raw);
    let object = first_balanced_object(cleaned)
        .ok_or_else(|| GuruError::parse("no JSON object found in extraction output"))?;

    let value: Value = serde_json::from_str(object)
        .map_err(|err| GuruError::parse(format!("extraction output is not valid JSON: {err}")))?;
    let map = value
        .as_object()
        .ok_or_else(|| GuruError::parse("extraction output is not a JSON object"))?;

    let elements_value = find_field(map, "elements")
        .ok_or_else(|| GuruError::parse("missing 'elements' in extraction output"))?;

    Ok(ElementalExtraction {
        elements: parse_counts(elements_value)?,
        description_zh: take_text(map, "description_zh")?,
        description_en: take_text(map, "description_en")?,
        summary_zh: take_text(map, "summary_zh")?,
        summary_en: take_text(map, "summary_en")?,
    })
}

fn strip_code_fences(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Returns the first balanced `{...}` substring, skipping braces inside
/// JSON string literals.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Key comparison ignoring case, underscores, hyphens and spaces, so
/// `description_zh`, `descriptionZh` and `Description-ZH` all match.
fn normalize_key(key: &str) -> String {
    key.trim()
        .chars()
        .filter(|ch| !matches!(ch, '_' | '-' | ' '))
        .flat_map(|ch| ch.to_lowercase())
        .collect()
}

fn find_field<'a>(map: &'a Map<String, Value>, wanted: &str) -> Option<&'a Value> {
    let wanted = normalize_key(wanted);
    map.iter()
        .find(|(key, _)| normalize_key(key) == wanted)
        .map(|(_, value)| value)
}

fn take_text(map: &Map<String, Value>, wanted: &str) -> Result<String> {
    let value = find_field(map, wanted)
        .ok_or_else(|| GuruError::parse(format!("missing '{wanted}' in extraction output")))?;
    let text = value
        .as_str()
        .ok_or_else(|| GuruError::parse(format!("field '{wanted}' is not a string")))?
        .trim();

    if text.is_empty() {
        return Err(GuruError::parse(format!("field '{wanted}' is empty")));
    }
    Ok(text.to_string())
}

fn parse_counts(value: &Value) -> Result<ElementCounts> {
    let map = value
        .as_object()
        .ok_or_else(|| GuruError::parse("'elements' is not an object"))?;

    let mut counts = ElementCounts::default();
    for (key, value) in map {
        let element = Element::from_alias(key)
            .ok_or_else(|| GuruError::parse(format!("unknown element '{key}' in extraction output")))?;
        let count = count_value(value)
            .ok_or_else(|| GuruError::parse(format!("element '{key}' has a non-numeric count")))?;
        counts.set(element, count);
    }

    counts.validate()?;
    Ok(counts)
}

// Models occasionally quote counts as strings.
fn count_value(value: &Value) -> Option<u8> {
    match value {
        Value::Number(number) => number.as_u64().and_then(|n| u8::try_from(n).ok()),
        Value::String(text) => text.trim().parse::<u8>().ok(),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
