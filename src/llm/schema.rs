use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Result, RevosError};

/// Type a model answer is parsed into. The schema is supplied by the
/// implementor and sent to the model verbatim.
pub trait ExtractionTarget: DeserializeOwned {
    /// JSON schema describing the expected object.
    fn schema() -> Value;

    fn name() -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

/// Instructions asking the model for a JSON object matching `T::schema()`.
pub fn format_instructions<T: ExtractionTarget>() -> String {
    let schema = T::schema();
    let rendered = serde_json::to_string_pretty(&schema).unwrap_or_else(|_| schema.to_string());
    format!(
        "Respond with a single JSON object describing a {} that conforms to this JSON schema. \
         Do not add any text outside the JSON object.\n```json\n{rendered}\n```",
        T::name()
    )
}

/// Parse a model answer into `T`.
///
/// Tried in order: the whole text, the first ``` fenced block, the first
/// balanced `{...}` object.
pub fn parse_output<T: ExtractionTarget>(text: &str) -> Result<T> {
    let trimmed = text.trim();
    let first_error = match serde_json::from_str::<T>(trimmed) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let candidates = [fenced_block(trimmed), balanced_object(trimmed)];
    for candidate in candidates.into_iter().flatten() {
        if let Ok(value) = serde_json::from_str::<T>(candidate) {
            return Ok(value);
        }
    }

    Err(RevosError::extraction(format!(
        "model output is not a valid {}: {first_error}",
        T::name()
    )))
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")? + 3;
    let rest = &text[start..];
    // skip a language tag such as ```json
    let body_start = rest.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &rest[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
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
