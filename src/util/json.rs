use anyhow::{Result, anyhow};
use serde_json::Value;

/// Parses a model payload as a JSON object, repairing the common wrappers
/// chat models put around structured output.
///
/// Accepted in order: the payload as-is, the payload with a surrounding
/// markdown code fence removed, and the slice between the first `{` and the
/// last `}`. Nothing is synthesized; anything still unparsable is an error.
pub(crate) fn extract_outer_object(payload: &str) -> Result<Value> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("payload is empty"));
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    let unfenced = strip_code_fence(trimmed);
    if let Ok(value) = serde_json::from_str::<Value>(unfenced) {
        return Ok(value);
    }

    let object = outer_braces(unfenced)
        .or_else(|| outer_braces(trimmed))
        .ok_or_else(|| anyhow!("payload contains no JSON object"))?;

    serde_json::from_str::<Value>(object)
        .map_err(|error| anyhow!("payload is not valid JSON: {error}"))
}

/// Slice from the first `{` to the last `}`, if they appear in that order.
fn outer_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn strip_code_fence(payload: &str) -> &str {
    let Some(rest) = payload.strip_prefix("```") else {
        return payload;
    };
    // drop the info string ("json") on the opening fence line; a single-line
    // fence keeps everything from the first brace
    let body = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest.find('{').map_or("", |start| &rest[start..]),
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
