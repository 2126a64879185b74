//! Defensive decoding of free-form oracle responses
//!
//! Responses arrive as prose that usually, but not always, contains a
//! fenced block with a JSON payload. Decoding tries the tagged fence,
//! then an untagged fence, then the raw text, and finally extracts the
//! first balanced bracket/brace span before handing it to serde.

use serde::de::DeserializeOwned;

use super::OracleError;

/// Strip markdown code fences, preferring a ```json-tagged block, then a
/// generic ``` block, falling back to the raw text.
pub fn strip_code_fences(text: &str) -> &str {
    if let Some(start) = text.find("```json") {
        let body = &text[start + 7..];
        if let Some(end) = body.rfind("```") {
            return body[..end].trim();
        }
    } else if let Some(start) = text.find("```") {
        let body = &text[start + 3..];
        if let Some(end) = body.rfind("```") {
            return body[..end].trim();
        }
    }
    text.trim()
}

/// Locate the structured payload inside `text`: the span from the first
/// opening brace/bracket to the last matching closing one.
pub fn extract_payload(text: &str) -> Result<&str, OracleError> {
    let open = text
        .find(['{', '['])
        .ok_or_else(|| OracleError::decode("no JSON object or array found", text))?;

    let close = match text.as_bytes()[open] {
        b'{' => text.rfind('}'),
        _ => text.rfind(']'),
    }
    .filter(|&end| end > open)
    .ok_or_else(|| OracleError::decode("unbalanced JSON payload", text))?;

    Ok(&text[open..=close])
}

/// Decode a raw oracle response into `T`: fences stripped, payload
/// located, substring parsed. Failure carries a bounded preview of the
/// offending text.
pub fn decode_json<T: DeserializeOwned>(raw: &str) -> Result<T, OracleError> {
    let inner = strip_code_fences(raw);
    let payload = extract_payload(inner)?;
    serde_json::from_str(payload).map_err(|e| OracleError::decode(e.to_string(), payload))
}
