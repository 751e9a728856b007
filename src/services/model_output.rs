use serde_json::Value;
use thiserror::Error;

const FENCE: &str = "```";

#[derive(Debug, Error)]
#[error("{source}; raw response: {raw}")]
pub(crate) struct PayloadError {
    raw: String,
    #[source]
    source: serde_json::Error,
}

impl PayloadError {
    pub(crate) fn raw(&self) -> &str {
        &self.raw
    }
}

/// Returns the text inside the first Markdown code fence, or the trimmed
/// text when the reply is not fenced. A language tag after the opening fence
/// is dropped; an unterminated fence runs to the end of the text. Bare JSON
/// only loses a dangling closing fence.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return trimmed.strip_suffix(FENCE).map_or(trimmed, str::trim_end);
    }

    let Some(open) = trimmed.find(FENCE) else {
        return trimmed;
    };

    let after_open = &trimmed[open + FENCE.len()..];
    let tag_len = after_open
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(after_open.len());
    let body = &after_open[tag_len..];

    match body.find(FENCE) {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Parses the structured payload out of free-form model text.
pub(crate) fn extract_json_payload(text: &str) -> Result<Value, PayloadError> {
    serde_json::from_str(strip_code_fence(text))
        .map_err(|source| PayloadError { raw: text.to_string(), source })
}
