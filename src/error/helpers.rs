//! Error helper utilities for rendering provider failures.

use super::types::ProviderFailure;

const MAX_MESSAGE_CHARS: usize = 300;

/// Render the per-provider detail of a failover chain, one attempt per clause.
pub fn summarize_failures(attempts: &[ProviderFailure]) -> String {
    if attempts.is_empty() {
        return "no providers configured".to_string();
    }
    attempts
        .iter()
        .map(|a| match a.status {
            Some(status) => format!(
                "{} ({}, model {}): {} [HTTP {}] {}",
                a.provider_id, a.provider_type, a.model, a.kind, status, a.reason
            ),
            None => format!(
                "{} ({}, model {}): {} {}",
                a.provider_id, a.provider_type, a.model, a.kind, a.reason
            ),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Extract the provider's own message from an error body.
///
/// Understands the OpenAI-style `{"error": {"message": ...}}` envelope used by
/// every OpenAI-compatible backend, plus the flat `{"error": "..."}` and
/// `{"message": "..."}` variants. Falls back to the (truncated) raw body.
pub fn extract_provider_message(status: u16, body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let candidate = json
            .get("error")
            .and_then(|e| e.get("message").or(Some(e)))
            .and_then(|m| m.as_str())
            .or_else(|| json.get("message").and_then(|m| m.as_str()));
        if let Some(msg) = candidate {
            return truncate(msg, MAX_MESSAGE_CHARS);
        }
    }
    if trimmed.is_empty() {
        return format!("HTTP {status}");
    }
    truncate(trimmed, MAX_MESSAGE_CHARS)
}

/// Truncate on a char boundary, appending an ellipsis when shortened.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_openai_style_message() {
        let body = r#"{"error":{"message":"Rate limit reached for model","type":"tokens"}}"#;
        assert_eq!(extract_provider_message(429, body), "Rate limit reached for model");
    }

    #[test]
    fn extracts_flat_messages() {
        assert_eq!(extract_provider_message(500, r#"{"error":"boom"}"#), "boom");
        assert_eq!(extract_provider_message(500, r#"{"message":"down"}"#), "down");
    }

    #[test]
    fn falls_back_to_body_or_status() {
        assert_eq!(extract_provider_message(502, "Bad gateway"), "Bad gateway");
        assert_eq!(extract_provider_message(503, "   "), "HTTP 503");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé…");
        assert_eq!(truncate("abc", 5), "abc");
    }
}
