//! Pure helpers: URI templates, response bodies, status documents (no HTTP, no status logic).

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;

use super::{PushState, PushStatus};

/// Longest body excerpt carried in an error message.
const BODY_SNIPPET_CHARS: usize = 200;

/// Substitute `{key}` placeholders with percent-encoded values.
///
/// Spaces are encoded as `%20`, never `+`.
pub(crate) fn resolve_template(template: &str, params: &[(&str, &str)]) -> String {
    params
        .iter()
        .fold(template.to_string(), |uri, (key, value)| {
            uri.replace(&format!("{{{key}}}"), &urlencoding::encode(value))
        })
}

/// First characters of a response body, for diagnostics.
pub(crate) fn body_snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_SNIPPET_CHARS {
        return trimmed.to_string();
    }
    let mut snippet: String = trimmed.chars().take(BODY_SNIPPET_CHARS).collect();
    snippet.push_str("...");
    snippet
}

/// `": <description>"` when the error body carries one, empty otherwise.
pub(crate) fn description_suffix(json: &serde_json::Value) -> String {
    json.get("description")
        .and_then(serde_json::Value::as_str)
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}

/// Numeric `id` of an accepted push; numbers and numeric strings are accepted.
pub(crate) fn parse_push_id(json: &serde_json::Value) -> Option<u64> {
    match json.get("id")? {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct StatusDocument {
    status: String,
    #[serde(default)]
    until: Option<String>,
    #[serde(default, rename = "errorDetails")]
    error_details: Option<String>,
}

/// Parse a status document `{"status", "until", "errorDetails"}`.
pub(crate) fn parse_status_document(body: &str) -> Result<PushStatus, String> {
    let doc: StatusDocument =
        serde_json::from_str(body).map_err(|e| format!("invalid status document: {e}"))?;

    let until = doc
        .until
        .as_deref()
        .map(|raw| parse_until(raw).ok_or_else(|| format!("invalid 'until' timestamp: {raw}")))
        .transpose()?;

    Ok(PushStatus {
        state: PushState::from_wire(&doc.status),
        until,
        error_details: doc.error_details.filter(|d| !d.is_empty()),
    })
}

/// ISO-8601 timestamp with either `+00:00` or `+0000` offset.
pub(crate) fn parse_until(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_resolve_template_encodes_values() {
        let uri = resolve_template(
            "api/shared_spaces/{shared-space-id}/workspaces/{workspace-id}",
            &[("shared-space-id", "1001"), ("workspace-id", "a b/c")],
        );
        assert_eq!(uri, "api/shared_spaces/1001/workspaces/a%20b%2Fc");
    }

    #[test]
    fn test_body_snippet_truncates() {
        assert_eq!(body_snippet("  <html>  "), "<html>");
        let long = "x".repeat(500);
        let snippet = body_snippet(&long);
        assert_eq!(snippet.chars().count(), BODY_SNIPPET_CHARS + 3);
        assert!(snippet.ends_with("..."));
    }

    #[test]
    fn test_description_suffix() {
        let json = serde_json::json!({"description": "schema violation"});
        assert_eq!(description_suffix(&json), ": schema violation");
        assert_eq!(description_suffix(&serde_json::json!({})), "");
    }

    #[test]
    fn test_parse_push_id() {
        assert_eq!(parse_push_id(&serde_json::json!({"id": 1234})), Some(1234));
        assert_eq!(parse_push_id(&serde_json::json!({"id": "77"})), Some(77));
        assert_eq!(parse_push_id(&serde_json::json!({"status": "queued"})), None);
    }

    #[test]
    fn test_parse_until_offsets() {
        let compact = parse_until("2024-03-01T10:20:30+0000").unwrap();
        let colon = parse_until("2024-03-01T10:20:30+00:00").unwrap();
        assert_eq!(compact, colon);
        assert_eq!(compact.year(), 2024);
        assert_eq!(compact.hour(), 10);
        assert!(parse_until("yesterday").is_none());
    }

    #[test]
    fn test_parse_status_document() {
        let status = parse_status_document(
            r#"{"status":"failed","until":"2024-03-01T10:20:30+0000","errorDetails":"bad xml"}"#,
        )
        .unwrap();
        assert_eq!(status.state, PushState::Failed);
        assert!(status.until.is_some());
        assert_eq!(status.error_details.as_deref(), Some("bad xml"));

        let running = parse_status_document(r#"{"status":"running","errorDetails":""}"#).unwrap();
        assert_eq!(running.state, PushState::Running);
        assert!(running.error_details.is_none());

        assert!(parse_status_document(r#"{"status":"queued","until":"soon"}"#).is_err());
        assert!(parse_status_document("not json").is_err());
    }
}
