//! JSON output formatting

use serde::Serialize;

/// Format a report as pretty-printed JSON.
pub fn format_json<T: Serialize>(result: &T) -> String {
    serde_json::to_string_pretty(result).unwrap_or_else(|e| {
        format!(
            r#"{{"error": true, "code": "SERIALIZATION_ERROR", "message": "{}"}}"#,
            e
        )
    })
}
