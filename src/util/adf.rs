use serde_json::Value;

/// Text used when a Jira issue carries no description at all.
pub const NO_DESCRIPTION: &str = "no description";

/// Extract plain text from Jira's Atlassian Document Format (ADF).
///
/// Text leaves are concatenated without separators in depth-first document
/// order, so table cells come out row-major. A null or empty description
/// yields [`NO_DESCRIPTION`].
pub fn extract_text_from_adf(value: &Value) -> String {
    let empty = match value {
        Value::Null => true,
        Value::Object(obj) => obj.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    };
    if empty {
        return NO_DESCRIPTION.to_string();
    }

    let mut text = String::new();
    collect_text(value, &mut text);
    text
}

fn collect_text(value: &Value, out: &mut String) {
    match value {
        // API v2 hands back the description as a plain string
        Value::String(s) => out.push_str(s),
        Value::Array(nodes) => {
            for node in nodes {
                collect_text(node, out);
            }
        }
        Value::Object(obj) => {
            if obj.get("type").and_then(|v| v.as_str()) == Some("text") {
                if let Some(text) = obj.get("text").and_then(|v| v.as_str()) {
                    out.push_str(text);
                }
                return;
            }
            if let Some(content) = obj.get("content") {
                collect_text(content, out);
            }
        }
        _ => {}
    }
}
