use once_cell::sync::Lazy;
use regex::Regex;

static COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"));
// quoted attribute values may contain '>'
static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<(?:[^>"']|"[^"]*"|'[^']*')*>"#).expect("valid tag regex")
});

/// Strip markup from an ADO description, keeping text content in document
/// order. Tags and comments are dropped and character references decoded.
pub fn strip_html(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    let without_comments = COMMENT_RE.replace_all(html, "");
    let text = TAG_RE.replace_all(&without_comments, "");
    html_escape::decode_html_entities(&text).into_owned()
}
