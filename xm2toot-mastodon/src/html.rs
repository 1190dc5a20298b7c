//! HTML to plain text for status content

use once_cell::sync::Lazy;
use regex::Regex;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag pattern"));

/// Strip tags from status HTML and decode entities
///
/// The text between tags is kept as it is, whitespace included.
pub fn strip_html(html: &str) -> String {
    let text = TAG_RE.replace_all(html, "");
    html_escape::decode_html_entities(&text).into_owned()
}
