use pulldown_cmark::{html, Parser};
use regex::Regex;
use scraper::{ElementRef, Html};
use std::sync::LazyLock;

/// Elements dropped together with everything inside them.
const DISALLOWED_ELEMENTS: [&str; 3] = ["pre", "code", "blockquote"];

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)https?://\S+").unwrap());
static MD_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```.*?```|`.*?`").unwrap());

/// Sanitize a question or answer body (HTML).
///
/// Users sometimes format blocks of code with Markdown backticks inside the
/// HTML body, so leftover backtick code is dropped too.
pub fn sanitize_post(text: &str) -> String {
    let cleaned = sanitize_html(text);
    MD_CODE.replace_all(&cleaned, "").trim().to_string()
}

/// Sanitize a comment body (Markdown with inline HTML).
pub fn sanitize_comment(text: &str) -> String {
    let mut rendered = String::with_capacity(text.len());
    html::push_html(&mut rendered, Parser::new(text));
    sanitize_html(&rendered)
}

/// Text content of an HTML fragment without the disallowed elements, on one
/// line and without links.
fn sanitize_html(text: &str) -> String {
    let fragment = Html::parse_fragment(text);
    let mut content = String::with_capacity(text.len());
    collect_text(fragment.root_element(), &mut content);

    let collapsed = WHITESPACE.replace_all(&content, " ");
    URL_PATTERN.replace_all(&collapsed, "").trim().to_string()
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(child) {
            if !DISALLOWED_ELEMENTS.contains(&child.value().name()) {
                collect_text(child, out);
            }
        }
    }
}
