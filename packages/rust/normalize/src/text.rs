//! Text cleanup passes applied to titles and bodies.
//!
//! Markup stripping happens once, at extraction time. [`normalize_text`] is
//! the pass used for hashing and is idempotent: applying it twice yields the
//! same string as applying it once.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

/// Collapse every whitespace run to a single space, drop control and
/// zero-width characters, and trim both ends.
pub fn normalize_text(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .filter(|c| !is_invisible(*c))
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Convert a possibly-HTML fragment to plain normalized text.
///
/// Script and style contents are dropped; entities are decoded.
pub(crate) fn plain_text(fragment: &str) -> String {
    if !looks_like_markup(fragment) {
        return normalize_text(fragment);
    }

    let without_code = strip_script_blocks(fragment);
    let doc = Html::parse_fragment(&without_code);
    let text = doc.root_element().text().collect::<Vec<_>>().join(" ");
    normalize_text(&text)
}

// ---------------------------------------------------------------------------
// Pass helpers
// ---------------------------------------------------------------------------

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200b}' | '\u{200e}' | '\u{200f}' | '\u{2060}' | '\u{feff}' | '\u{00ad}'
    )
}

fn looks_like_markup(s: &str) -> bool {
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"</?[a-zA-Z][^>]*>|&[a-zA-Z#0-9]+;").expect("valid regex"));
    TAG_RE.is_match(s)
}

/// Remove `<script>`/`<style>` elements including their contents.
fn strip_script_blocks(html: &str) -> String {
    static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").expect("valid regex")
    });
    BLOCK_RE.replace_all(html, " ").to_string()
}
