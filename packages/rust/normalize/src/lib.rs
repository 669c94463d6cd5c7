//! Document extraction and text normalization.
//!
//! [`extract`] turns a fetched body into a [`Document`]: RSS, Atom and JSON
//! Feed documents are parsed with `feed-rs`; plain JSON objects are accepted
//! when they carry a title and a description. Everything else is a
//! [`ExtractError::SchemaMismatch`].

mod text;

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use feed_rs::model::{Feed, FeedType};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, instrument};

use feedscout_shared::{DocumentFormat, sha256_hex};

pub use text::normalize_text;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A recognised document with plain-text title and body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub format: DocumentFormat,
    /// Normalized title (markup stripped).
    pub title: String,
    /// Normalized body: feed description followed by entry titles and summaries.
    pub body: String,
    /// Language the document declares about itself, if any.
    pub language: Option<String>,
    /// Newest publication/update time found in the document.
    pub published: Option<DateTime<Utc>>,
    /// Number of entries (feeds) or 1 (plain JSON).
    pub item_count: usize,
}

impl Document {
    /// Content hash of this document's title and body.
    pub fn content_hash(&self) -> String {
        content_hash(&self.title, &self.body)
    }
}

/// Why a body could not be read as a supported document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
}

/// SHA-256 over the normalized title and normalized body.
///
/// Changes if and only if the normalized title or body changes.
pub fn content_hash(title: &str, body: &str) -> String {
    sha256_hex(&[&normalize_text(title), &normalize_text(body)])
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Parse a fetched body into a [`Document`].
#[instrument(skip_all, fields(bytes = body.len(), content_type = content_type.unwrap_or("-")))]
pub fn extract(body: &[u8], content_type: Option<&str>) -> Result<Document, ExtractError> {
    if let Some(ct) = content_type {
        check_content_type(ct)?;
    }

    let trimmed = strip_bom(body);
    let first = trimmed.iter().find(|b| !b.is_ascii_whitespace()).copied();

    let doc = match first {
        None => return Err(ExtractError::SchemaMismatch("empty document".into())),
        Some(b'{') | Some(b'[') => extract_json(trimmed)?,
        Some(_) => extract_xml_feed(trimmed)?,
    };

    debug!(
        format = ?doc.format,
        items = doc.item_count,
        body_chars = doc.body.chars().count(),
        "extracted document"
    );
    Ok(doc)
}

fn check_content_type(content_type: &str) -> Result<(), ExtractError> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    let supported = mime.is_empty()
        || mime.starts_with("text/")
        || mime.ends_with("/xml")
        || mime.ends_with("+xml")
        || mime.ends_with("/json")
        || mime.ends_with("+json")
        || mime == "application/octet-stream";

    if supported {
        Ok(())
    } else {
        Err(ExtractError::UnsupportedContentType(mime))
    }
}

fn strip_bom(body: &[u8]) -> &[u8] {
    body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body)
}

fn extract_xml_feed(body: &[u8]) -> Result<Document, ExtractError> {
    static FEED_ROOT_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)<(rss|feed|rdf:rdf)[\s>]").expect("valid regex")
    });

    // Only sniff the head of the document; HTML pages are rejected before parsing.
    let head = String::from_utf8_lossy(&body[..body.len().min(4096)]);
    if !FEED_ROOT_RE.is_match(&head) {
        return Err(ExtractError::SchemaMismatch(
            "no rss, atom or rdf root element".into(),
        ));
    }

    let feed = feed_rs::parser::parse(body)
        .map_err(|e| ExtractError::SchemaMismatch(format!("feed parse failed: {e}")))?;
    Ok(from_feed(feed))
}

fn from_feed(feed: Feed) -> Document {
    let format = match feed.feed_type {
        FeedType::Atom => DocumentFormat::Atom,
        FeedType::JSON => DocumentFormat::JsonFeed,
        FeedType::RSS0 | FeedType::RSS1 | FeedType::RSS2 => DocumentFormat::Rss,
    };

    let title = feed
        .title
        .as_ref()
        .map(|t| text::plain_text(&t.content))
        .unwrap_or_default();

    let mut parts: Vec<String> = Vec::new();
    if let Some(desc) = &feed.description {
        parts.push(text::plain_text(&desc.content));
    }

    let mut newest = feed.published.or(feed.updated);
    let mut language = feed.language.clone();

    for entry in &feed.entries {
        if let Some(t) = &entry.title {
            parts.push(text::plain_text(&t.content));
        }
        if let Some(summary) = &entry.summary {
            parts.push(text::plain_text(&summary.content));
        }
        if let Some(body) = entry.content.as_ref().and_then(|c| c.body.as_ref()) {
            parts.push(text::plain_text(body));
        }
        if let Some(ts) = entry.published.or(entry.updated) {
            newest = Some(newest.map_or(ts, |n| n.max(ts)));
        }
        if language.is_none() {
            language = entry.language.clone();
        }
    }

    parts.retain(|p| !p.is_empty());

    Document {
        format,
        title,
        body: normalize_text(&parts.join("\n")),
        language: language.filter(|l| !l.trim().is_empty()),
        published: newest,
        item_count: feed.entries.len(),
    }
}

fn extract_json(body: &[u8]) -> Result<Document, ExtractError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ExtractError::SchemaMismatch(format!("invalid JSON: {e}")))?;

    let is_json_feed = value
        .get("version")
        .and_then(Value::as_str)
        .is_some_and(|v| v.contains("jsonfeed.org"));

    if is_json_feed {
        let feed = feed_rs::parser::parse(body)
            .map_err(|e| ExtractError::SchemaMismatch(format!("JSON feed parse failed: {e}")))?;
        return Ok(from_feed(feed));
    }

    let Value::Object(map) = &value else {
        return Err(ExtractError::SchemaMismatch(
            "JSON document is not an object".into(),
        ));
    };

    let field = |names: &[&str]| {
        names
            .iter()
            .find_map(|n| map.get(*n).and_then(Value::as_str))
            .map(text::plain_text)
            .filter(|s| !s.is_empty())
    };

    let title = field(&["title", "name"])
        .ok_or_else(|| ExtractError::SchemaMismatch("JSON object has no title or name".into()))?;
    let body = field(&["description", "summary", "content", "body"]).ok_or_else(|| {
        ExtractError::SchemaMismatch("JSON object has no description or content".into())
    })?;

    let published = ["published", "date_published", "date", "updated", "lastUpdatedOn"]
        .iter()
        .filter_map(|n| map.get(*n).and_then(Value::as_str))
        .find_map(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let language = ["language", "lang", "languageCode"]
        .iter()
        .find_map(|n| map.get(*n))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Array(items) => items.first().and_then(Value::as_str).map(str::to_string),
            _ => None,
        });

    Ok(Document {
        format: DocumentFormat::Json,
        title,
        body,
        language,
        published,
        item_count: 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>PIB &amp; Releases</title>
    <link>https://pib.gov.in/</link>
    <description>Press releases from the &lt;b&gt;Government&lt;/b&gt;</description>
    <language>hi</language>
    <item>
      <title>Cabinet approves scheme</title>
      <description><![CDATA[<p>The Union Cabinet <b>approved</b> the scheme.</p>]]></description>
      <pubDate>Mon, 06 May 2024 10:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Second release</title>
      <pubDate>Tue, 07 May 2024 09:30:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xml:lang="ta">
  <title>Atom News</title>
  <id>urn:uuid:1</id>
  <updated>2024-05-01T12:00:00Z</updated>
  <entry>
    <title>First entry</title>
    <id>urn:uuid:2</id>
    <updated>2024-05-02T12:00:00Z</updated>
    <summary>Summary text</summary>
  </entry>
</feed>"#;

    #[test]
    fn parses_rss() {
        let doc = extract(RSS.as_bytes(), Some("application/rss+xml; charset=utf-8")).unwrap();
        assert_eq!(doc.format, DocumentFormat::Rss);
        assert_eq!(doc.title, "PIB & Releases");
        assert_eq!(doc.language.as_deref(), Some("hi"));
        assert_eq!(doc.item_count, 2);
        assert!(doc.body.contains("The Union Cabinet approved the scheme."));
        assert!(!doc.body.contains("<b>"));
        let published = doc.published.unwrap();
        assert_eq!(published.to_rfc3339(), "2024-05-07T09:30:00+00:00");
    }

    #[test]
    fn parses_atom() {
        let doc = extract(ATOM.as_bytes(), Some("application/atom+xml")).unwrap();
        assert_eq!(doc.format, DocumentFormat::Atom);
        assert_eq!(doc.title, "Atom News");
        assert!(doc.body.contains("First entry"));
        assert!(doc.body.contains("Summary text"));
    }

    #[test]
    fn parses_json_feed() {
        let json = r#"{
            "version": "https://jsonfeed.org/version/1.1",
            "title": "JSON Feed",
            "items": [
                {"id": "1", "content_text": "Hello from the feed", "title": "Item one"}
            ]
        }"#;
        let doc = extract(json.as_bytes(), Some("application/feed+json")).unwrap();
        assert_eq!(doc.format, DocumentFormat::JsonFeed);
        assert_eq!(doc.title, "JSON Feed");
        assert!(doc.body.contains("Item one"));
    }

    #[test]
    fn parses_plain_json_object() {
        let json = r#"{
            "name": "Class 6 Science",
            "description": "<p>Textbook chapter</p>",
            "language": ["Hindi"],
            "lastUpdatedOn": "2024-03-01T00:00:00Z"
        }"#;
        let doc = extract(json.as_bytes(), Some("application/json")).unwrap();
        assert_eq!(doc.format, DocumentFormat::Json);
        assert_eq!(doc.title, "Class 6 Science");
        assert_eq!(doc.body, "Textbook chapter");
        assert_eq!(doc.language.as_deref(), Some("Hindi"));
        assert!(doc.published.is_some());
    }

    #[test]
    fn json_without_description_is_mismatch() {
        let err = extract(br#"{"title": "only"}"#, None).unwrap_err();
        assert!(matches!(err, ExtractError::SchemaMismatch(_)));
    }

    #[test]
    fn html_page_is_mismatch() {
        let html = b"<!DOCTYPE html><html><body><h1>Not a feed</h1></body></html>";
        let err = extract(html, Some("text/html")).unwrap_err();
        assert!(matches!(err, ExtractError::SchemaMismatch(_)));
    }

    #[test]
    fn binary_content_type_rejected() {
        let err = extract(RSS.as_bytes(), Some("image/png")).unwrap_err();
        assert_eq!(
            err,
            ExtractError::UnsupportedContentType("image/png".into())
        );
    }

    #[test]
    fn empty_body_is_mismatch() {
        assert!(extract(b"  \n ", None).is_err());
    }

    #[test]
    fn hash_tracks_title_and_body_only() {
        let base = content_hash("Title", "Body text");
        assert_eq!(content_hash("  Title ", "Body\n text"), base);
        assert_ne!(content_hash("Title!", "Body text"), base);
        assert_ne!(content_hash("Title", "Body text."), base);
        assert_ne!(content_hash("TitleBody", " text"), content_hash("Title", "Body text"));
    }

    #[test]
    fn identical_documents_hash_identically() {
        let a = extract(RSS.as_bytes(), None).unwrap();
        let b = extract(RSS.as_bytes(), None).unwrap();
        assert_eq!(a.content_hash(), b.content_hash());
    }
}
