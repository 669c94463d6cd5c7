//! URL normalization and stable identifiers.
//!
//! A source identifier is a pure function of the normalized URL, so two
//! discoveries of equivalently formatted URLs always collapse onto the same
//! [`Source`](crate::Source) record.

use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{FeedScoutError, Result};
use crate::types::SourceId;

/// Number of digest bytes kept for source and content identifiers.
const ID_BYTES: usize = 16;

/// Parse a user- or pattern-supplied URL and normalize it.
///
/// Only `http` and `https` URLs with a host are accepted.
pub fn parse_source_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| FeedScoutError::validation(format!("invalid URL '{raw}': {e}")))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(FeedScoutError::validation(format!(
            "unsupported URL scheme '{}' in '{raw}'",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(FeedScoutError::validation(format!("URL has no host: {raw}")));
    }

    Ok(normalize_url(&url))
}

/// Normalize a URL for identity (strip fragment, tracking params, trailing slash; sort query).
///
/// Scheme/host lower-casing and default-port removal are done by the `url` parser.
pub fn normalize_url(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);

    let mut pairs: Vec<(String, String)> = normalized
        .query_pairs()
        .filter(|(k, v)| !v.is_empty() && !k.to_ascii_lowercase().starts_with("utm_"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    if pairs.is_empty() {
        normalized.set_query(None);
    } else {
        normalized.query_pairs_mut().clear().extend_pairs(pairs);
    }

    let path = normalized.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        normalized.set_path(path.trim_end_matches('/'));
    }

    normalized
}

/// Stable source identifier for a URL (normalizes first).
pub fn source_id_for(url: &Url) -> SourceId {
    SourceId(short_hash(normalize_url(url).as_str()))
}

/// Stable content identifier: hash of the source id and a content-specific key.
pub fn content_id_for(source_id: &SourceId, content_key: &str) -> String {
    short_hash(&format!("{}\n{}", source_id.0, content_key))
}

/// Full SHA-256 hex digest of the given parts, separated by a unit separator.
pub fn sha256_hex(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0x1f]);
        }
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest[..ID_BYTES]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
