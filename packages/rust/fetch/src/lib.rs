//! The `Fetch` capability: one HTTP GET, returning status, headers and body.
//!
//! Agents never talk to the network directly. They receive an
//! `Arc<dyn Fetch>` so runs can be driven by the real [`HttpFetcher`] or by
//! a scripted [`MemoryFetch`].

mod http;
mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use url::Url;

pub use http::{HttpFetcher, is_private_target};
pub use memory::MemoryFetch;

/// Raw response of a single fetch. Non-2xx statuses are responses, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// Why a fetch produced no response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    /// Refused before any I/O (private or loopback target).
    #[error("blocked target: {0}")]
    Blocked(String),

    #[error("response body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Fetch one URL.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let resp = FetchResponse::new(200, "x").with_header("Content-Type", "application/rss+xml");
        assert_eq!(resp.content_type(), Some("application/rss+xml"));
        assert_eq!(resp.header("CONTENT-TYPE"), Some("application/rss+xml"));
        assert!(resp.is_success());
        assert!(!FetchResponse::new(404, "").is_success());
    }
}
