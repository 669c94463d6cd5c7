//! Retrieval: turn an accepted candidate into a [`ContentRecord`].

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};

use feedscout_fetch::Fetch;
use feedscout_normalize::extract;
use feedscout_shared::{Candidate, ContentRecord, ReasonCode};

/// Why an accepted candidate produced no record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}: {detail}")]
pub struct RetrievalError {
    pub reason: ReasonCode,
    pub detail: String,
}

impl RetrievalError {
    fn failed(detail: impl Into<String>) -> Self {
        Self {
            reason: ReasonCode::RetrievalFailed,
            detail: detail.into(),
        }
    }
}

pub struct RetrievalAgent {
    fetch: Arc<dyn Fetch>,
}

impl RetrievalAgent {
    pub fn new(fetch: Arc<dyn Fetch>) -> Self {
        Self { fetch }
    }

    /// Fetch and normalize one accepted candidate. Single attempt: the
    /// validator already spent the retry budget on reachability.
    #[instrument(skip_all, fields(source = %candidate.source_id, url = %candidate.url))]
    pub async fn retrieve(&self, candidate: &Candidate) -> Result<ContentRecord, RetrievalError> {
        let response = self
            .fetch
            .fetch(&candidate.url)
            .await
            .map_err(|e| RetrievalError::failed(e.to_string()))?;

        if !response.is_success() {
            return Err(RetrievalError::failed(format!("HTTP {}", response.status)));
        }

        let document = extract(&response.body, response.content_type())
            .map_err(|e| RetrievalError::failed(e.to_string()))?;

        let ingested_at = Utc::now();
        let record = ContentRecord {
            content_id: candidate.content_id(),
            source_id: candidate.source_id.clone(),
            url: candidate.url.clone(),
            category: candidate.category.clone(),
            language: candidate.language.clone(),
            content_hash: document.content_hash(),
            published_at: document.published.unwrap_or(ingested_at),
            ingested_at,
            format: document.format,
            title: document.title,
            body: document.body,
        };

        debug!(content_id = %record.content_id, chars = record.body.chars().count(), "record built");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedscout_fetch::{FetchError, FetchResponse, MemoryFetch};
    use feedscout_normalize::content_hash;
    use feedscout_shared::{DocumentFormat, SourceId, Strategy, parse_source_url};

    const URL: &str = "https://news.test/rss";

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>  Daily   News </title>
  <description><![CDATA[<p>Top <b>stories</b></p>]]></description>
  <item><title>One</title><pubDate>Wed, 01 May 2024 08:00:00 GMT</pubDate></item>
</channel></rss>"#;

    fn candidate() -> Candidate {
        let url = parse_source_url(URL).unwrap();
        Candidate {
            source_id: SourceId::for_url(&url),
            url,
            language: "en".into(),
            category: "news".into(),
            strategy: Strategy::Hint,
            content_key: None,
            discovered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn builds_normalized_record() {
        let agent = RetrievalAgent::new(Arc::new(MemoryFetch::new().on_feed(URL, RSS)));
        let cand = candidate();
        let record = agent.retrieve(&cand).await.unwrap();

        assert_eq!(record.title, "Daily News");
        assert_eq!(record.body, "Top stories One");
        assert_eq!(record.content_id, cand.content_id());
        assert_eq!(record.content_hash, content_hash(&record.title, &record.body));
        assert_eq!(record.format, DocumentFormat::Rss);
        assert_eq!(record.published_at.to_rfc3339(), "2024-05-01T08:00:00+00:00");
    }

    #[tokio::test]
    async fn missing_date_falls_back_to_ingestion() {
        let body = r#"{"title": "Chapter", "description": "Text body"}"#;
        let fetch = MemoryFetch::new().on(
            URL,
            FetchResponse::new(200, body).with_header("content-type", "application/json"),
        );
        let record = RetrievalAgent::new(Arc::new(fetch))
            .retrieve(&candidate())
            .await
            .unwrap();
        assert_eq!(record.published_at, record.ingested_at);
        assert_eq!(record.format, DocumentFormat::Json);
    }

    #[tokio::test]
    async fn fetch_failure_is_retrieval_failed() {
        let fetch = MemoryFetch::new().on_error(URL, FetchError::Connect("reset".into()));
        let err = RetrievalAgent::new(Arc::new(fetch))
            .retrieve(&candidate())
            .await
            .unwrap_err();
        assert_eq!(err.reason, ReasonCode::RetrievalFailed);
        assert!(err.detail.contains("reset"));
    }

    #[tokio::test]
    async fn error_status_is_retrieval_failed() {
        let fetch = MemoryFetch::new().on(URL, FetchResponse::new(500, ""));
        let err = RetrievalAgent::new(Arc::new(fetch))
            .retrieve(&candidate())
            .await
            .unwrap_err();
        assert_eq!(err.detail, "HTTP 500");
    }

    #[tokio::test]
    async fn unparseable_body_is_retrieval_failed() {
        let fetch = MemoryFetch::new().on_feed(URL, "not a feed");
        let err = RetrievalAgent::new(Arc::new(fetch))
            .retrieve(&candidate())
            .await
            .unwrap_err();
        assert_eq!(err.reason, ReasonCode::RetrievalFailed);
    }
}
