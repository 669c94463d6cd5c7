//! Scripted, offline [`Fetch`] implementation.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use feedscout_shared::normalize_url;
use url::Url;

use crate::{Fetch, FetchError, FetchResponse};

type Scripted = Result<FetchResponse, FetchError>;

#[derive(Debug, Default)]
struct Route {
    /// Responses served in order; the last one repeats.
    script: VecDeque<Scripted>,
    latency: Option<Duration>,
    calls: usize,
}

/// URL → scripted responses. Unregistered URLs fail with a connection error.
///
/// URLs are matched after normalization, so `https://a.test/feed/` and
/// `https://a.test/feed` hit the same route.
#[derive(Debug, Default)]
pub struct MemoryFetch {
    routes: Mutex<HashMap<String, Route>>,
}

impl MemoryFetch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `response` for every request to `url`.
    pub fn on(self, url: &str, response: FetchResponse) -> Self {
        self.on_sequence(url, vec![Ok(response)])
    }

    /// Serve a 200 feed document with an XML content type.
    pub fn on_feed(self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.on(
            url,
            FetchResponse::new(200, body).with_header("content-type", "application/rss+xml"),
        )
    }

    /// Fail every request to `url` with `error`.
    pub fn on_error(self, url: &str, error: FetchError) -> Self {
        self.on_sequence(url, vec![Err(error)])
    }

    /// Serve results in order; the final one repeats once the script is exhausted.
    pub fn on_sequence(self, url: &str, script: Vec<Scripted>) -> Self {
        if let Ok(mut routes) = self.routes.lock() {
            routes.entry(key(url)).or_default().script = script.into();
        }
        self
    }

    /// Delay every response for `url`.
    pub fn with_latency(self, url: &str, latency: Duration) -> Self {
        if let Ok(mut routes) = self.routes.lock() {
            routes.entry(key(url)).or_default().latency = Some(latency);
        }
        self
    }

    /// Number of fetches made for `url`.
    pub fn calls(&self, url: &str) -> usize {
        self.routes
            .lock()
            .ok()
            .and_then(|routes| routes.get(&key(url)).map(|r| r.calls))
            .unwrap_or(0)
    }

    fn next(&self, url: &Url) -> (Scripted, Option<Duration>) {
        let Ok(mut routes) = self.routes.lock() else {
            return (Err(FetchError::Connect("fetch script poisoned".into())), None);
        };
        let Some(route) = routes.get_mut(normalize_url(url).as_str()) else {
            return (Err(FetchError::Connect(format!("no route for {url}"))), None);
        };

        route.calls += 1;
        let result = if route.script.len() > 1 {
            route.script.pop_front()
        } else {
            route.script.front().cloned()
        };
        let result =
            result.unwrap_or_else(|| Err(FetchError::Connect(format!("empty script for {url}"))));
        (result, route.latency)
    }
}

fn key(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => normalize_url(&parsed).to_string(),
        Err(_) => url.to_string(),
    }
}

#[async_trait]
impl Fetch for MemoryFetch {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, FetchError> {
        let (result, latency) = self.next(url);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unregistered_url_is_connect_error() {
        let fetch = MemoryFetch::new();
        let url = Url::parse("https://a.test/feed").unwrap();
        assert!(matches!(
            fetch.fetch(&url).await,
            Err(FetchError::Connect(_))
        ));
    }

    #[tokio::test]
    async fn routes_match_after_normalization() {
        let fetch = MemoryFetch::new().on_feed("https://a.test/feed/", "<rss/>");
        let url = Url::parse("HTTPS://A.test/feed#top").unwrap();
        let resp = fetch.fetch(&url).await.unwrap();
        assert_eq!(resp.body, b"<rss/>");
        assert_eq!(fetch.calls("https://a.test/feed"), 1);
    }

    #[tokio::test]
    async fn sequence_then_sticky_last() {
        let fetch = MemoryFetch::new().on_sequence(
            "https://a.test/feed",
            vec![
                Err(FetchError::Timeout("slow".into())),
                Ok(FetchResponse::new(200, "ok")),
            ],
        );
        let url = Url::parse("https://a.test/feed").unwrap();

        assert!(fetch.fetch(&url).await.is_err());
        assert_eq!(fetch.fetch(&url).await.unwrap().status, 200);
        assert_eq!(fetch.fetch(&url).await.unwrap().status, 200);
        assert_eq!(fetch.calls("https://a.test/feed"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn latency_is_applied() {
        let fetch = MemoryFetch::new()
            .on_feed("https://a.test/feed", "<rss/>")
            .with_latency("https://a.test/feed", Duration::from_secs(3));
        let url = Url::parse("https://a.test/feed").unwrap();

        let start = tokio::time::Instant::now();
        fetch.fetch(&url).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
