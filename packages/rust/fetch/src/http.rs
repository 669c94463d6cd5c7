//! reqwest-backed [`Fetch`] with per-host pacing, a body cap and SSRF protection.

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use feedscout_shared::{FeedScoutError, FetchConfig, Result};
use reqwest::Client;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::{Fetch, FetchError, FetchResponse};

// ---------------------------------------------------------------------------
// HttpFetcher
// ---------------------------------------------------------------------------

/// HTTP fetcher shared by all workers of a run.
pub struct HttpFetcher {
    client: Client,
    throttle: HostThrottle,
    max_body_bytes: usize,
    /// Allow localhost/private IPs (local mirrors, integration tests with mock servers).
    allow_private_hosts: bool,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FeedScoutError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            throttle: HostThrottle::new(Duration::from_millis(config.rate_limit_ms)),
            max_body_bytes: config.max_body_bytes,
            allow_private_hosts: config.allow_private_hosts,
        })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    #[instrument(skip_all, fields(url = %url))]
    async fn fetch(&self, url: &Url) -> std::result::Result<FetchResponse, FetchError> {
        let host = match url.host_str() {
            Some(host) if url.scheme() == "http" || url.scheme() == "https" => host.to_string(),
            _ => return Err(FetchError::InvalidUrl(url.to_string())),
        };

        if !self.allow_private_hosts && is_private_target(url) {
            warn!("SSRF protection: blocked");
            return Err(FetchError::Blocked(host));
        }

        self.throttle.acquire(&host).await;
        debug!("fetching");

        let mut response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| classify(url, &e))?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        if response
            .content_length()
            .is_some_and(|len| len as usize > self.max_body_bytes)
        {
            return Err(FetchError::TooLarge {
                limit: self.max_body_bytes,
            });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| classify(url, &e))? {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_body_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        debug!(status, bytes = body.len(), "fetched");
        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}

fn classify(url: &Url, err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(format!("{url}: {err}"))
    } else {
        FetchError::Connect(format!("{url}: {err}"))
    }
}

// ---------------------------------------------------------------------------
// Per-host pacing
// ---------------------------------------------------------------------------

/// Hands out request slots at least `interval` apart for each host.
///
/// A slot is reserved under the lock and waited for outside it, so workers
/// hitting different hosts never block each other.
struct HostThrottle {
    interval: Duration,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl HostThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    async fn acquire(&self, host: &str) {
        if self.interval.is_zero() {
            return;
        }

        let wait = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = slots
                .get(host)
                .copied()
                .filter(|next| *next > now)
                .unwrap_or(now);
            slots.insert(host.to_string(), slot + self.interval);
            slot.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            debug!(host, wait_ms = wait.as_millis() as u64, "rate limiting");
            tokio::time::sleep(wait).await;
        }
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a loopback, private or local-only host.
pub fn is_private_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> FetchConfig {
        FetchConfig {
            timeout_secs: 2,
            rate_limit_ms: 0,
            max_body_bytes: 1024,
            allow_private_hosts: true,
            ..FetchConfig::default()
        }
    }

    fn url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{p}", server.uri())).unwrap()
    }

    #[test]
    fn ssrf_blocks_private_targets() {
        for raw in [
            "http://127.0.0.1:8080/",
            "http://10.0.0.1/",
            "http://192.168.1.1/admin",
            "http://localhost:3000/api",
            "http://[::1]/",
            "http://printer.local/",
            "file:///etc/passwd",
        ] {
            assert!(is_private_target(&Url::parse(raw).unwrap()), "{raw}");
        }
    }

    #[test]
    fn ssrf_allows_public() {
        let url = Url::parse("https://pib.gov.in/RssMain.aspx?ModId=6").unwrap();
        assert!(!is_private_target(&url));
    }

    #[tokio::test]
    async fn fetches_body_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rss"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<rss></rss>", "application/rss+xml"),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&config()).unwrap();
        let resp = fetcher.fetch(&url(&server, "/rss")).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type(), Some("application/rss+xml"));
        assert_eq!(resp.body, b"<rss></rss>");
    }

    #[tokio::test]
    async fn error_statuses_are_responses() {
        let server = MockServer::start().await;
        Mock::given(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&config()).unwrap();
        let resp = fetcher.fetch(&url(&server, "/gone")).await.unwrap();
        assert_eq!(resp.status, 404);
        assert!(!resp.is_success());
    }

    #[tokio::test]
    async fn oversized_body_refused() {
        let server = MockServer::start().await;
        Mock::given(path("/big"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&config()).unwrap();
        let err = fetcher.fetch(&url(&server, "/big")).await.unwrap_err();
        assert_eq!(err, FetchError::TooLarge { limit: 1024 });
    }

    #[tokio::test]
    async fn private_hosts_blocked_by_default() {
        let server = MockServer::start().await;
        let fetcher = HttpFetcher::new(&FetchConfig {
            allow_private_hosts: false,
            ..config()
        })
        .unwrap();

        let err = fetcher.fetch(&url(&server, "/rss")).await.unwrap_err();
        assert!(matches!(err, FetchError::Blocked(_)));
    }

    #[tokio::test]
    async fn slow_response_is_timeout() {
        let server = MockServer::start().await;
        Mock::given(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&FetchConfig {
            timeout_secs: 1,
            ..config()
        })
        .unwrap();
        let err = fetcher.fetch(&url(&server, "/slow")).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)), "{err:?}");
    }

    #[tokio::test]
    async fn same_host_requests_are_spaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&FetchConfig {
            rate_limit_ms: 150,
            ..config()
        })
        .unwrap();

        let start = std::time::Instant::now();
        for p in ["/a", "/b", "/c"] {
            fetcher.fetch(&url(&server, p)).await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_reserves_consecutive_slots() {
        let throttle = HostThrottle::new(Duration::from_millis(100));
        let start = Instant::now();
        throttle.acquire("a.test").await;
        throttle.acquire("a.test").await;
        throttle.acquire("b.test").await;
        // a.test waited one interval; b.test did not wait at all.
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }
}
