use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use feedscout_fetch::{Fetch, FetchError, FetchResponse};
use feedscout_normalize::extract;
use feedscout_shared::{Candidate, ReasonCode, ValidationConfig, ValidationOutcome};

use crate::checks::{CheckContext, CheckRegistry, DuplicateRegistry};

/// Validation result for one candidate.
#[derive(Debug, Clone)]
pub struct Validation {
    pub outcome: ValidationOutcome,
    /// Hash of the extracted document. On accept the hash is claimed in the
    /// duplicate registry; on a quality-check reject it is informational.
    pub content_hash: Option<String>,
}

impl Validation {
    fn rejected(candidate: &Candidate, reason: ReasonCode, attempts: u32) -> Self {
        Self::from_outcome(ValidationOutcome::reject(candidate, reason, attempts))
    }

    fn from_outcome(outcome: ValidationOutcome) -> Self {
        Self {
            outcome,
            content_hash: None,
        }
    }
}

/// Decides accept/reject for candidates. Never touches trust state.
pub struct ValidatorAgent {
    fetch: Arc<dyn Fetch>,
    checks: CheckRegistry,
    retry_budget: u32,
    backoff: Duration,
}

impl ValidatorAgent {
    /// Validator with the built-in checks, sharing `duplicates` with the
    /// other workers of the run.
    pub fn new(
        fetch: Arc<dyn Fetch>,
        config: &ValidationConfig,
        duplicates: DuplicateRegistry,
    ) -> Self {
        Self::with_checks(fetch, config, CheckRegistry::new(config, duplicates))
    }

    pub fn with_checks(
        fetch: Arc<dyn Fetch>,
        config: &ValidationConfig,
        checks: CheckRegistry,
    ) -> Self {
        Self {
            fetch,
            checks,
            retry_budget: config.retry_budget.max(1),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Reachability, schema, then the quality checks; the first failure decides.
    #[instrument(skip_all, fields(source = %candidate.source_id, url = %candidate.url, strategy = %candidate.strategy))]
    pub async fn validate(&self, candidate: &Candidate) -> Validation {
        let (response, attempts) = match self.reach(candidate).await {
            Ok(reached) => reached,
            Err(outcome) => {
                info!(reason = %outcome.reason, attempts = outcome.attempts, "candidate unreachable");
                return Validation::from_outcome(outcome);
            }
        };

        if response.body.iter().all(u8::is_ascii_whitespace) {
            debug!("reachable but empty");
            return Validation::rejected(candidate, ReasonCode::ContentTooShort, attempts);
        }

        let document = match extract(&response.body, response.content_type()) {
            Ok(doc) => doc,
            Err(e) => {
                info!(error = %e, "schema check failed");
                return Validation::rejected(candidate, ReasonCode::SchemaMismatch, attempts);
            }
        };

        let content_hash = document.content_hash();
        let ctx = CheckContext {
            candidate,
            document: &document,
            content_hash: &content_hash,
        };
        let outcome = match self.checks.run(&ctx) {
            Ok(()) => {
                info!(attempts, hash = %content_hash, "candidate accepted");
                ValidationOutcome::accept(candidate, attempts)
            }
            Err(failure) => {
                info!(reason = %failure.reason, detail = %failure.detail, "quality check rejected candidate");
                ValidationOutcome::reject(candidate, failure.reason, attempts)
            }
        };
        Validation {
            outcome,
            content_hash: Some(content_hash),
        }
    }

    /// Fetch with retries. A transient failure defers and is retried; a
    /// deferral still standing when the budget runs out becomes a reject.
    async fn reach(
        &self,
        candidate: &Candidate,
    ) -> Result<(FetchResponse, u32), ValidationOutcome> {
        let mut deferred = None;

        for attempt in 1..=self.retry_budget {
            let reason = match self.fetch.fetch(&candidate.url).await {
                Ok(resp) if resp.is_success() => return Ok((resp, attempt)),
                Ok(resp) if matches!(resp.status, 429 | 503) => ReasonCode::RateLimited,
                Ok(resp) => {
                    debug!(status = resp.status, "non-success status");
                    ReasonCode::Unreachable
                }
                Err(e) => {
                    debug!(error = %e, "fetch failed");
                    classify(&e)
                }
            };

            let outcome = ValidationOutcome::attempt(candidate, reason, attempt);
            if !outcome.is_deferred() {
                return Err(outcome);
            }
            if attempt < self.retry_budget {
                let delay = self.backoff_for(attempt);
                warn!(%reason, attempt, delay_ms = delay.as_millis() as u64, "deferred, retrying");
                tokio::time::sleep(delay).await;
            }
            deferred = Some(outcome);
        }

        Err(match deferred {
            Some(outcome) => outcome.exhausted(),
            None => ValidationOutcome::reject(candidate, ReasonCode::Timeout, self.retry_budget),
        })
    }

    /// Exponential backoff: `backoff * 2^(attempt - 1)`.
    fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff.saturating_mul(factor)
    }
}

fn classify(error: &FetchError) -> ReasonCode {
    match error {
        FetchError::Timeout(_) => ReasonCode::Timeout,
        FetchError::Connect(_)
        | FetchError::Blocked(_)
        | FetchError::TooLarge { .. }
        | FetchError::InvalidUrl(_) => ReasonCode::Unreachable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use feedscout_fetch::MemoryFetch;
    use feedscout_shared::{Decision, SourceId, Strategy, parse_source_url};

    const URL: &str = "https://news.test/rss";

    fn candidate(url: &str, language: &str) -> Candidate {
        let url = parse_source_url(url).unwrap();
        Candidate {
            source_id: SourceId::for_url(&url),
            url,
            language: language.into(),
            category: "news".into(),
            strategy: Strategy::Hint,
            content_key: None,
            discovered_at: Utc::now(),
        }
    }

    fn rss(description: &str) -> String {
        format!(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>News</title>
<description>{description}</description><item><title>Item</title></item></channel></rss>"#
        )
    }

    fn long_text() -> String {
        "The cabinet approved a new scheme for rural schools today. ".repeat(10)
    }

    fn validator(fetch: MemoryFetch) -> (ValidatorAgent, DuplicateRegistry) {
        let duplicates = DuplicateRegistry::new();
        let agent = ValidatorAgent::new(
            Arc::new(fetch),
            &ValidationConfig::default(),
            duplicates.clone(),
        );
        (agent, duplicates)
    }

    #[tokio::test]
    async fn accepts_long_feed() {
        let (agent, duplicates) = validator(MemoryFetch::new().on_feed(URL, rss(&long_text())));
        let v = agent.validate(&candidate(URL, "en")).await;

        assert_eq!(v.outcome.decision, Decision::Accept);
        assert_eq!(v.outcome.reason, ReasonCode::Accepted);
        assert_eq!(v.outcome.attempts, 1);
        let hash = v.content_hash.unwrap();
        assert!(duplicates.is_claimed(&hash));
    }

    #[tokio::test]
    async fn short_feed_rejected() {
        let (agent, duplicates) = validator(MemoryFetch::new().on_feed(URL, rss("Too short")));
        let v = agent.validate(&candidate(URL, "en")).await;
        assert_eq!(v.outcome.reason, ReasonCode::ContentTooShort);
        let hash = v.content_hash.unwrap();
        assert!(!duplicates.is_claimed(&hash));
    }

    #[tokio::test]
    async fn empty_body_rejected() {
        let (agent, _) = validator(MemoryFetch::new().on_feed(URL, "   "));
        let v = agent.validate(&candidate(URL, "en")).await;
        assert_eq!(v.outcome.decision, Decision::Reject);
        assert_eq!(v.outcome.reason, ReasonCode::ContentTooShort);
    }

    #[tokio::test]
    async fn html_is_schema_mismatch() {
        let fetch = MemoryFetch::new().on(
            URL,
            FetchResponse::new(200, "<html><body>hello</body></html>")
                .with_header("content-type", "text/html"),
        );
        let (agent, _) = validator(fetch);
        let v = agent.validate(&candidate(URL, "en")).await;
        assert_eq!(v.outcome.reason, ReasonCode::SchemaMismatch);
    }

    #[tokio::test]
    async fn not_found_is_unreachable_without_retry() {
        let fetch = Arc::new(MemoryFetch::new().on(URL, FetchResponse::new(404, "")));
        let agent = ValidatorAgent::new(
            fetch.clone(),
            &ValidationConfig::default(),
            DuplicateRegistry::new(),
        );
        let v = agent.validate(&candidate(URL, "en")).await;
        assert_eq!(v.outcome.reason, ReasonCode::Unreachable);
        assert_eq!(fetch.calls(URL), 1);
    }

    #[tokio::test]
    async fn blocked_target_is_unreachable() {
        let fetch = MemoryFetch::new().on_error(URL, FetchError::Blocked("127.0.0.1".into()));
        let (agent, _) = validator(fetch);
        let v = agent.validate(&candidate(URL, "en")).await;
        assert_eq!(v.outcome.reason, ReasonCode::Unreachable);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_then_success_accepts() {
        let fetch = MemoryFetch::new().on_sequence(
            URL,
            vec![
                Err(FetchError::Timeout("slow".into())),
                Ok(FetchResponse::new(429, "")),
                Ok(FetchResponse::new(200, rss(&long_text()))),
            ],
        );
        let (agent, _) = validator(fetch);
        let v = agent.validate(&candidate(URL, "en")).await;
        assert!(v.outcome.is_accept());
        assert_eq!(v.outcome.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_rejects_with_transient_reason() {
        let fetch = Arc::new(MemoryFetch::new().on(URL, FetchResponse::new(503, "")));
        let agent = ValidatorAgent::new(
            fetch.clone(),
            &ValidationConfig::default(),
            DuplicateRegistry::new(),
        );

        let start = tokio::time::Instant::now();
        let v = agent.validate(&candidate(URL, "en")).await;
        assert_eq!(v.outcome.decision, Decision::Reject);
        assert_eq!(v.outcome.reason, ReasonCode::RateLimited);
        assert_eq!(v.outcome.attempts, 3);
        assert_eq!(fetch.calls(URL), 3);
        // 250ms + 500ms of backoff between the three attempts.
        assert!(start.elapsed() >= Duration::from_millis(750));
    }

    #[tokio::test]
    async fn duplicate_content_rejected_for_second_source() {
        let other = "https://mirror.test/rss";
        let body = rss(&long_text());
        let (agent, _) = validator(
            MemoryFetch::new()
                .on_feed(URL, body.clone())
                .on_feed(other, body),
        );

        let first = agent.validate(&candidate(URL, "en")).await;
        let second = agent.validate(&candidate(other, "en")).await;
        assert!(first.outcome.is_accept());
        assert_eq!(second.outcome.reason, ReasonCode::DuplicateContent);
        // The duplicate carries the hash it lost on.
        assert_eq!(second.content_hash, first.content_hash);
    }

    #[test]
    fn only_timeouts_are_transient() {
        assert_eq!(classify(&FetchError::Timeout("slow".into())), ReasonCode::Timeout);
        for error in [
            FetchError::Connect("refused".into()),
            FetchError::Blocked("127.0.0.1".into()),
            FetchError::TooLarge { limit: 10 },
            FetchError::InvalidUrl("nope".into()),
        ] {
            assert_eq!(classify(&error), ReasonCode::Unreachable, "{error}");
        }
    }

    #[tokio::test]
    async fn connect_error_is_not_retried() {
        let fetch = Arc::new(
            MemoryFetch::new().on_error(URL, FetchError::Connect("refused".into())),
        );
        let agent = ValidatorAgent::new(
            fetch.clone(),
            &ValidationConfig::default(),
            DuplicateRegistry::new(),
        );
        let v = agent.validate(&candidate(URL, "en")).await;
        assert_eq!(v.outcome.decision, Decision::Reject);
        assert_eq!(v.outcome.reason, ReasonCode::Unreachable);
        assert_eq!(fetch.calls(URL), 1);
    }

    #[tokio::test]
    async fn language_mismatch_rejected() {
        let (agent, _) = validator(MemoryFetch::new().on_feed(URL, rss(&long_text())));
        let v = agent.validate(&candidate(URL, "hi")).await;
        assert_eq!(v.outcome.reason, ReasonCode::LanguageImplausible);
    }

    #[test]
    fn backoff_doubles() {
        let agent = ValidatorAgent::new(
            Arc::new(MemoryFetch::new()),
            &ValidationConfig::default(),
            DuplicateRegistry::new(),
        );
        assert_eq!(agent.backoff_for(1), Duration::from_millis(250));
        assert_eq!(agent.backoff_for(2), Duration::from_millis(500));
        assert_eq!(agent.backoff_for(3), Duration::from_millis(1000));
    }
}
