//! Core domain types: sources, candidates, outcomes and content records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::ids::{content_id_for, source_id_for};

/// Current schema version for the persisted validation store.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// SourceId
// ---------------------------------------------------------------------------

/// Stable identifier of a source: truncated SHA-256 of its normalized URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub String);

impl SourceId {
    /// Derive the identifier for a URL.
    pub fn for_url(url: &Url) -> Self {
        source_id_for(url)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Lifecycle state of a source. `Rejected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceStatus {
    Unvalidated,
    Trusted,
    Quarantined,
    Rejected,
}

impl SourceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unvalidated => "unvalidated",
            Self::Trusted => "trusted",
            Self::Quarantined => "quarantined",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unvalidated" => Ok(Self::Unvalidated),
            "trusted" => Ok(Self::Trusted),
            "quarantined" => Ok(Self::Quarantined),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown source status: {other}")),
        }
    }
}

/// A durable, identified origin of content.
///
/// Only the learning agent changes `trust_score`, `status` and the failure
/// counters; every such update bumps `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub url: Url,
    /// Declared BCP-47-ish language tag (e.g. `hi`, `en-IN`).
    pub language: String,
    pub category: String,
    pub discovered_at: DateTime<Utc>,
    /// Smoothed reliability estimate in `[0, 1]`.
    pub trust_score: f64,
    pub status: SourceStatus,
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Run sequence number of the last learning update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_run: Option<u64>,
    /// A quarantined source on probation is re-emitted once regardless of its failure count.
    #[serde(default)]
    pub probation: bool,
    #[serde(default)]
    pub accept_count: u64,
    #[serde(default)]
    pub reject_count: u64,
    /// Strategy that first proposed this source.
    pub origin: Strategy,
    #[serde(default)]
    pub version: u64,
}

impl Source {
    /// A freshly discovered source: score 0, unvalidated, no history.
    pub fn discovered(
        url: Url,
        language: impl Into<String>,
        category: impl Into<String>,
        origin: Strategy,
        discovered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SourceId::for_url(&url),
            url,
            language: language.into(),
            category: category.into(),
            discovered_at,
            trust_score: 0.0,
            status: SourceStatus::Unvalidated,
            consecutive_failures: 0,
            last_checked_at: None,
            last_checked_run: None,
            probation: false,
            accept_count: 0,
            reject_count: 0,
            origin,
            version: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// How a candidate was proposed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Strategy {
    /// Re-validation of a source already in the store.
    Recheck,
    /// Expansion of a publisher template over language editions.
    Permutation { pattern: String },
    /// Externally supplied seed.
    Hint,
}

impl Strategy {
    /// Pattern id for permutation candidates.
    pub fn pattern_id(&self) -> Option<&str> {
        match self {
            Self::Permutation { pattern } => Some(pattern),
            _ => None,
        }
    }

    /// Strategy name without the pattern id.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Recheck => "recheck",
            Self::Permutation { .. } => "permutation",
            Self::Hint => "hint",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recheck => f.write_str("recheck"),
            Self::Permutation { pattern } => write!(f, "permutation:{pattern}"),
            Self::Hint => f.write_str("hint"),
        }
    }
}

/// Ephemeral proposal for a source within one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub source_id: SourceId,
    /// Normalized URL.
    pub url: Url,
    pub language: String,
    pub category: String,
    pub strategy: Strategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_key: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

impl Candidate {
    /// Key used to derive the content id; defaults to the normalized URL.
    pub fn content_key(&self) -> &str {
        self.content_key.as_deref().unwrap_or(self.url.as_str())
    }

    pub fn content_id(&self) -> String {
        content_id_for(&self.source_id, self.content_key())
    }
}

// ---------------------------------------------------------------------------
// ValidationOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    Accept,
    Reject,
    /// Transient failure; retried before being converted to `Reject`.
    Defer,
}

/// Why a candidate was accepted or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonCode {
    Accepted,
    Unreachable,
    Timeout,
    RateLimited,
    SchemaMismatch,
    ContentTooShort,
    LanguageImplausible,
    DuplicateContent,
    RetrievalFailed,
    /// Unresolved when the run deadline expired.
    TimedOut,
    /// Worker task panicked or was cancelled.
    WorkerFailed,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Unreachable => "unreachable",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate-limited",
            Self::SchemaMismatch => "schema-mismatch",
            Self::ContentTooShort => "content-too-short",
            Self::LanguageImplausible => "language-implausible",
            Self::DuplicateContent => "duplicate-content",
            Self::RetrievalFailed => "retrieval-failed",
            Self::TimedOut => "timed-out",
            Self::WorkerFailed => "worker-failed",
        }
    }

    /// Transient reasons are retried within the attempt budget.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimited)
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of validating one candidate. Folded into trust history only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub source_id: SourceId,
    pub decision: Decision,
    pub reason: ReasonCode,
    pub observed_at: DateTime<Utc>,
    /// Fetch attempts spent (0 when no fetch happened).
    #[serde(default)]
    pub attempts: u32,
    pub strategy: Strategy,
}

impl ValidationOutcome {
    pub fn accept(candidate: &Candidate, attempts: u32) -> Self {
        Self::new(candidate, Decision::Accept, ReasonCode::Accepted, attempts)
    }

    pub fn reject(candidate: &Candidate, reason: ReasonCode, attempts: u32) -> Self {
        Self::new(candidate, Decision::Reject, reason, attempts)
    }

    /// Outcome of one failed fetch attempt: `Defer` for transient reasons,
    /// `Reject` otherwise.
    pub fn attempt(candidate: &Candidate, reason: ReasonCode, attempts: u32) -> Self {
        let decision = if reason.is_transient() {
            Decision::Defer
        } else {
            Decision::Reject
        };
        Self::new(candidate, decision, reason, attempts)
    }

    /// A deferral whose retry budget ran out becomes a reject with the same reason.
    pub fn exhausted(mut self) -> Self {
        if self.decision == Decision::Defer {
            self.decision = Decision::Reject;
        }
        self
    }

    pub fn is_deferred(&self) -> bool {
        self.decision == Decision::Defer
    }

    fn new(candidate: &Candidate, decision: Decision, reason: ReasonCode, attempts: u32) -> Self {
        Self {
            source_id: candidate.source_id.clone(),
            decision,
            reason,
            observed_at: Utc::now(),
            attempts,
            strategy: candidate.strategy.clone(),
        }
    }

    pub fn is_accept(&self) -> bool {
        self.decision == Decision::Accept
    }
}

// ---------------------------------------------------------------------------
// ContentRecord
// ---------------------------------------------------------------------------

/// Format a document was recognised as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentFormat {
    Rss,
    Atom,
    JsonFeed,
    Json,
}

/// Normalized, validated content item ready for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub content_id: String,
    /// Non-owning reference to the source.
    pub source_id: SourceId,
    pub url: Url,
    pub category: String,
    pub language: String,
    pub title: String,
    pub body: String,
    /// Canonical publication time; ingestion time when the document has none.
    pub published_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    /// SHA-256 of normalized title and body.
    pub content_hash: String,
    pub format: DocumentFormat,
}

// ---------------------------------------------------------------------------
// Seeds and run summary
// ---------------------------------------------------------------------------

/// Externally supplied hint: a URL with declared language and category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed {
    pub url: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_language() -> String {
    "en".into()
}
fn default_category() -> String {
    "general".into()
}

/// What one run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub accepted_count: usize,
    pub rejected_count: usize,
    /// Subset of `rejected_count` unresolved at the run deadline.
    pub timed_out_count: usize,
    pub content_records: Vec<ContentRecord>,
    pub updated_sources: Vec<Source>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    /// An empty summary, returned alongside a fatal abort.
    pub fn empty(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            accepted_count: 0,
            rejected_count: 0,
            timed_out_count: 0,
            content_records: Vec::new(),
            updated_sources: Vec::new(),
            started_at,
            finished_at: None,
        }
    }
}
