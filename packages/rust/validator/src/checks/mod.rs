//! Content quality checks run after a document has been fetched and parsed.
//!
//! Checks are tried in registration order and the first failure wins, so the
//! reason code on a rejected outcome always names the earliest failing check.

mod duplicate;
mod language;
mod length;

use feedscout_normalize::Document;
use feedscout_shared::{Candidate, ReasonCode, ValidationConfig};

pub use duplicate::{DuplicateCheck, DuplicateRegistry};
pub use language::{LanguageCheck, language_tag_for};
pub use length::MinLengthCheck;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Everything a check may look at for one candidate.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a> {
    pub candidate: &'a Candidate,
    pub document: &'a Document,
    pub content_hash: &'a str,
}

/// A check that did not pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFailure {
    pub reason: ReasonCode,
    pub detail: String,
}

impl CheckFailure {
    pub fn new(reason: ReasonCode, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.reason, self.detail)
    }
}

/// One quality gate over a parsed document.
pub trait QualityCheck: Send + Sync {
    fn check(&self, ctx: &CheckContext<'_>) -> Result<(), CheckFailure>;

    /// Check name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds quality checks in evaluation order.
pub struct CheckRegistry {
    checks: Vec<Box<dyn QualityCheck>>,
}

impl CheckRegistry {
    /// Built-in checks: length, then language, then the duplicate claim.
    ///
    /// The duplicate check claims the hash, so it must stay last: a document
    /// rejected by an earlier check never holds a claim.
    pub fn new(config: &ValidationConfig, duplicates: DuplicateRegistry) -> Self {
        Self {
            checks: vec![
                Box::new(MinLengthCheck::new(config.min_content_chars)),
                Box::new(LanguageCheck::new(config.min_script_ratio)),
                Box::new(DuplicateCheck::new(duplicates)),
            ],
        }
    }

    pub fn empty() -> Self {
        Self { checks: Vec::new() }
    }

    /// Append a check after the registered ones.
    pub fn with(mut self, check: impl QualityCheck + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    /// Run every check in order; stop at the first failure.
    pub fn run(&self, ctx: &CheckContext<'_>) -> Result<(), CheckFailure> {
        for check in &self.checks {
            if let Err(failure) = check.check(ctx) {
                tracing::debug!(check = check.name(), %failure, "quality check failed");
                return Err(failure);
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{candidate, document};
    use super::*;

    struct AlwaysFails;

    impl QualityCheck for AlwaysFails {
        fn check(&self, _ctx: &CheckContext<'_>) -> Result<(), CheckFailure> {
            Err(CheckFailure::new(ReasonCode::SchemaMismatch, "always"))
        }

        fn name(&self) -> &str {
            "always-fails"
        }
    }

    #[test]
    fn builtin_order() {
        let registry = CheckRegistry::new(&ValidationConfig::default(), DuplicateRegistry::new());
        assert_eq!(registry.names(), vec!["min-length", "language", "duplicate"]);
    }

    #[test]
    fn first_failure_short_circuits() {
        let duplicates = DuplicateRegistry::new();
        let registry = CheckRegistry::new(&ValidationConfig::default(), duplicates.clone());
        let cand = candidate("en");
        let doc = document("too short", None);
        let ctx = CheckContext {
            candidate: &cand,
            document: &doc,
            content_hash: "h1",
        };

        let failure = registry.run(&ctx).unwrap_err();
        assert_eq!(failure.reason, ReasonCode::ContentTooShort);
        // The duplicate check never ran, so nothing was claimed.
        assert!(duplicates.claim("h1"));
    }

    #[test]
    fn appended_checks_run_last() {
        let registry = CheckRegistry::empty().with(AlwaysFails);
        let cand = candidate("en");
        let doc = document("body", None);
        let ctx = CheckContext {
            candidate: &cand,
            document: &doc,
            content_hash: "h",
        };
        assert_eq!(registry.names(), vec!["always-fails"]);
        assert!(registry.run(&ctx).is_err());
    }
}
