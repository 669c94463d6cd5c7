//! Read-only summary of what the store has learned: per-pattern and
//! per-strategy acceptance, per-category source health, and whether
//! discovery is still finding new sources.

use std::collections::BTreeMap;

use serde::Serialize;

use feedscout_shared::{Decision, PatternConfig, SourceStatus};
use feedscout_storage::ValidationStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearningReport {
    pub runs: u64,
    pub patterns: Vec<PatternStats>,
    pub strategies: Vec<StrategyStats>,
    pub categories: Vec<CategoryStats>,
    /// Strategy with the best acceptance rate in the outcome log.
    pub recommended_strategy: Option<String>,
    pub convergence: Convergence,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternStats {
    pub id: String,
    pub accepted: u64,
    pub rejected: u64,
    pub last_rate: Option<f64>,
    pub disabled_through_run: Option<u64>,
    /// Skipped by the next run's discovery.
    pub cooling_down: bool,
}

impl PatternStats {
    fn empty(id: &str) -> Self {
        Self {
            id: id.to_string(),
            accepted: 0,
            rejected: 0,
            last_rate: None,
            disabled_through_run: None,
            cooling_down: false,
        }
    }

    pub fn rate(&self) -> Option<f64> {
        rate(self.accepted, self.rejected)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyStats {
    pub strategy: String,
    pub accepted: u64,
    pub rejected: u64,
}

impl StrategyStats {
    pub fn rate(&self) -> Option<f64> {
        rate(self.accepted, self.rejected)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryStats {
    pub category: String,
    pub sources: usize,
    pub trusted: usize,
    pub quarantined: usize,
    pub rejected: usize,
    /// Sum of per-source accept counts.
    pub accepts: u64,
    /// Sum of per-source reject counts.
    pub rejects: u64,
}

/// Whether recent runs still turn up new accepted sources.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum Convergence {
    /// Fewer runs recorded than the assessment window.
    TooFewRuns { runs: usize, window: usize },
    /// No new accepted sources in the window.
    Converged,
    /// Under one new accepted source per run on average.
    Diminishing { average: f64 },
    /// Under three new accepted sources per run on average.
    Slowing { average: f64 },
    Discovering { average: f64 },
}

impl Convergence {
    pub fn is_converging(&self) -> bool {
        matches!(
            self,
            Self::Converged | Self::Diminishing { .. } | Self::Slowing { .. }
        )
    }
}

impl std::fmt::Display for Convergence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewRuns { runs, window } => {
                write!(f, "not enough runs ({runs} of {window})")
            }
            Self::Converged => f.write_str("converged: no new sources in recent runs"),
            Self::Diminishing { average } => {
                write!(f, "diminishing returns ({average:.1} new sources/run)")
            }
            Self::Slowing { average } => write!(f, "slowing ({average:.1} new sources/run)"),
            Self::Discovering { average } => {
                write!(f, "still discovering ({average:.1} new sources/run)")
            }
        }
    }
}

/// Summarise the store. `patterns` adds configured patterns that have not
/// produced outcomes yet; `window` is the number of recent runs used for the
/// convergence assessment.
pub fn learning_report(
    store: &ValidationStore,
    patterns: &[PatternConfig],
    window: usize,
) -> LearningReport {
    let next_run = store.run_sequence + 1;

    let mut pattern_stats: BTreeMap<&str, PatternStats> = patterns
        .iter()
        .map(|p| (p.id.as_str(), PatternStats::empty(&p.id)))
        .collect();
    for (id, state) in &store.heuristics {
        let stats = pattern_stats
            .entry(id.as_str())
            .or_insert_with(|| PatternStats::empty(id));
        stats.accepted = state.accepted_total;
        stats.rejected = state.rejected_total;
        stats.last_rate = state.last_rate;
        stats.disabled_through_run = state.disabled_through_run;
        stats.cooling_down = !state.is_enabled(next_run);
    }

    let mut strategy_stats: BTreeMap<&str, StrategyStats> = BTreeMap::new();
    for entry in &store.outcome_log {
        let Some(strategy) = &entry.strategy else {
            continue;
        };
        let stats = strategy_stats
            .entry(strategy.kind())
            .or_insert_with(|| StrategyStats {
                strategy: strategy.kind().to_string(),
                accepted: 0,
                rejected: 0,
            });
        match entry.decision {
            Decision::Accept => stats.accepted += 1,
            Decision::Reject | Decision::Defer => stats.rejected += 1,
        }
    }
    let strategies: Vec<StrategyStats> = strategy_stats.into_values().collect();

    let mut categories: BTreeMap<&str, CategoryStats> = BTreeMap::new();
    for source in store.sources.values() {
        let stats = categories
            .entry(source.category.as_str())
            .or_insert_with(|| CategoryStats {
                category: source.category.clone(),
                ..CategoryStats::default()
            });
        stats.sources += 1;
        stats.accepts += source.accept_count;
        stats.rejects += source.reject_count;
        match source.status {
            SourceStatus::Trusted => stats.trusted += 1,
            SourceStatus::Quarantined => stats.quarantined += 1,
            SourceStatus::Rejected => stats.rejected += 1,
            SourceStatus::Unvalidated => {}
        }
    }

    LearningReport {
        runs: store.run_sequence,
        patterns: pattern_stats.into_values().collect(),
        recommended_strategy: recommend(&strategies),
        strategies,
        categories: categories.into_values().collect(),
        convergence: assess_convergence(store, window),
    }
}

/// Highest acceptance rate wins; more outcomes break ties.
fn recommend(strategies: &[StrategyStats]) -> Option<String> {
    strategies
        .iter()
        .filter_map(|s| s.rate().map(|r| (r, s.accepted + s.rejected, s)))
        .max_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
        .map(|(_, _, s)| s.strategy.clone())
}

fn assess_convergence(store: &ValidationStore, window: usize) -> Convergence {
    let window = window.max(1);
    let runs = store.run_history.len();
    if runs < window {
        return Convergence::TooFewRuns { runs, window };
    }

    let recent = &store.run_history[runs - window..];
    let found: usize = recent.iter().map(|r| r.new_accepted).sum();
    let average = found as f64 / window as f64;

    if found == 0 {
        Convergence::Converged
    } else if average < 1.0 {
        Convergence::Diminishing { average }
    } else if average < 3.0 {
        Convergence::Slowing { average }
    } else {
        Convergence::Discovering { average }
    }
}

fn rate(accepted: u64, rejected: u64) -> Option<f64> {
    let total = accepted + rejected;
    (total > 0).then(|| accepted as f64 / total as f64)
}
