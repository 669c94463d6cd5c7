//! End-of-run learning: trust scores, status transitions and the discovery
//! heuristics.
//!
//! The score update is a pure function over a source and the tally of its
//! outcomes in one run, so the result does not depend on the order in which
//! workers finished. [`learning_report`] summarises what the store has
//! learned so far.

mod heuristics;
mod report;
mod trust;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use feedscout_shared::{AppConfig, DiscoveryConfig, Source, TrustConfig, ValidationOutcome};
use feedscout_storage::{RunRecord, ValidationStore};

pub use heuristics::update_heuristics;
pub use report::{
    CategoryStats, Convergence, LearningReport, PatternStats, StrategyStats, learning_report,
};
pub use trust::{
    RunTally, apply_run, grant_probation, next_status, rehabilitate, replay_trust,
    tally_by_source,
};

/// Folds a run's outcomes into the store.
#[derive(Debug, Clone)]
pub struct LearningAgent {
    trust: TrustConfig,
    discovery: DiscoveryConfig,
}

impl LearningAgent {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            trust: config.trust.clone(),
            discovery: config.discovery.clone(),
        }
    }

    /// Apply one run's outcomes to every touched source and to the pattern
    /// heuristics. Returns the updated sources in identifier order.
    ///
    /// Outcomes for sources missing from the store are skipped; the
    /// coordinator registers new sources before calling this.
    #[instrument(skip_all, fields(run_no = run_no, outcomes = outcomes.len()))]
    pub fn learn(
        &self,
        store: &mut ValidationStore,
        outcomes: &[ValidationOutcome],
        run_no: u64,
        now: DateTime<Utc>,
    ) -> Vec<Source> {
        let mut updated = Vec::new();
        let (mut new_sources, mut new_accepted) = (0, 0);

        for (id, tally) in tally_by_source(outcomes) {
            let Some(current) = store.get(&id) else {
                warn!(source = %id, "outcome for unknown source skipped");
                continue;
            };

            if current.last_checked_run.is_none() {
                new_sources += 1;
                if tally.accepted > 0 {
                    new_accepted += 1;
                }
            }

            let next = apply_run(current, tally, &self.trust, run_no, now);
            if next.status != current.status {
                info!(
                    source = %id,
                    from = %current.status,
                    to = %next.status,
                    score = next.trust_score,
                    failures = next.consecutive_failures,
                    "status transition"
                );
            }
            store.upsert(next.clone());
            updated.push(next);
        }

        let disabled = update_heuristics(&mut store.heuristics, outcomes, &self.discovery, run_no);
        for pattern in &disabled {
            info!(%pattern, until_run = run_no + self.discovery.cooldown_runs, "pattern cooled down");
        }

        store.record_run(RunRecord {
            run_no,
            finished_at: now,
            candidates: outcomes.len(),
            accepted: outcomes.iter().filter(|o| o.is_accept()).count(),
            new_sources,
            new_accepted,
        });

        updated
    }

    /// Put long-excluded quarantined sources on probation before discovery.
    pub fn grant_probation(&self, store: &mut ValidationStore, run_no: u64) -> usize {
        grant_probation(store, &self.trust, run_no)
    }
}
