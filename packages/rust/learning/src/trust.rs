use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use feedscout_shared::{
    Decision, Source, SourceId, SourceStatus, TrustConfig, ValidationOutcome,
};
use feedscout_storage::{OutcomeLogEntry, ValidationStore};

/// Accepts out of resolved outcomes for one source in one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTally {
    pub accepted: u32,
    pub total: u32,
}

impl RunTally {
    pub fn record(&mut self, decision: Decision) {
        // An unresolved deferral counts as a reject.
        self.total += 1;
        if decision == Decision::Accept {
            self.accepted += 1;
        }
    }

    /// Outcome value in `[0, 1]`.
    pub fn value(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.accepted) / f64::from(self.total)
        }
    }
}

/// Group outcomes by source.
pub fn tally_by_source(outcomes: &[ValidationOutcome]) -> BTreeMap<SourceId, RunTally> {
    let mut tallies: BTreeMap<SourceId, RunTally> = BTreeMap::new();
    for outcome in outcomes {
        tallies
            .entry(outcome.source_id.clone())
            .or_default()
            .record(outcome.decision);
    }
    tallies
}

fn smooth(old: f64, value: f64, alpha: f64) -> f64 {
    (old * (1.0 - alpha) + value * alpha).clamp(0.0, 1.0)
}

/// The source after one run's worth of outcomes.
pub fn apply_run(
    source: &Source,
    tally: RunTally,
    config: &TrustConfig,
    run_no: u64,
    now: DateTime<Utc>,
) -> Source {
    let mut next = source.clone();
    next.trust_score = smooth(source.trust_score, tally.value(), config.alpha);

    if tally.accepted > 0 {
        next.consecutive_failures = 0;
    } else {
        next.consecutive_failures = source.consecutive_failures.saturating_add(1);
    }

    next.accept_count += u64::from(tally.accepted);
    next.reject_count += u64::from(tally.total - tally.accepted);
    next.last_checked_at = Some(now);
    next.last_checked_run = Some(run_no);
    next.probation = false;
    next.status = next_status(source.status, &next, tally.accepted > 0, config);
    next.version += 1;
    next
}

/// Status after an update, given the updated score and failure count.
pub fn next_status(
    current: SourceStatus,
    updated: &Source,
    had_accept: bool,
    config: &TrustConfig,
) -> SourceStatus {
    let score = updated.trust_score;
    let failures = updated.consecutive_failures;
    let promoted = had_accept && score >= config.upper;

    match current {
        SourceStatus::Unvalidated if promoted => SourceStatus::Trusted,
        SourceStatus::Unvalidated if failures >= config.quarantine_ceiling => {
            SourceStatus::Quarantined
        }
        SourceStatus::Trusted if score < config.lower || failures >= config.quarantine_ceiling => {
            SourceStatus::Quarantined
        }
        SourceStatus::Quarantined if failures >= config.reject_ceiling => SourceStatus::Rejected,
        SourceStatus::Quarantined if promoted => SourceStatus::Trusted,
        other => other,
    }
}

/// Mark quarantined sources held back by the ceiling for one more attempt
/// once `probation_interval_runs` have passed since their last check.
pub fn grant_probation(store: &mut ValidationStore, config: &TrustConfig, run_no: u64) -> usize {
    if config.probation_interval_runs == 0 {
        return 0;
    }

    let mut granted = 0;
    for source in store.sources.values_mut() {
        let excluded = source.status == SourceStatus::Quarantined
            && source.consecutive_failures >= config.quarantine_ceiling
            && !source.probation;
        let due = source
            .last_checked_run
            .unwrap_or(0)
            .saturating_add(config.probation_interval_runs)
            <= run_no;
        if excluded && due {
            source.probation = true;
            source.version += 1;
            granted += 1;
            tracing::info!(source = %source.id, run_no, "quarantined source on probation");
        }
    }
    granted
}

/// Manually put a quarantined source on probation. Returns `false` for any
/// other status.
pub fn rehabilitate(source: &mut Source) -> bool {
    if source.status != SourceStatus::Quarantined {
        return false;
    }
    if !source.probation {
        source.probation = true;
        source.version += 1;
    }
    true
}

/// Recompute a trust score from scratch over logged outcomes, one update
/// per run in log order.
pub fn replay_trust<'a>(
    entries: impl IntoIterator<Item = &'a OutcomeLogEntry>,
    config: &TrustConfig,
) -> f64 {
    let mut runs: Vec<(Uuid, RunTally)> = Vec::new();
    for entry in entries {
        match runs.last_mut() {
            Some((run_id, tally)) if *run_id == entry.run_id => tally.record(entry.decision),
            _ => {
                let mut tally = RunTally::default();
                tally.record(entry.decision);
                runs.push((entry.run_id, tally));
            }
        }
    }

    runs.iter()
        .fold(0.0, |score, (_, tally)| smooth(score, tally.value(), config.alpha))
}
