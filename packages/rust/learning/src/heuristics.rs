use std::collections::BTreeMap;

use feedscout_shared::{DiscoveryConfig, ValidationOutcome};
use feedscout_storage::PatternState;

use crate::trust::RunTally;

/// Fold this run's permutation outcomes into the per-pattern state and cool
/// down patterns accepted below the floor. Returns the ids newly disabled.
pub fn update_heuristics(
    heuristics: &mut BTreeMap<String, PatternState>,
    outcomes: &[ValidationOutcome],
    config: &DiscoveryConfig,
    run_no: u64,
) -> Vec<String> {
    let mut per_pattern: BTreeMap<&str, RunTally> = BTreeMap::new();
    for outcome in outcomes {
        if let Some(pattern) = outcome.strategy.pattern_id() {
            per_pattern.entry(pattern).or_default().record(outcome.decision);
        }
    }

    let mut disabled = Vec::new();
    for (pattern, tally) in per_pattern {
        let state = heuristics.entry(pattern.to_string()).or_default();
        let rate = tally.value();
        state.accepted_total += u64::from(tally.accepted);
        state.rejected_total += u64::from(tally.total - tally.accepted);
        state.last_rate = Some(rate);

        if tally.total as usize >= config.min_pattern_samples && rate < config.acceptance_floor {
            state.disabled_through_run = Some(run_no + config.cooldown_runs);
            disabled.push(pattern.to_string());
        }
    }
    disabled
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use feedscout_shared::{Candidate, ReasonCode, SourceId, Strategy, parse_source_url};

    fn outcome(n: usize, pattern: &str, accept: bool) -> ValidationOutcome {
        let url = parse_source_url(&format!("https://p.test/{pattern}/{n}")).unwrap();
        let c = Candidate {
            source_id: SourceId::for_url(&url),
            url,
            language: "en".into(),
            category: "news".into(),
            strategy: Strategy::Permutation {
                pattern: pattern.into(),
            },
            content_key: None,
            discovered_at: Utc::now(),
        };
        if accept {
            ValidationOutcome::accept(&c, 1)
        } else {
            ValidationOutcome::reject(&c, ReasonCode::Unreachable, 1)
        }
    }

    #[test]
    fn low_rate_pattern_disabled_for_cooldown() {
        let mut h = BTreeMap::new();
        let outcomes: Vec<_> = (0..4).map(|n| outcome(n, "bad", false)).collect();
        let disabled = update_heuristics(&mut h, &outcomes, &DiscoveryConfig::default(), 2);

        assert_eq!(disabled, vec!["bad".to_string()]);
        let state = &h["bad"];
        assert_eq!(state.disabled_through_run, Some(5));
        assert_eq!(state.rejected_total, 4);
        assert_eq!(state.last_rate, Some(0.0));
        assert!(!state.is_enabled(5));
        assert!(state.is_enabled(6));
    }

    #[test]
    fn too_few_samples_keeps_pattern() {
        let mut h = BTreeMap::new();
        let outcomes: Vec<_> = (0..2).map(|n| outcome(n, "new", false)).collect();
        assert!(update_heuristics(&mut h, &outcomes, &DiscoveryConfig::default(), 1).is_empty());
        assert!(h["new"].is_enabled(2));
    }

    #[test]
    fn healthy_pattern_stays_enabled() {
        let mut h = BTreeMap::new();
        let mut outcomes: Vec<_> = (0..3).map(|n| outcome(n, "ok", false)).collect();
        outcomes.push(outcome(3, "ok", true));
        update_heuristics(&mut h, &outcomes, &DiscoveryConfig::default(), 1);
        assert_eq!(h["ok"].accepted_total, 1);
        assert_eq!(h["ok"].last_rate, Some(0.25));
        assert!(h["ok"].disabled_through_run.is_none());
    }

    #[test]
    fn non_permutation_outcomes_ignored() {
        let mut h = BTreeMap::new();
        let url = parse_source_url("https://hint.test/rss").unwrap();
        let c = Candidate {
            source_id: SourceId::for_url(&url),
            url,
            language: "en".into(),
            category: "news".into(),
            strategy: Strategy::Hint,
            content_key: None,
            discovered_at: Utc::now(),
        };
        let outcomes = vec![ValidationOutcome::reject(&c, ReasonCode::Unreachable, 1)];
        update_heuristics(&mut h, &outcomes, &DiscoveryConfig::default(), 1);
        assert!(h.is_empty());
    }
}
