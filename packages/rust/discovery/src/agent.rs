use std::collections::HashSet;

use chrono::{DateTime, Utc};
use feedscout_shared::{
    AppConfig, Candidate, PatternConfig, Seed, Source, SourceId, SourceStatus, Strategy,
    parse_source_url,
};
use feedscout_storage::ValidationStore;
use tracing::{debug, warn};

/// Proposes this run's candidates from the store snapshot, the configured
/// patterns and the hint seeds. Pure: no I/O happens here.
#[derive(Debug, Clone)]
pub struct FeedDiscoveryAgent {
    patterns: Vec<PatternConfig>,
    quarantine_ceiling: u32,
    max_candidates: usize,
}

impl FeedDiscoveryAgent {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            patterns: config.discovery.patterns.clone(),
            quarantine_ceiling: config.trust.quarantine_ceiling,
            max_candidates: config.run.max_candidates,
        }
    }

    /// Lazily yield candidates: rechecks first, then pattern permutations for
    /// unseen sources, then hints. Duplicates collapse onto the first proposal.
    pub fn discover<'a>(
        &'a self,
        store: &'a ValidationStore,
        seeds: &'a [Seed],
        run_no: u64,
    ) -> impl Iterator<Item = Candidate> + 'a {
        let now = Utc::now();

        let rechecks = store
            .sources
            .values()
            .filter(move |s| self.is_eligible(s))
            .map(move |s| recheck_candidate(s, now));

        let permutations = self
            .patterns
            .iter()
            .filter(move |p| {
                let enabled = store.pattern_enabled(&p.id, run_no);
                if !enabled {
                    debug!(pattern = %p.id, run_no, "pattern cooling down, skipped");
                }
                enabled
            })
            .flat_map(move |p| expand_pattern(p, now))
            .filter(move |c| !store.contains(&c.source_id));

        let hints = seeds
            .iter()
            .filter_map(move |seed| hint_candidate(seed, now))
            .filter(move |c| store.get(&c.source_id).is_none_or(|s| self.is_eligible(s)));

        let mut seen: HashSet<SourceId> = HashSet::new();
        rechecks
            .chain(permutations)
            .chain(hints)
            .filter(move |c| seen.insert(c.source_id.clone()))
            .take(self.max_candidates)
    }

    /// Whether a known source may be proposed at all this run.
    pub fn is_eligible(&self, source: &Source) -> bool {
        match source.status {
            SourceStatus::Trusted | SourceStatus::Unvalidated => true,
            SourceStatus::Quarantined => {
                source.consecutive_failures < self.quarantine_ceiling || source.probation
            }
            SourceStatus::Rejected => false,
        }
    }
}

fn recheck_candidate(source: &Source, now: DateTime<Utc>) -> Candidate {
    Candidate {
        source_id: source.id.clone(),
        url: source.url.clone(),
        language: source.language.clone(),
        category: source.category.clone(),
        strategy: Strategy::Recheck,
        content_key: None,
        discovered_at: now,
    }
}

fn hint_candidate(seed: &Seed, now: DateTime<Utc>) -> Option<Candidate> {
    let url = match parse_source_url(&seed.url) {
        Ok(url) => url,
        Err(e) => {
            warn!(url = %seed.url, error = %e, "skipping invalid seed");
            return None;
        }
    };
    Some(Candidate {
        source_id: SourceId::for_url(&url),
        url,
        language: seed.language.clone(),
        category: seed.category.clone(),
        strategy: Strategy::Hint,
        content_key: None,
        discovered_at: now,
    })
}

/// Expand one publisher template over its language editions.
fn expand_pattern(
    pattern: &PatternConfig,
    now: DateTime<Utc>,
) -> impl Iterator<Item = Candidate> + '_ {
    pattern.editions.iter().filter_map(move |edition| {
        let raw = pattern
            .template
            .replace("{edition}", &edition.code)
            .replace("{lang}", &edition.language);

        let url = match parse_source_url(&raw) {
            Ok(url) => url,
            Err(e) => {
                warn!(pattern = %pattern.id, url = %raw, error = %e, "pattern produced invalid URL");
                return None;
            }
        };

        Some(Candidate {
            source_id: SourceId::for_url(&url),
            url,
            language: edition.language.clone(),
            category: pattern.category.clone(),
            strategy: Strategy::Permutation {
                pattern: pattern.id.clone(),
            },
            content_key: None,
            discovered_at: now,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedscout_shared::Edition;
    use feedscout_storage::PatternState;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.discovery.patterns = vec![PatternConfig {
            id: "pib".into(),
            template: "https://pib.gov.in/RssMain.aspx?ModId=6&Lang={edition}&Regid=3".into(),
            category: "government".into(),
            editions: vec![
                Edition {
                    code: "1".into(),
                    language: "en".into(),
                },
                Edition {
                    code: "2".into(),
                    language: "hi".into(),
                },
            ],
        }];
        config
    }

    fn seed(url: &str) -> Seed {
        Seed {
            url: url.into(),
            language: "en".into(),
            category: "news".into(),
        }
    }

    fn source(url: &str, status: SourceStatus, failures: u32) -> Source {
        let url = parse_source_url(url).unwrap();
        let mut s = Source::discovered(url, "en", "news", Strategy::Hint, Utc::now());
        s.status = status;
        s.consecutive_failures = failures;
        s
    }

    #[test]
    fn empty_store_yields_permutations_then_hints() {
        let agent = FeedDiscoveryAgent::new(&config());
        let store = ValidationStore::default();
        let seeds = vec![seed("https://news.test/rss")];

        let candidates: Vec<_> = agent.discover(&store, &seeds, 1).collect();
        assert_eq!(candidates.len(), 3);
        assert_eq!(
            candidates[0].url.as_str(),
            "https://pib.gov.in/RssMain.aspx?Lang=1&ModId=6&Regid=3"
        );
        assert_eq!(candidates[1].language, "hi");
        assert_eq!(candidates[2].strategy, Strategy::Hint);
    }

    #[test]
    fn rejected_sources_never_emitted() {
        let agent = FeedDiscoveryAgent::new(&config());
        let mut store = ValidationStore::default();
        store.upsert(source("https://dead.test/rss", SourceStatus::Rejected, 12));

        // Not by recheck, and not by a hint for the same URL either.
        let seeds = vec![seed("https://dead.test/rss/")];
        let ids: Vec<_> = agent
            .discover(&store, &seeds, 1)
            .map(|c| c.url.to_string())
            .collect();
        assert!(!ids.iter().any(|u| u.contains("dead.test")));
    }

    #[test]
    fn quarantine_ceiling_excludes() {
        let agent = FeedDiscoveryAgent::new(&config());
        let mut store = ValidationStore::default();
        store.upsert(source("https://below.test/rss", SourceStatus::Quarantined, 2));
        store.upsert(source("https://at.test/rss", SourceStatus::Quarantined, 3));
        let mut probation = source("https://probation.test/rss", SourceStatus::Quarantined, 5);
        probation.probation = true;
        store.upsert(probation);

        let urls: Vec<_> = agent
            .discover(&store, &[], 1)
            .filter(|c| c.strategy == Strategy::Recheck)
            .map(|c| c.url.host_str().unwrap_or_default().to_string())
            .collect();
        assert!(urls.contains(&"below.test".to_string()));
        assert!(urls.contains(&"probation.test".to_string()));
        assert!(!urls.contains(&"at.test".to_string()));
    }

    #[test]
    fn duplicates_collapse_to_first_strategy() {
        let agent = FeedDiscoveryAgent::new(&config());
        let mut store = ValidationStore::default();
        store.upsert(source("https://known.test/rss", SourceStatus::Trusted, 0));

        let seeds = vec![
            seed("https://known.test/rss#dup"),
            seed("https://pib.gov.in/RssMain.aspx?Regid=3&Lang=2&ModId=6"),
            seed("https://fresh.test/rss"),
            seed("https://fresh.test/rss/"),
        ];
        let candidates: Vec<_> = agent.discover(&store, &seeds, 1).collect();

        let mut ids: Vec<_> = candidates.iter().map(|c| c.source_id.clone()).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);

        let known = candidates
            .iter()
            .find(|c| c.url.host_str() == Some("known.test"))
            .unwrap();
        assert_eq!(known.strategy, Strategy::Recheck);

        let pib_hi = candidates.iter().find(|c| c.language == "hi").unwrap();
        assert!(matches!(pib_hi.strategy, Strategy::Permutation { .. }));
        assert_eq!(candidates.len(), 4);
    }

    #[test]
    fn permutations_skip_known_sources() {
        let agent = FeedDiscoveryAgent::new(&config());
        let mut store = ValidationStore::default();
        store.upsert(source(
            "https://pib.gov.in/RssMain.aspx?ModId=6&Lang=1&Regid=3",
            SourceStatus::Rejected,
            10,
        ));

        let candidates: Vec<_> = agent.discover(&store, &[], 1).collect();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].language, "hi");
    }

    #[test]
    fn cooled_down_pattern_skipped() {
        let agent = FeedDiscoveryAgent::new(&config());
        let mut store = ValidationStore::default();
        store.heuristics.insert(
            "pib".into(),
            PatternState {
                disabled_through_run: Some(3),
                ..PatternState::default()
            },
        );

        assert_eq!(agent.discover(&store, &[], 3).count(), 0);
        assert_eq!(agent.discover(&store, &[], 4).count(), 2);
    }

    #[test]
    fn max_candidates_caps_sequence() {
        let mut config = config();
        config.run.max_candidates = 1;
        let agent = FeedDiscoveryAgent::new(&config);
        let store = ValidationStore::default();
        assert_eq!(agent.discover(&store, &[], 1).count(), 1);
    }

    #[test]
    fn discovery_is_lazy() {
        let agent = FeedDiscoveryAgent::new(&config());
        let store = ValidationStore::default();
        let mut iter = agent.discover(&store, &[], 1);
        assert!(iter.next().is_some());
    }
}
