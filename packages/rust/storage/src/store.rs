//! In-memory model of the validation store.
//!
//! The store is loaded once per run, handed to workers as an immutable
//! snapshot, and mutated only by the coordinator's finalization step.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use feedscout_shared::{
    CURRENT_SCHEMA_VERSION, Decision, ReasonCode, Source, SourceId, SourceStatus, Strategy,
    ValidationOutcome, parse_source_url,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One entry of the append-only outcome log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeLogEntry {
    pub run_id: Uuid,
    pub source_id: SourceId,
    pub decision: Decision,
    pub reason: ReasonCode,
    pub observed_at: DateTime<Utc>,
    /// Absent in entries written before strategies were logged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
}

/// Totals of one completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_no: u64,
    pub finished_at: DateTime<Utc>,
    pub candidates: usize,
    pub accepted: usize,
    /// Sources learned about for the first time this run.
    pub new_sources: usize,
    /// New sources that were accepted.
    pub new_accepted: usize,
}

/// Runs kept in [`ValidationStore::run_history`].
pub const RUN_HISTORY_LIMIT: usize = 100;

/// Per-pattern discovery heuristic state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternState {
    /// Pattern is skipped by discovery while `run_sequence <= disabled_through_run`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_through_run: Option<u64>,
    #[serde(default)]
    pub accepted_total: u64,
    #[serde(default)]
    pub rejected_total: u64,
    /// Acceptance rate observed in the last run that exercised the pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rate: Option<f64>,
}

impl PatternState {
    pub fn is_enabled(&self, run_no: u64) -> bool {
        self.disabled_through_run.is_none_or(|through| run_no > through)
    }
}

/// Persisted trust state: sources, outcome history and discovery heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationStore {
    pub schema_version: u32,
    /// Number of completed runs; the next run is `run_sequence + 1`.
    #[serde(default)]
    pub run_sequence: u64,
    #[serde(default)]
    pub sources: BTreeMap<SourceId, Source>,
    #[serde(default)]
    pub outcome_log: Vec<OutcomeLogEntry>,
    #[serde(default)]
    pub heuristics: BTreeMap<String, PatternState>,
    /// Most recent runs, oldest first.
    #[serde(default)]
    pub run_history: Vec<RunRecord>,
}

impl Default for ValidationStore {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            run_sequence: 0,
            sources: BTreeMap::new(),
            outcome_log: Vec::new(),
            heuristics: BTreeMap::new(),
            run_history: Vec::new(),
        }
    }
}

impl ValidationStore {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn get(&self, id: &SourceId) -> Option<&Source> {
        self.sources.get(id)
    }

    pub fn contains(&self, id: &SourceId) -> bool {
        self.sources.contains_key(id)
    }

    /// Insert or replace a source record.
    pub fn upsert(&mut self, source: Source) {
        self.sources.insert(source.id.clone(), source);
    }

    /// Look a source up by identifier or by any equivalent URL.
    pub fn find(&self, id_or_url: &str) -> Option<&Source> {
        let key = SourceId(id_or_url.trim().to_string());
        if let Some(source) = self.sources.get(&key) {
            return Some(source);
        }
        let url = parse_source_url(id_or_url).ok()?;
        self.sources.get(&SourceId::for_url(&url))
    }

    /// Sources with the given status, in identifier order.
    pub fn by_status(&self, status: SourceStatus) -> impl Iterator<Item = &Source> {
        self.sources.values().filter(move |s| s.status == status)
    }

    /// Append this run's outcomes and trim each source's history to `window` entries.
    pub fn append_outcomes(&mut self, run_id: Uuid, outcomes: &[ValidationOutcome], window: usize) {
        self.outcome_log.extend(outcomes.iter().map(|o| OutcomeLogEntry {
            run_id,
            source_id: o.source_id.clone(),
            decision: o.decision,
            reason: o.reason,
            observed_at: o.observed_at,
            strategy: Some(o.strategy.clone()),
        }));
        self.trim_outcome_log(window);
    }

    /// Append a run record, dropping the oldest beyond [`RUN_HISTORY_LIMIT`].
    pub fn record_run(&mut self, record: RunRecord) {
        self.run_history.push(record);
        let excess = self.run_history.len().saturating_sub(RUN_HISTORY_LIMIT);
        self.run_history.drain(..excess);
    }

    /// Logged outcomes for one source, oldest first.
    pub fn outcomes_for<'a>(
        &'a self,
        id: &'a SourceId,
    ) -> impl Iterator<Item = &'a OutcomeLogEntry> + 'a {
        self.outcome_log.iter().filter(move |e| &e.source_id == id)
    }

    /// Whether discovery may use the pattern in run `run_no`.
    pub fn pattern_enabled(&self, pattern_id: &str, run_no: u64) -> bool {
        self.heuristics
            .get(pattern_id)
            .is_none_or(|state| state.is_enabled(run_no))
    }

    fn trim_outcome_log(&mut self, window: usize) {
        let mut seen: HashMap<&SourceId, usize> = HashMap::new();
        let mut keep = vec![false; self.outcome_log.len()];
        for (i, entry) in self.outcome_log.iter().enumerate().rev() {
            let count = seen.entry(&entry.source_id).or_default();
            keep[i] = *count < window;
            *count += 1;
        }

        let mut keep = keep.into_iter();
        self.outcome_log.retain(|_| keep.next().unwrap_or(false));
    }
}
