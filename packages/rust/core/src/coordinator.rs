//! Run coordinator: `Init → Discover → Validate → Retrieve → Learn → Persist → Done`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use feedscout_discovery::{FeedDiscoveryAgent, SeedSource};
use feedscout_fetch::Fetch;
use feedscout_learning::LearningAgent;
use feedscout_retrieval::{RetrievalAgent, RetrievalError};
use feedscout_shared::{
    AppConfig, Candidate, ContentRecord, FeedScoutError, ReasonCode, RunSummary, Source,
    ValidationOutcome,
};
use feedscout_storage::{StoreIo, ValidationStore};
use feedscout_validator::{DuplicateRegistry, Validation, ValidatorAgent};

use crate::pool::{TaskResult, run_bounded};

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Stage of the per-run state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Init,
    Discover,
    Validate,
    Retrieve,
    Learn,
    Persist,
    Done,
    Failed,
}

impl RunStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Discover => "discover",
            Self::Validate => "validate",
            Self::Retrieve => "retrieve",
            Self::Learn => "learn",
            Self::Persist => "persist",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A run that hit a store- or configuration-level failure.
///
/// The persisted store is untouched. `outcomes` holds whatever was
/// validated before the failure so the work is not silently lost.
#[derive(Debug, thiserror::Error)]
#[error("run failed during {stage}: {source}")]
pub struct RunAborted {
    pub stage: RunStage,
    pub summary: RunSummary,
    pub outcomes: Vec<ValidationOutcome>,
    pub source: FeedScoutError,
}

/// Progress callbacks for a run.
pub trait ProgressReporter: Send + Sync {
    /// Called when the run enters a stage.
    fn stage(&self, stage: RunStage);
    /// Called as each candidate's validation result is collected.
    fn candidate_validated(&self, outcome: &ValidationOutcome, done: usize, total: usize);
    /// Called once the store has been persisted.
    fn finished(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _stage: RunStage) {}
    fn candidate_validated(&self, _outcome: &ValidationOutcome, _done: usize, _total: usize) {}
    fn finished(&self, _summary: &RunSummary) {}
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Drives discovery, validation, retrieval and learning for one run at a time.
pub struct Coordinator {
    config: AppConfig,
    fetch: Arc<dyn Fetch>,
    store: Arc<dyn StoreIo>,
    seeds: Arc<dyn SeedSource>,
    run_lock: Mutex<()>,
}

/// Per-candidate state carried between stages.
struct Slot {
    candidate: Candidate,
    outcome: ValidationOutcome,
    content_hash: Option<String>,
}

impl Coordinator {
    pub fn new(
        config: AppConfig,
        fetch: Arc<dyn Fetch>,
        store: Arc<dyn StoreIo>,
        seeds: Arc<dyn SeedSource>,
    ) -> Self {
        Self {
            config,
            fetch,
            store,
            seeds,
            run_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Execute one full run. Concurrent calls are serialized.
    #[instrument(skip_all, fields(workers = self.config.run.workers))]
    pub async fn run(&self, progress: &dyn ProgressReporter) -> Result<RunSummary, RunAborted> {
        let _serialized = self.run_lock.lock().await;

        let run_id = Uuid::now_v7();
        let started_at = Utc::now();
        let abort = |stage: RunStage, outcomes: Vec<ValidationOutcome>, source: FeedScoutError| {
            warn!(%run_id, %stage, error = %source, "run aborted");
            progress.stage(RunStage::Failed);
            RunAborted {
                stage,
                summary: RunSummary::empty(run_id, started_at),
                outcomes,
                source,
            }
        };

        // --- Init ---
        progress.stage(RunStage::Init);
        info!(%run_id, "starting run");
        let deadline = Instant::now() + Duration::from_secs(self.config.run.timeout_secs);

        if let Err(e) = self.config.validate() {
            return Err(abort(RunStage::Init, Vec::new(), e));
        }
        let _lease = match self.store.lease().await {
            Ok(lease) => lease,
            Err(e) => return Err(abort(RunStage::Init, Vec::new(), e)),
        };
        let mut store = match self.store.load().await {
            Ok(store) => store,
            Err(e) => return Err(abort(RunStage::Init, Vec::new(), e)),
        };
        let seeds = match self.seeds.seeds() {
            Ok(seeds) => seeds,
            Err(e) => return Err(abort(RunStage::Init, Vec::new(), e)),
        };
        if seeds.is_empty() && self.config.discovery.patterns.is_empty() && store.is_empty() {
            let e = FeedScoutError::config(
                "no seed input: configure seeds or patterns, or pass a seed list",
            );
            return Err(abort(RunStage::Init, Vec::new(), e));
        }

        let run_no = store.run_sequence + 1;
        let learning = LearningAgent::new(&self.config);
        let on_probation = learning.grant_probation(&mut store, run_no);

        // --- Discover ---
        progress.stage(RunStage::Discover);
        let candidates: Vec<Candidate> = FeedDiscoveryAgent::new(&self.config)
            .discover(&store, &seeds, run_no)
            .collect();
        info!(run_no, candidates = candidates.len(), on_probation, "discovery complete");

        // --- Validate ---
        progress.stage(RunStage::Validate);
        let duplicates = DuplicateRegistry::new();
        let mut slots = self
            .validate_all(candidates, &duplicates, deadline, progress)
            .await;

        // --- Retrieve ---
        progress.stage(RunStage::Retrieve);
        let records = self.retrieve_all(&mut slots, &duplicates, deadline).await;

        // --- Learn ---
        progress.stage(RunStage::Learn);
        let now = Utc::now();
        register_new_sources(&mut store, &slots);
        let outcomes: Vec<ValidationOutcome> = slots.into_iter().map(|s| s.outcome).collect();
        let updated_sources = learning.learn(&mut store, &outcomes, run_no, now);
        store.append_outcomes(run_id, &outcomes, self.config.trust.outcome_window);
        store.run_sequence = run_no;

        // --- Persist ---
        progress.stage(RunStage::Persist);
        if let Err(e) = self.store.save(&store).await {
            return Err(abort(RunStage::Persist, outcomes, e));
        }

        let accepted_count = outcomes.iter().filter(|o| o.is_accept()).count();
        let timed_out_count = outcomes
            .iter()
            .filter(|o| o.reason == ReasonCode::TimedOut)
            .count();
        let summary = RunSummary {
            run_id,
            accepted_count,
            rejected_count: outcomes.len() - accepted_count,
            timed_out_count,
            content_records: records,
            updated_sources,
            started_at,
            finished_at: Some(Utc::now()),
        };

        info!(
            %run_id,
            run_no,
            accepted = summary.accepted_count,
            rejected = summary.rejected_count,
            timed_out = summary.timed_out_count,
            records = summary.content_records.len(),
            "run complete"
        );
        progress.stage(RunStage::Done);
        progress.finished(&summary);
        Ok(summary)
    }

    async fn validate_all(
        &self,
        candidates: Vec<Candidate>,
        duplicates: &DuplicateRegistry,
        deadline: Instant,
        progress: &dyn ProgressReporter,
    ) -> Vec<Slot> {
        let validator = Arc::new(ValidatorAgent::new(
            self.fetch.clone(),
            &self.config.validation,
            duplicates.clone(),
        ));

        let results = run_bounded(
            candidates.clone(),
            self.config.run.workers,
            deadline,
            |candidate: Candidate| {
                let validator = validator.clone();
                async move { validator.validate(&candidate).await }
            },
        )
        .await;

        let total = candidates.len();
        candidates
            .into_iter()
            .zip(results)
            .enumerate()
            .map(|(i, (candidate, result))| {
                let slot = match result {
                    TaskResult::Done(Validation {
                        outcome,
                        content_hash,
                    }) => Slot {
                        candidate,
                        outcome,
                        content_hash,
                    },
                    TaskResult::TimedOut => Slot::rejected(candidate, ReasonCode::TimedOut),
                    TaskResult::Failed(_) => Slot::rejected(candidate, ReasonCode::WorkerFailed),
                };
                progress.candidate_validated(&slot.outcome, i + 1, total);
                slot
            })
            .collect()
    }

    /// Retrieve every accepted candidate. A failed retrieval turns the accept
    /// into a reject and gives its duplicate claim back; the first candidate
    /// rejected as a duplicate of that content is then accepted and retrieved
    /// in its place.
    async fn retrieve_all(
        &self,
        slots: &mut [Slot],
        duplicates: &DuplicateRegistry,
        deadline: Instant,
    ) -> Vec<ContentRecord> {
        let retrieval = Arc::new(RetrievalAgent::new(self.fetch.clone()));
        let mut records = Vec::new();
        let mut seen_hashes: HashSet<String> = HashSet::new();

        let mut pending: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.outcome.is_accept())
            .map(|(i, _)| i)
            .collect();

        while !pending.is_empty() {
            let jobs: Vec<Candidate> =
                pending.iter().map(|&i| slots[i].candidate.clone()).collect();
            let results = run_bounded(jobs, self.config.run.workers, deadline, |candidate| {
                let retrieval = retrieval.clone();
                async move { retrieval.retrieve(&candidate).await }
            })
            .await;

            let mut released = Vec::new();
            for (i, result) in pending.into_iter().zip(results) {
                let slot = &mut slots[i];
                let reason = match result {
                    TaskResult::Done(Ok(record)) => {
                        // Retrieval refetches, so the batch is deduplicated again on the record hash.
                        if seen_hashes.insert(record.content_hash.clone()) {
                            records.push(record);
                            continue;
                        }
                        debug!(source = %slot.candidate.source_id, "retrieved content duplicates an earlier record");
                        ReasonCode::DuplicateContent
                    }
                    TaskResult::Done(Err(RetrievalError { reason, detail })) => {
                        warn!(source = %slot.candidate.source_id, %detail, "retrieval failed");
                        reason
                    }
                    TaskResult::TimedOut => ReasonCode::TimedOut,
                    TaskResult::Failed(_) => ReasonCode::WorkerFailed,
                };

                if let Some(hash) = slot.content_hash.take() {
                    duplicates.release(&hash);
                    released.push(hash);
                }
                slot.outcome =
                    ValidationOutcome::reject(&slot.candidate, reason, slot.outcome.attempts);
            }

            if Instant::now() >= deadline {
                break;
            }
            pending = promote_duplicates(slots, duplicates, &released);
        }

        records
    }
}

/// For each released hash, accept the first slot that lost the hash to the
/// failed claimant. Returns the promoted slot indices.
fn promote_duplicates(
    slots: &mut [Slot],
    duplicates: &DuplicateRegistry,
    released: &[String],
) -> Vec<usize> {
    let mut promoted = Vec::new();
    for hash in released {
        let waiting = slots.iter().position(|s| {
            s.outcome.reason == ReasonCode::DuplicateContent
                && s.content_hash.as_deref() == Some(hash.as_str())
        });
        let Some(i) = waiting else {
            continue;
        };
        if !duplicates.claim(hash) {
            continue;
        }
        let slot = &mut slots[i];
        info!(source = %slot.candidate.source_id, %hash, "claimant failed, accepting duplicate in its place");
        slot.outcome = ValidationOutcome::accept(&slot.candidate, slot.outcome.attempts);
        promoted.push(i);
    }
    promoted
}

impl Slot {
    fn rejected(candidate: Candidate, reason: ReasonCode) -> Self {
        let outcome = ValidationOutcome::reject(&candidate, reason, 0);
        Self {
            candidate,
            outcome,
            content_hash: None,
        }
    }
}

/// Every validated candidate not yet known becomes an unvalidated source.
fn register_new_sources(store: &mut ValidationStore, slots: &[Slot]) {
    for slot in slots {
        let c = &slot.candidate;
        if store.contains(&c.source_id) {
            continue;
        }
        debug!(source = %c.source_id, url = %c.url, strategy = %c.strategy, "registering source");
        store.upsert(Source::discovered(
            c.url.clone(),
            c.language.clone(),
            c.category.clone(),
            c.strategy.clone(),
            c.discovered_at,
        ));
    }
}
