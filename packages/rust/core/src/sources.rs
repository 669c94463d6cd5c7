//! Source maintenance outside of a run: listing, reinstating, rescoring,
//! and the learning report.
//!
//! Each operation that writes takes the store lease, so it cannot interleave
//! with a run against the same store.

use tracing::info;

use feedscout_learning::{LearningReport, learning_report, rehabilitate, replay_trust};
use feedscout_shared::{
    FeedScoutError, PatternConfig, Result, Source, SourceId, SourceStatus, TrustConfig,
};
use feedscout_storage::StoreIo;

/// Sources in identifier order, optionally filtered by status.
pub async fn list_sources(store: &dyn StoreIo, status: Option<SourceStatus>) -> Result<Vec<Source>> {
    let snapshot = store.load().await?;
    Ok(snapshot
        .sources
        .into_values()
        .filter(|s| status.is_none_or(|wanted| s.status == wanted))
        .collect())
}

/// Put a quarantined source on probation so the next run re-checks it.
pub async fn reinstate(store: &dyn StoreIo, id_or_url: &str) -> Result<Source> {
    let _lease = store.lease().await?;
    let mut snapshot = store.load().await?;

    let id = snapshot
        .find(id_or_url)
        .map(|s| s.id.clone())
        .ok_or_else(|| FeedScoutError::validation(format!("unknown source '{id_or_url}'")))?;
    let Some(source) = snapshot.sources.get_mut(&id) else {
        return Err(FeedScoutError::validation(format!("unknown source '{id_or_url}'")));
    };

    if !rehabilitate(source) {
        return Err(FeedScoutError::validation(format!(
            "source {} is {}, only quarantined sources can be reinstated",
            source.id, source.status
        )));
    }
    let reinstated = source.clone();

    store.save(&snapshot).await?;
    info!(source = %reinstated.id, url = %reinstated.url, "source reinstated on probation");
    Ok(reinstated)
}

/// What the store has learned so far. Read-only; no lease is taken.
pub async fn report(
    store: &dyn StoreIo,
    patterns: &[PatternConfig],
    window: usize,
) -> Result<LearningReport> {
    let snapshot = store.load().await?;
    Ok(learning_report(&snapshot, patterns, window))
}

/// One source's stored score against the score replayed from its outcome log.
#[derive(Debug, Clone, PartialEq)]
pub struct Rescore {
    pub source_id: SourceId,
    pub stored: f64,
    pub replayed: f64,
}

impl Rescore {
    pub fn drift(&self) -> f64 {
        (self.stored - self.replayed).abs()
    }
}

/// Replay every source's logged outcomes. With `apply`, replayed scores are
/// written back; statuses are left alone.
pub async fn rescore(store: &dyn StoreIo, trust: &TrustConfig, apply: bool) -> Result<Vec<Rescore>> {
    let _lease = store.lease().await?;
    let mut snapshot = store.load().await?;

    let report: Vec<Rescore> = snapshot
        .sources
        .values()
        .map(|s| Rescore {
            source_id: s.id.clone(),
            stored: s.trust_score,
            replayed: replay_trust(snapshot.outcomes_for(&s.id), trust),
        })
        .collect();

    if apply {
        let mut changed = 0;
        for r in report.iter().filter(|r| r.drift() > f64::EPSILON) {
            if let Some(source) = snapshot.sources.get_mut(&r.source_id) {
                source.trust_score = r.replayed;
                source.version += 1;
                changed += 1;
            }
        }
        if changed > 0 {
            store.save(&snapshot).await?;
        }
        info!(changed, "rescored sources");
    }

    Ok(report)
}
