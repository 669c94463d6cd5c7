//! Validation store persistence.
//!
//! The [`ValidationStore`] holds every known source, the per-source outcome
//! history and the discovery heuristics. It is persisted through the
//! [`StoreIo`] capability:
//! - [`JsonFileStore`]: versioned JSON snapshot, replaced atomically on save
//! - [`MemoryStore`]: in-process store for tests and dry runs
//!
//! **Access rules:** a run holds a [`StoreLease`] from load to persist; only
//! the holder writes.

mod file;
mod store;

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use feedscout_shared::{FeedScoutError, Result};

pub use file::JsonFileStore;
pub use store::{OutcomeLogEntry, PatternState, RUN_HISTORY_LIMIT, RunRecord, ValidationStore};

/// Load/save capability for the validation store.
#[async_trait]
pub trait StoreIo: Send + Sync {
    /// Load the current snapshot. A store that does not exist yet is empty.
    async fn load(&self) -> Result<ValidationStore>;

    /// Replace the persisted snapshot. On error the previous snapshot is intact.
    async fn save(&self, store: &ValidationStore) -> Result<()>;

    /// Take the exclusive write lease for one run.
    async fn lease(&self) -> Result<StoreLease> {
        Ok(StoreLease::none())
    }
}

/// Exclusive right to write the store, released on drop.
#[derive(Debug)]
pub struct StoreLease {
    lock_file: Option<PathBuf>,
}

impl StoreLease {
    /// A lease with nothing to release (in-process stores).
    pub fn none() -> Self {
        Self { lock_file: None }
    }

    pub(crate) fn lock_file(path: PathBuf) -> Self {
        Self {
            lock_file: Some(path),
        }
    }
}

impl Drop for StoreLease {
    fn drop(&mut self) {
        let Some(path) = self.lock_file.take() else {
            return;
        };
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to release store lease");
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory [`StoreIo`]. Saves can be made to fail to exercise abort paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<ValidationStore>,
    saves: Mutex<usize>,
    fail_saves: bool,
}

impl MemoryStore {
    pub fn new(store: ValidationStore) -> Self {
        Self {
            state: Mutex::new(store),
            ..Self::default()
        }
    }

    /// A store whose every save fails with a store error.
    pub fn failing_saves(store: ValidationStore) -> Self {
        Self {
            fail_saves: true,
            ..Self::new(store)
        }
    }

    /// Copy of the currently persisted snapshot.
    pub fn snapshot(&self) -> ValidationStore {
        self.state
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|n| *n).unwrap_or(0)
    }
}

#[async_trait]
impl StoreIo for MemoryStore {
    async fn load(&self) -> Result<ValidationStore> {
        Ok(self.snapshot())
    }

    async fn save(&self, store: &ValidationStore) -> Result<()> {
        if self.fail_saves {
            return Err(FeedScoutError::store("memory store configured to fail saves"));
        }
        let mut state = self
            .state
            .lock()
            .map_err(|_| FeedScoutError::store("memory store lock poisoned"))?;
        *state = store.clone();
        if let Ok(mut n) = self.saves.lock() {
            *n += 1;
        }
        Ok(())
    }
}
