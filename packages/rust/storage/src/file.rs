//! JSON snapshot persistence with atomic replace and a lock-file lease.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use feedscout_shared::{CURRENT_SCHEMA_VERSION, FeedScoutError, Result};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::{StoreIo, StoreLease, ValidationStore};

/// Validation store kept as a single pretty-printed JSON file.
///
/// Saves write and fsync `.<name>.tmp` next to the target, rename it over
/// the old file, then fsync the directory. A failed save leaves the previous
/// snapshot byte-identical.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, name: String) -> PathBuf {
        match self.path.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        }
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store.json".into())
    }

    pub(crate) fn temp_path(&self) -> PathBuf {
        self.sibling(format!(".{}.tmp", self.file_name()))
    }

    pub(crate) fn lock_path(&self) -> PathBuf {
        self.sibling(format!("{}.lock", self.file_name()))
    }
}

#[async_trait]
impl StoreIo for JsonFileStore {
    #[instrument(skip_all, fields(path = %self.path.display()))]
    async fn load(&self) -> Result<ValidationStore> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("store file not found, starting empty");
                return Ok(ValidationStore::default());
            }
            Err(e) => {
                return Err(FeedScoutError::store(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };

        let store: ValidationStore = serde_json::from_slice(&bytes).map_err(|e| {
            FeedScoutError::store(format!("failed to parse {}: {e}", self.path.display()))
        })?;

        if store.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(FeedScoutError::store(format!(
                "{} has schema version {}, newer than supported {}",
                self.path.display(),
                store.schema_version,
                CURRENT_SCHEMA_VERSION
            )));
        }

        debug!(
            sources = store.sources.len(),
            runs = store.run_sequence,
            "loaded validation store"
        );
        Ok(store)
    }

    #[instrument(skip_all, fields(path = %self.path.display(), sources = store.sources.len()))]
    async fn save(&self, store: &ValidationStore) -> Result<()> {
        let content = serde_json::to_vec_pretty(store)
            .map_err(|e| FeedScoutError::store(format!("failed to serialize store: {e}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FeedScoutError::io(parent, e))?;
        }

        let temp = self.temp_path();

        if let Err(e) = write_synced(&temp, &content).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(FeedScoutError::store(format!(
                "failed to write {}: {e}",
                temp.display()
            )));
        }

        // Atomic rename
        if let Err(e) = tokio::fs::rename(&temp, &self.path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(FeedScoutError::store(format!(
                "failed to replace {}: {e}",
                self.path.display()
            )));
        }

        // The new snapshot is in place; a failed directory sync only weakens durability.
        if let Err(e) = sync_parent(&self.path).await {
            warn!(error = %e, "could not sync store directory");
        }

        info!(bytes = content.len(), "persisted validation store");
        Ok(())
    }

    async fn lease(&self) -> Result<StoreLease> {
        let lock = self.lock_path();
        if let Some(parent) = lock.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| FeedScoutError::io(parent, e))?;
        }

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => FeedScoutError::store(format!(
                    "store is leased by another run (remove {} if stale)",
                    lock.display()
                )),
                _ => FeedScoutError::io(&lock, e),
            })?;

        if let Err(e) = writeln!(file, "{}", std::process::id()) {
            warn!(path = %lock.display(), error = %e, "could not record pid in lock file");
        }

        debug!(path = %lock.display(), "acquired store lease");
        Ok(StoreLease::lock_file(lock))
    }
}

/// Write `content` to `path` and flush it to disk before returning.
async fn write_synced(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(content).await?;
    file.sync_all().await
}

/// Persist the directory entry of a rename.
#[cfg(unix)]
async fn sync_parent(path: &Path) -> std::io::Result<()> {
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent.to_path_buf(),
        None => PathBuf::from("."),
    };
    tokio::fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
