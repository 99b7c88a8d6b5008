//! Durable queue store: one JSON file per entry.
//!
//! Files are written to a temporary name and renamed into place, so a
//! reader never sees a half-written entry. Every change to an existing
//! entry happens under `<id>.lock`, created with `create_new` (`O_EXCL`),
//! and the entry is re-read once the lock is held. Several processes can
//! therefore share one directory and an entry is still claimed only once.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use super::store::{claim_order, mark_processing, QueueStore};
use super::types::{EntryState, QueueEntry};
use super::QueueError;

const EXTENSION: &str = "json";
const LOCK_EXTENSION: &str = "lock";

/// A lock older than this belongs to a crashed process and is broken.
const STALE_LOCK_AGE: Duration = Duration::from_secs(30);
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Held lock on one entry; the lock file is removed on drop.
struct EntryLock {
    path: PathBuf,
}

impl EntryLock {
    async fn acquire(path: PathBuf) -> Result<Self, QueueError> {
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(&path).await {
                        warn!(path = %path.display(), "queue_stale_lock_removed");
                        let _ = fs::remove_file(&path).await;
                        continue;
                    }
                    tokio::time::sleep(LOCK_RETRY_DELAY).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for EntryLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "queue_lock_release_failed");
        }
    }
}

async fn is_stale(path: &Path) -> bool {
    let Ok(modified) = fs::metadata(path).await.and_then(|m| m.modified()) else {
        return false;
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age > STALE_LOCK_AGE)
        .unwrap_or(false)
}

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "queue_store_opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.{}", id, EXTENSION))
    }

    async fn lock(&self, id: Uuid) -> Result<EntryLock, QueueError> {
        EntryLock::acquire(self.dir.join(format!("{}.{}", id, LOCK_EXTENSION))).await
    }

    async fn read(&self, id: Uuid) -> Result<Option<QueueEntry>, QueueError> {
        match fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        let path = self.path_for(entry.id);
        let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        fs::write(&tmp, serde_json::to_vec_pretty(entry)?).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Claim one entry under its lock. Reads the entry again after locking,
    /// so a claim made by another process in the meantime is seen.
    async fn claim_locked(&self, id: Uuid) -> Result<Option<QueueEntry>, QueueError> {
        let _lock = self.lock(id).await?;
        let Some(mut entry) = self.read(id).await? else {
            return Ok(None);
        };
        if entry.state != EntryState::Pending {
            return Ok(None);
        }
        mark_processing(&mut entry);
        self.write(&entry).await?;
        Ok(Some(entry))
    }

    /// Every readable entry. Unreadable files are logged and skipped.
    async fn read_all(&self) -> Result<Vec<QueueEntry>, QueueError> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;

        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let parsed = match fs::read(&path).await {
                Ok(bytes) => serde_json::from_slice::<QueueEntry>(&bytes).map_err(QueueError::from),
                // Deleted between listing and reading.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => Err(e.into()),
            };
            match parsed {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(path = %path.display(), error = %e, "queue_entry_unreadable"),
            }
        }

        Ok(entries)
    }
}

#[async_trait]
impl QueueStore for FileStore {
    async fn insert(&self, entry: QueueEntry) -> Result<(), QueueError> {
        let _lock = self.lock(entry.id).await?;
        self.write(&entry).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueueEntry>, QueueError> {
        self.read(id).await
    }

    async fn update(&self, entry: &QueueEntry) -> Result<(), QueueError> {
        let _lock = self.lock(entry.id).await?;
        if !fs::try_exists(self.path_for(entry.id)).await? {
            return Err(QueueError::NotFound(entry.id));
        }
        self.write(entry).await
    }

    async fn claim(&self, id: Uuid) -> Result<Option<QueueEntry>, QueueError> {
        self.claim_locked(id).await
    }

    async fn claim_pending(&self, limit: usize) -> Result<Vec<QueueEntry>, QueueError> {
        let mut candidates: Vec<QueueEntry> = self
            .read_all()
            .await?
            .into_iter()
            .filter(|e| e.state == EntryState::Pending)
            .collect();
        claim_order(&mut candidates);

        let mut claimed = Vec::new();
        for candidate in candidates {
            if claimed.len() >= limit {
                break;
            }
            if let Some(entry) = self.claim_locked(candidate.id).await? {
                claimed.push(entry);
            }
        }
        Ok(claimed)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, QueueError> {
        let _lock = self.lock(id).await?;
        match fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<QueueEntry>, QueueError> {
        self.read_all().await
    }
}
