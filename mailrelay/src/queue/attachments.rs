//! Private storage for attachment bytes of queued messages.
//!
//! Layout: `<root>/<entry_id>/<hash>-<filename>`. The directory name is the
//! owning entry; a file's age is its modification time.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::message::{AttachmentSource, Message};

use super::QueueError;

/// Hex digits of the content hash used in stored file names.
const HASH_PREFIX_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct AttachmentStore {
    root: PathBuf,
}

impl AttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, entry_id: Uuid) -> PathBuf {
        self.root.join(entry_id.to_string())
    }

    /// Move in-memory attachment bytes to disk and point the message at the
    /// stored copies. Returns how many files were written.
    pub async fn store(&self, entry_id: Uuid, message: &mut Message) -> Result<usize, QueueError> {
        let dir = self.entry_dir(entry_id);
        let mut written = 0;

        for attachment in &mut message.attachments {
            let AttachmentSource::Bytes { data } = &attachment.source else {
                continue;
            };

            if written == 0 {
                fs::create_dir_all(&dir).await?;
            }

            let digest = hex::encode(Sha256::digest(data));
            let name = format!(
                "{}-{}",
                &digest[..HASH_PREFIX_LEN],
                safe_filename(&attachment.filename)
            );
            let path = dir.join(name);
            fs::write(&path, data).await?;

            attachment.source = AttachmentSource::Stored { path };
            written += 1;
        }

        if written > 0 {
            debug!(entry_id = %entry_id, files = written, "attachments_stored");
        }
        Ok(written)
    }

    /// Delete every stored file of one entry.
    pub async fn remove_entry(&self, entry_id: Uuid) -> Result<(), QueueError> {
        match fs::remove_dir_all(self.entry_dir(entry_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete files last modified at or before `cutoff`, then any entry
    /// directory left empty. Returns the number of files deleted.
    pub async fn sweep(&self, cutoff: SystemTime) -> Result<usize, QueueError> {
        let mut dirs = match fs::read_dir(&self.root).await {
            Ok(dirs) => dirs,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut deleted = 0;
        while let Some(dir) = dirs.next_entry().await? {
            if !dir.file_type().await?.is_dir() {
                continue;
            }

            let mut files = fs::read_dir(dir.path()).await?;
            let mut remaining = 0;
            while let Some(file) = files.next_entry().await? {
                let modified = file.metadata().await?.modified()?;
                if modified <= cutoff {
                    match fs::remove_file(file.path()).await {
                        Ok(()) => deleted += 1,
                        Err(e) => {
                            warn!(path = %file.path().display(), error = %e, "attachment_delete_failed");
                            remaining += 1;
                        }
                    }
                } else {
                    remaining += 1;
                }
            }

            if remaining == 0 {
                let _ = fs::remove_dir(dir.path()).await;
            }
        }

        Ok(deleted)
    }

    /// Number of stored files, across all entries.
    pub async fn file_count(&self) -> Result<usize, QueueError> {
        let mut dirs = match fs::read_dir(&self.root).await {
            Ok(dirs) => dirs,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut count = 0;
        while let Some(dir) = dirs.next_entry().await? {
            if dir.file_type().await?.is_dir() {
                let mut files = fs::read_dir(dir.path()).await?;
                while files.next_entry().await?.is_some() {
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}

fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Attachment;
    use std::time::Duration;

    fn message_with_bytes() -> Message {
        Message::builder()
            .attachment(Attachment::from_bytes(b"report".to_vec(), Some("../q3 report.pdf")))
            .attachment(Attachment::from_path("/srv/shared/terms.pdf"))
            .build()
    }

    #[tokio::test]
    async fn test_store_moves_bytes_to_disk() {
        let root = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(root.path());
        let id = Uuid::new_v4();
        let mut message = message_with_bytes();

        assert_eq!(store.store(id, &mut message).await.unwrap(), 1);

        let AttachmentSource::Stored { path } = &message.attachments[0].source else {
            panic!("expected stored attachment");
        };
        assert!(path.starts_with(root.path().join(id.to_string())));
        assert!(path.file_name().unwrap().to_str().unwrap().ends_with("-.._q3 report.pdf"));
        assert_eq!(std::fs::read(path).unwrap(), b"report");
        assert!(matches!(message.attachments[1].source, AttachmentSource::Path { .. }));
    }

    #[tokio::test]
    async fn test_sweep_by_age() {
        let root = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(root.path());
        let mut message = message_with_bytes();
        store.store(Uuid::new_v4(), &mut message).await.unwrap();

        let an_hour_ago = SystemTime::now() - Duration::from_secs(3600);
        assert_eq!(store.sweep(an_hour_ago).await.unwrap(), 0);
        assert_eq!(store.file_count().await.unwrap(), 1);

        let later = SystemTime::now() + Duration::from_secs(1);
        assert_eq!(store.sweep(later).await.unwrap(), 1);
        assert_eq!(store.file_count().await.unwrap(), 0);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_remove_entry_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(root.path());
        let id = Uuid::new_v4();
        let mut message = message_with_bytes();
        store.store(id, &mut message).await.unwrap();

        store.remove_entry(id).await.unwrap();
        store.remove_entry(id).await.unwrap();
        assert_eq!(store.file_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let store = AttachmentStore::new("/definitely/not/here");
        assert_eq!(store.sweep(SystemTime::now()).await.unwrap(), 0);
        assert_eq!(store.file_count().await.unwrap(), 0);
    }
}
