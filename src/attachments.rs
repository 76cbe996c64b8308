//! Content-addressed attachment storage
//!
//! Blobs are keyed by the SHA-256 of their bytes and laid out as
//! `ab/cd/<hash>` under the store root, so identical content from any
//! message or account lands on the same path and is written once.
//! Writes go to `<root>/tmp` first and are renamed into place; a blob
//! path either does not exist or holds the complete content.

use crate::error::{Error, Result};
use crate::store::MessageStore;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info};

const TMP_DIR: &str = "tmp";
const HASH_HEX_LEN: usize = 64;

/// Outcome of [`AttachmentStorage::store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Path relative to the store root, e.g. `ab/cd/abcd…`.
    pub storage_path: String,
    /// Lower-case hex SHA-256 of the content.
    pub content_hash: String,
    /// `false` when the content was already stored.
    pub is_new: bool,
}

pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

#[async_trait]
pub trait AttachmentStorage: Send + Sync {
    /// Store `bytes`, or find the existing blob with the same content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the blob cannot be written.
    async fn store(&self, file_name: &str, content_type: &str, bytes: &[u8]) -> Result<StoredBlob>;

    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the path is invalid or the blob
    /// does not exist.
    async fn open_read(&self, storage_path: &str) -> Result<BlobReader>;

    /// Remove a blob unconditionally. Use [`prune_blob`] unless the
    /// caller has already checked references.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the path is invalid or removal
    /// fails.
    async fn delete(&self, storage_path: &str) -> Result<()>;

    /// Total bytes held by unique blobs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the store cannot be walked.
    async fn total_size(&self) -> Result<u64>;
}

/// Lower-case hex SHA-256 of `bytes`.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Sharded storage path for a content hash.
///
/// # Examples
///
/// ```
/// let hash = mailbox_sync::content_hash(b"hello");
/// let path = mailbox_sync::storage_path_for(&hash).unwrap();
/// assert_eq!(path, format!("2c/f2/{hash}"));
///
/// assert!(mailbox_sync::storage_path_for("ab").is_err());
/// ```
///
/// # Errors
///
/// Returns [`Error::Storage`] unless `content_hash` is 64 lower-case
/// hex characters.
pub fn storage_path_for(content_hash: &str) -> Result<String> {
    if !is_content_hash(content_hash) {
        return Err(Error::Storage(format!("invalid content hash {content_hash}")));
    }
    Ok(format!(
        "{}/{}/{content_hash}",
        &content_hash[..2],
        &content_hash[2..4]
    ))
}

fn is_content_hash(s: &str) -> bool {
    s.len() == HASH_HEX_LEN && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Delete the blob for `content_hash` if no persisted message links to
/// it any more. Returns whether the blob was removed.
///
/// # Errors
///
/// Returns an error if the reference count cannot be read or the
/// delete fails.
pub async fn prune_blob(
    storage: &dyn AttachmentStorage,
    messages: &dyn MessageStore,
    content_hash: &str,
) -> Result<bool> {
    let storage_path = storage_path_for(content_hash)?;

    let references = messages.count_hash_references(content_hash).await?;
    if references > 0 {
        debug!(hash = content_hash, references, "blob still referenced, keeping it");
        return Ok(false);
    }

    storage.delete(&storage_path).await?;
    info!(hash = content_hash, "pruned unreferenced blob");
    Ok(true)
}

/// Filesystem-backed [`AttachmentStorage`].
#[derive(Debug)]
pub struct FsAttachmentStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    tmp_seq: AtomicU64,
}

impl FsAttachmentStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
            tmp_seq: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a storage path back onto the filesystem, accepting only the
    /// exact `ab/cd/<hash>` shape this store produces.
    fn resolve(&self, storage_path: &str) -> Result<PathBuf> {
        let hash = storage_path.rsplit('/').next().unwrap_or_default();
        if storage_path_for(hash).ok().as_deref() != Some(storage_path) {
            return Err(Error::Storage(format!("invalid storage path {storage_path}")));
        }
        Ok(self.root.join(storage_path))
    }

    fn hash_lock(&self, hash: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(hash.to_string())
            .or_default()
            .clone()
    }

    fn release_hash_lock(&self, hash: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // map + ours: nobody else is waiting on this hash
        if Arc::strong_count(&lock) == 2 {
            locks.remove(hash);
        }
    }

    async fn write_if_absent(&self, hash: &str, target: &Path, bytes: &[u8]) -> Result<bool> {
        if fs::try_exists(target)
            .await
            .map_err(|e| storage_err("stat", target, &e))?
        {
            return Ok(false);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_err("create shard", parent, &e))?;
        }
        let tmp_dir = self.root.join(TMP_DIR);
        fs::create_dir_all(&tmp_dir)
            .await
            .map_err(|e| storage_err("create", &tmp_dir, &e))?;

        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = tmp_dir.join(format!("{hash}.{}.{seq}", std::process::id()));

        let written = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp, target).await
        }
        .await;

        if let Err(e) = written {
            fs::remove_file(&tmp).await.ok();
            return Err(storage_err("write", target, &e));
        }
        Ok(true)
    }
}

fn storage_err(action: &str, path: &Path, e: &std::io::Error) -> Error {
    Error::Storage(format!("{action} {} failed: {e}", path.display()))
}

#[async_trait]
impl AttachmentStorage for FsAttachmentStore {
    async fn store(&self, file_name: &str, content_type: &str, bytes: &[u8]) -> Result<StoredBlob> {
        let hash = content_hash(bytes);
        let storage_path = storage_path_for(&hash)?;
        let target = self.root.join(&storage_path);

        let lock = self.hash_lock(&hash);
        let written = {
            let _guard = lock.lock().await;
            self.write_if_absent(&hash, &target, bytes).await
        };
        self.release_hash_lock(&hash, lock);
        let is_new = written?;

        debug!(
            file_name,
            content_type,
            hash = %hash,
            size = bytes.len(),
            is_new,
            "stored attachment"
        );

        Ok(StoredBlob {
            storage_path,
            content_hash: hash,
            is_new,
        })
    }

    async fn open_read(&self, storage_path: &str) -> Result<BlobReader> {
        let path = self.resolve(storage_path)?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| storage_err("open", &path, &e))?;
        Ok(Box::new(file))
    }

    async fn delete(&self, storage_path: &str) -> Result<()> {
        let path = self.resolve(storage_path)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "blob already gone");
                Ok(())
            }
            Err(e) => Err(storage_err("delete", &path, &e)),
        }
    }

    async fn total_size(&self) -> Result<u64> {
        let mut total = 0;
        for outer in shard_dirs(&self.root).await? {
            for inner in shard_dirs(&outer).await? {
                let mut entries = fs::read_dir(&inner)
                    .await
                    .map_err(|e| storage_err("list", &inner, &e))?;
                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|e| storage_err("list", &inner, &e))?
                {
                    if !entry.file_name().to_str().is_some_and(is_content_hash) {
                        continue;
                    }
                    let meta = entry
                        .metadata()
                        .await
                        .map_err(|e| storage_err("stat", &entry.path(), &e))?;
                    if meta.is_file() {
                        total += meta.len();
                    }
                }
            }
        }
        Ok(total)
    }
}

/// Two-hex-character subdirectories of `dir`. A missing root is empty.
async fn shard_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(storage_err("list", dir, &e)),
    };

    let mut dirs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| storage_err("list", dir, &e))?
    {
        let is_shard = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.len() == 2 && n.bytes().all(|b| b.is_ascii_hexdigit()));
        let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
        if is_shard && is_dir {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}
