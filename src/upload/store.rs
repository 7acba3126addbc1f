//! Directory-backed upload store
//!
//! Files live flat under a single root directory, keyed by their sanitized
//! name. The directory listing is the only index.
//!
//! # Write flow
//!
//! 1. Stream the bytes into a hidden temp file inside the root
//! 2. `fsync` it
//! 3. Rename it over the target name
//!
//! Readers therefore see either the previous file or the complete new one.
//! The temp file is removed asynchronously if any step fails. A write
//! future dropped mid-flight (client gone) leaves cleanup to the guard's
//! `Drop`, which hands the removal to the runtime.

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Upload store unavailable at {}: {source}", path.display())]
    Unavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {name}: {source}")]
    WriteFailed {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read {name}: {source}")]
    ReadFailed {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Name resolves outside the store root: {0}")]
    TraversalRejected(String),
}

/// A file persisted by the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    /// Sanitized name, unique within the store
    pub name: String,
    pub size_bytes: u64,
    /// Location relative to the store root
    pub path: PathBuf,
    /// Hex-encoded SHA-256 of the content
    pub content_hash: String,
}

/// Storage backend for uploaded files
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Make sure the root directory exists, creating it if needed.
    async fn ensure_root(&self) -> Result<(), StoreError>;

    /// Persist `data` under `name`, replacing any existing file.
    async fn write(&self, name: &str, data: Bytes) -> Result<StoredFile, StoreError>;

    /// Read the file stored under `name`.
    async fn read(&self, name: &str) -> Result<Bytes, StoreError>;
}

/// Filesystem implementation of [`FileStore`]
#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
    root_ready: AtomicBool,
}

impl DirectoryStore {
    /// Create a store rooted at `root`. Nothing touches the filesystem until
    /// [`FileStore::ensure_root`] or a write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            root_ready: AtomicBool::new(false),
        }
    }

    /// The configured root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Accept only a single, non-hidden, normal path component.
    ///
    /// Hidden names are refused as well so in-flight temp files can never be
    /// addressed.
    fn check_name(name: &str) -> Result<(), StoreError> {
        let rejected = || StoreError::TraversalRejected(name.to_string());

        if name.is_empty()
            || name.starts_with('.')
            || name.contains(|c: char| matches!(c, '/' | '\\' | '\0'))
        {
            return Err(rejected());
        }

        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(()),
            _ => Err(rejected()),
        }
    }

    fn content_hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    async fn write_temp(&self, temp: &TempUpload, data: &[u8]) -> io::Result<()> {
        let mut file = tokio::fs::File::create(temp.path()).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl FileStore for DirectoryStore {
    async fn ensure_root(&self) -> Result<(), StoreError> {
        if self.root_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let unavailable = |source| StoreError::Unavailable {
            path: self.root.clone(),
            source,
        };

        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(unavailable(io::Error::other("not a directory"))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tokio::fs::create_dir_all(&self.root)
                    .await
                    .map_err(unavailable)?;
                info!(root = %self.root.display(), "Created upload directory");
            }
            Err(e) => return Err(unavailable(e)),
        }

        self.root_ready.store(true, Ordering::Release);
        Ok(())
    }

    async fn write(&self, name: &str, data: Bytes) -> Result<StoredFile, StoreError> {
        Self::check_name(name)?;

        let write_failed = |source: io::Error| {
            if source.kind() == io::ErrorKind::NotFound {
                // Root vanished underneath us; provision again next time.
                self.root_ready.store(false, Ordering::Release);
            }
            StoreError::WriteFailed {
                name: name.to_string(),
                source,
            }
        };

        let target = self.root.join(name);
        let mut temp = TempUpload::new(&self.root);

        let persisted = match self.write_temp(&temp, &data).await {
            Ok(()) => tokio::fs::rename(temp.path(), &target).await,
            Err(e) => Err(e),
        };
        if let Err(e) = persisted {
            temp.discard().await;
            return Err(write_failed(e));
        }
        temp.persisted();

        debug!(file = %name, bytes = data.len(), "Stored upload");

        Ok(StoredFile {
            name: name.to_string(),
            size_bytes: data.len() as u64,
            path: PathBuf::from(name),
            content_hash: Self::content_hash(&data),
        })
    }

    async fn read(&self, name: &str) -> Result<Bytes, StoreError> {
        Self::check_name(name)?;

        let read_failed = |source| StoreError::ReadFailed {
            name: name.to_string(),
            source,
        };
        let not_found_or = |e: io::Error| {
            if e.kind() == io::ErrorKind::NotFound {
                StoreError::NotFound(name.to_string())
            } else {
                read_failed(e)
            }
        };

        // Follow symlinks before checking containment.
        let resolved = tokio::fs::canonicalize(self.root.join(name))
            .await
            .map_err(not_found_or)?;
        let root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(not_found_or)?;

        if resolved.parent() != Some(root.as_path()) {
            warn!(
                file = %name,
                resolved = %resolved.display(),
                "Rejected read outside store root"
            );
            return Err(StoreError::TraversalRejected(name.to_string()));
        }

        let meta = tokio::fs::metadata(&resolved).await.map_err(not_found_or)?;
        if !meta.is_file() {
            return Err(StoreError::NotFound(name.to_string()));
        }

        let data = tokio::fs::read(&resolved).await.map_err(not_found_or)?;
        Ok(Bytes::from(data))
    }
}

/// Temp file inside the store root, removed unless persisted.
struct TempUpload {
    path: PathBuf,
    armed: bool,
}

impl TempUpload {
    fn new(root: &Path) -> Self {
        let file_name = format!(".fileshelf-{}.tmp", uuid::Uuid::new_v4());
        Self {
            path: root.join(file_name),
            armed: true,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn persisted(&mut self) {
        self.armed = false;
    }

    /// Remove the temp file after a failed write
    async fn discard(mut self) {
        self.armed = false;
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            log_cleanup_failure(&self.path, &e);
        }
    }
}

fn log_cleanup_failure(path: &Path, e: &io::Error) {
    if e.kind() != io::ErrorKind::NotFound {
        warn!(path = %path.display(), error = %e, "Failed to clean up temp upload");
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = tokio::fs::remove_file(&path).await {
                        log_cleanup_failure(&path, &e);
                    }
                });
            }
            Err(_) => {
                if let Err(e) = std::fs::remove_file(&path) {
                    log_cleanup_failure(&path, &e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ready_store() -> (tempfile::TempDir, DirectoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path().join("uploads"));
        store.ensure_root().await.unwrap();
        (dir, store)
    }

    fn entries(root: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_ensure_root_creates_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("a/b/uploads");
        let store = DirectoryStore::new(&root);

        store.ensure_root().await.unwrap();
        assert!(root.is_dir());

        // Idempotent
        store.ensure_root().await.unwrap();
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_ensure_root_on_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("occupied");
        std::fs::write(&root, b"not a dir").unwrap();

        let store = DirectoryStore::new(&root);
        let result = store.ensure_root().await;
        assert!(matches!(result, Err(StoreError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (_dir, store) = ready_store().await;

        let stored = store
            .write("hello.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert_eq!(stored.name, "hello.txt");
        assert_eq!(stored.size_bytes, 5);
        assert_eq!(stored.path, PathBuf::from("hello.txt"));
        assert_eq!(
            stored.content_hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );

        let data = store.read("hello.txt").await.unwrap();
        assert_eq!(&data[..], b"hello");
    }

    #[tokio::test]
    async fn test_write_empty_file() {
        let (_dir, store) = ready_store().await;
        let stored = store.write("empty.bin", Bytes::new()).await.unwrap();
        assert_eq!(stored.size_bytes, 0);
        assert!(store.read("empty.bin").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_leaves_single_file() {
        let (_dir, store) = ready_store().await;

        store.write("a.txt", Bytes::from_static(b"first")).await.unwrap();
        store.write("a.txt", Bytes::from_static(b"second")).await.unwrap();

        assert_eq!(&store.read("a.txt").await.unwrap()[..], b"second");
        assert_eq!(entries(store.root()), vec!["a.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_read_missing() {
        let (_dir, store) = ready_store().await;
        let result = store.read("doesnotexist.png").await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_read_rejects_traversal() {
        let (dir, store) = ready_store().await;
        std::fs::write(dir.path().join("secret.txt"), b"secret").unwrap();

        for name in ["../secret.txt", "..", ".", "", "/etc/passwd", "a/b", "..\\x", ".hidden"] {
            let result = store.read(name).await;
            assert!(
                matches!(result, Err(StoreError::TraversalRejected(_))),
                "{name:?} should be rejected, got {result:?}"
            );
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_rejects_symlink_escape() {
        let (dir, store) = ready_store().await;
        let outside = dir.path().join("outside.txt");
        std::fs::write(&outside, b"outside").unwrap();
        std::os::unix::fs::symlink(&outside, store.root().join("link.txt")).unwrap();

        let result = store.read("link.txt").await;
        assert!(matches!(result, Err(StoreError::TraversalRejected(_))));
    }

    #[tokio::test]
    async fn test_read_directory_is_not_found() {
        let (_dir, store) = ready_store().await;
        std::fs::create_dir(store.root().join("subdir")).unwrap();

        let result = store.read("subdir").await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_write_rejects_unsafe_name() {
        let (dir, store) = ready_store().await;
        let result = store
            .write("../escape.txt", Bytes::from_static(b"x"))
            .await;
        assert!(matches!(result, Err(StoreError::TraversalRejected(_))));
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn test_write_without_root_fails_and_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path().join("missing"));

        let result = store.write("a.txt", Bytes::from_static(b"x")).await;
        assert!(matches!(result, Err(StoreError::WriteFailed { .. })));
        assert!(!dir.path().join("missing").exists());
    }

    #[tokio::test]
    async fn test_root_recreated_after_removal() {
        let (_dir, store) = ready_store().await;
        std::fs::remove_dir_all(store.root()).unwrap();

        assert!(store.write("a.txt", Bytes::from_static(b"x")).await.is_err());

        store.ensure_root().await.unwrap();
        store.write("a.txt", Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(&store.read("a.txt").await.unwrap()[..], b"x");
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temp_file() {
        let (_dir, store) = ready_store().await;
        // A non-empty directory cannot be replaced by a rename.
        std::fs::create_dir(store.root().join("taken.txt")).unwrap();
        std::fs::write(store.root().join("taken.txt").join("inner"), b"keep").unwrap();

        let result = store.write("taken.txt", Bytes::from_static(b"new")).await;
        assert!(matches!(result, Err(StoreError::WriteFailed { .. })));

        let entries: Vec<_> = std::fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("taken.txt")]);
    }

    #[tokio::test]
    async fn test_temp_upload_dropped_in_runtime_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let temp = TempUpload::new(dir.path());
        std::fs::write(temp.path(), b"partial").unwrap();
        let path = temp.path().to_path_buf();

        drop(temp);
        for _ in 0..50 {
            if !path.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_temp_upload_cleanup_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path;
        {
            let temp = TempUpload::new(dir.path());
            std::fs::write(temp.path(), b"partial").unwrap();
            path = temp.path().to_path_buf();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
