//! Blob storage for docstore.
//!
//! Blobs are plain files in a single flat directory, keyed by their stored
//! name:
//! ```text
//! {root}/
//! ├── report.txt
//! ├── slides.pdf
//! └── ...
//! ```
//!
//! Writes never overwrite. Content is first written to a hidden staging
//! file and then linked into place, so a blob is either absent or complete.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::{DocstoreError, Result};

/// Flat directory of blobs addressed by stored name.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Create a blob store rooted at the given directory.
    ///
    /// No I/O happens here; see [`BlobStore::ensure_root`].
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Get the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory (and parents) if missing.
    pub async fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Resolve a stored name to its path under the root.
    ///
    /// Names must be a single path component.
    pub fn blob_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(DocstoreError::Validation(format!(
                "invalid blob name: {name:?}"
            )));
        }
        Ok(self.root.join(name))
    }

    /// Write a new blob.
    ///
    /// Fails with [`DocstoreError::AlreadyExists`] if a blob with the same
    /// name is present; the existing blob is left untouched.
    pub async fn write(&self, name: &str, content: &[u8]) -> Result<PathBuf> {
        let target = self.blob_path(name)?;
        let staging = self.root.join(format!(".{}.part", Uuid::new_v4()));

        if let Err(e) = write_staged(&staging, content).await {
            discard_staged(&staging).await;
            return Err(e.into());
        }

        // hard_link refuses to replace an existing file.
        let published = fs::hard_link(&staging, &target).await;
        discard_staged(&staging).await;

        match published {
            Ok(()) => {
                debug!(blob = name, bytes = content.len(), "Blob written");
                Ok(target)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(DocstoreError::AlreadyExists(format!("blob {name}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read a whole blob into memory.
    pub async fn read_all(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(name)?;
        fs::read(&path).await.map_err(|e| not_found_or_io(e, name))
    }

    /// Read exactly `length` bytes starting at offset `start`.
    ///
    /// Fails with [`DocstoreError::RangeOutOfBounds`] if the window runs
    /// past the end of the blob.
    pub async fn read_range(&self, name: &str, start: u64, length: u64) -> Result<Vec<u8>> {
        let path = self.blob_path(name)?;
        let mut file = fs::File::open(&path)
            .await
            .map_err(|e| not_found_or_io(e, name))?;

        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(DocstoreError::NotFound(format!("blob {name}")));
        }

        let size = metadata.len();
        let out_of_bounds = DocstoreError::RangeOutOfBounds {
            start,
            length,
            size,
        };
        match start.checked_add(length) {
            Some(end) if end <= size => {}
            _ => return Err(out_of_bounds),
        }
        let Ok(len) = usize::try_from(length) else {
            return Err(out_of_bounds);
        };

        file.seek(SeekFrom::Start(start)).await?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).await?;

        Ok(buf)
    }

    /// Get the size of a blob in bytes.
    pub async fn size(&self, name: &str) -> Result<u64> {
        let path = self.blob_path(name)?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| not_found_or_io(e, name))?;
        if !metadata.is_file() {
            return Err(DocstoreError::NotFound(format!("blob {name}")));
        }
        Ok(metadata.len())
    }

    /// Check if a blob exists.
    pub async fn exists(&self, name: &str) -> bool {
        match self.blob_path(name) {
            Ok(path) => fs::metadata(&path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Delete a blob.
    ///
    /// Returns `false` if there was nothing to delete.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let path = self.blob_path(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove everything under the root, keeping the root itself.
    ///
    /// Entries that disappear while the purge runs are skipped. A missing
    /// root is not an error. Returns the number of entries removed.
    pub async fn purge_all(&self) -> Result<usize> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || purge_tree(&root))
            .await
            .map_err(|e| DocstoreError::TaskFailed(format!("purge interrupted: {e}")))?
    }
}

async fn write_staged(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    Ok(())
}

async fn discard_staged(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Could not remove staging file");
        }
    }
}

fn not_found_or_io(e: io::Error, name: &str) -> DocstoreError {
    if e.kind() == io::ErrorKind::NotFound {
        DocstoreError::NotFound(format!("blob {name}"))
    } else {
        DocstoreError::Io(e)
    }
}

fn purge_tree(root: &Path) -> Result<usize> {
    let mut removed = 0;

    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound) => {
                continue;
            }
            Err(e) => return Err(io::Error::from(e).into()),
        };

        let result = if entry.file_type().is_dir() {
            std::fs::remove_dir(entry.path())
        } else {
            std::fs::remove_file(entry.path())
        };

        match result {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    debug!(root = %root.display(), removed, "Purged blob storage");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_store() -> (BlobStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = BlobStore::new(temp_dir.path().join("blobs"));
        store.ensure_root().await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_new_does_not_touch_disk() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("later");
        let store = BlobStore::new(&root);

        assert!(!root.exists());
        store.ensure_root().await.unwrap();
        assert!(root.is_dir());
        assert_eq!(store.root(), root);
    }

    #[tokio::test]
    async fn test_write_and_read_all() {
        let (store, _temp) = create_test_store().await;

        let path = store.write("hello.txt", b"Hello, World!").await.unwrap();
        assert_eq!(path, store.root().join("hello.txt"));

        let loaded = store.read_all("hello.txt").await.unwrap();
        assert_eq!(loaded, b"Hello, World!");
    }

    #[tokio::test]
    async fn test_write_refuses_to_overwrite() {
        let (store, _temp) = create_test_store().await;

        store.write("a.txt", b"first").await.unwrap();
        let result = store.write("a.txt", b"second").await;

        assert!(matches!(result, Err(DocstoreError::AlreadyExists(_))));
        assert_eq!(store.read_all("a.txt").await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_write_leaves_no_staging_files() {
        let (store, _temp) = create_test_store().await;

        store.write("a.txt", b"one").await.unwrap();
        let _ = store.write("a.txt", b"two").await;

        let names: Vec<_> = std::fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["a.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_write_empty_blob() {
        let (store, _temp) = create_test_store().await;

        store.write("empty.bin", b"").await.unwrap();
        assert_eq!(store.size("empty.bin").await.unwrap(), 0);
        assert!(store.read_all("empty.bin").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blob_path_rejects_nested_names() {
        let (store, _temp) = create_test_store().await;

        assert!(store.blob_path("plain.txt").is_ok());
        for bad in ["", ".", "..", "../x", "a/b", "a\\b"] {
            assert!(
                matches!(store.blob_path(bad), Err(DocstoreError::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(store.write("../escape.txt", b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_read_all_not_found() {
        let (store, _temp) = create_test_store().await;

        let result = store.read_all("missing.txt").await;
        assert!(matches!(result, Err(DocstoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_read_range() {
        let (store, _temp) = create_test_store().await;
        let content: Vec<u8> = (0..100u8).collect();
        store.write("data.bin", &content).await.unwrap();

        let head = store.read_range("data.bin", 0, 50).await.unwrap();
        assert_eq!(head, &content[..50]);

        let tail = store.read_range("data.bin", 90, 10).await.unwrap();
        assert_eq!(tail, &content[90..]);

        let whole = store.read_range("data.bin", 0, 100).await.unwrap();
        assert_eq!(whole, content);

        let nothing = store.read_range("data.bin", 100, 0).await.unwrap();
        assert!(nothing.is_empty());
    }

    #[tokio::test]
    async fn test_read_range_out_of_bounds() {
        let (store, _temp) = create_test_store().await;
        store.write("data.bin", &[0u8; 100]).await.unwrap();

        let result = store.read_range("data.bin", 90, 20).await;
        assert!(matches!(
            result,
            Err(DocstoreError::RangeOutOfBounds {
                start: 90,
                length: 20,
                size: 100
            })
        ));

        let result = store.read_range("data.bin", u64::MAX, 2).await;
        assert!(matches!(
            result,
            Err(DocstoreError::RangeOutOfBounds { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_range_not_found() {
        let (store, _temp) = create_test_store().await;

        let result = store.read_range("missing.bin", 0, 1).await;
        assert!(matches!(result, Err(DocstoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_size_and_exists() {
        let (store, _temp) = create_test_store().await;

        assert!(!store.exists("f.txt").await);
        assert!(matches!(
            store.size("f.txt").await,
            Err(DocstoreError::NotFound(_))
        ));

        store.write("f.txt", b"12345").await.unwrap();
        assert!(store.exists("f.txt").await);
        assert_eq!(store.size("f.txt").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _temp) = create_test_store().await;
        store.write("f.txt", b"x").await.unwrap();

        assert!(store.delete("f.txt").await.unwrap());
        assert!(!store.exists("f.txt").await);
        assert!(!store.delete("f.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_all_keeps_root() {
        let (store, _temp) = create_test_store().await;
        store.write("a.txt", b"a").await.unwrap();
        store.write("b.txt", b"b").await.unwrap();
        std::fs::create_dir_all(store.root().join("stray").join("nested")).unwrap();
        std::fs::write(store.root().join("stray").join("nested").join("c"), b"c").unwrap();

        let removed = store.purge_all().await.unwrap();
        assert_eq!(removed, 5);

        assert!(store.root().is_dir());
        assert_eq!(std::fs::read_dir(store.root()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_purge_all_twice() {
        let (store, _temp) = create_test_store().await;
        store.write("a.txt", b"a").await.unwrap();

        assert_eq!(store.purge_all().await.unwrap(), 1);
        assert_eq!(store.purge_all().await.unwrap(), 0);
        assert!(store.root().is_dir());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_purges_all_succeed() {
        let (store, _temp) = create_test_store().await;

        for round in 0..10 {
            for dir in 0..10 {
                let nested = store.root().join(format!("d{dir}")).join("inner");
                std::fs::create_dir_all(&nested).unwrap();
                for file in 0..20 {
                    std::fs::write(nested.join(format!("f{file}")), b"x").unwrap();
                }
            }
            store.write(&format!("top-{round}.txt"), b"top").await.unwrap();

            let (a, b, c) = tokio::join!(store.purge_all(), store.purge_all(), store.purge_all());
            let removed = a.unwrap() + b.unwrap() + c.unwrap();

            // 10 dirs, 10 inner dirs, 200 files and one blob.
            assert_eq!(removed, 221, "round {round}");
            assert_eq!(std::fs::read_dir(store.root()).unwrap().count(), 0);
        }
    }

    #[tokio::test]
    async fn test_purge_all_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let store = BlobStore::new(temp_dir.path().join("never-created"));

        assert_eq!(store.purge_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_binary_content() {
        let (store, _temp) = create_test_store().await;
        let content: Vec<u8> = (0..=255).collect();

        store.write("all-bytes.bin", &content).await.unwrap();
        assert_eq!(store.read_all("all-bytes.bin").await.unwrap(), content);
    }

    #[tokio::test]
    async fn test_unicode_name() {
        let (store, _temp) = create_test_store().await;

        store.write("日本語ファイル.txt", b"x").await.unwrap();
        assert!(store.exists("日本語ファイル.txt").await);
    }
}
