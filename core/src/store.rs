//! Cache store: one flat directory, one file per [`CacheKey`].
//!
//! Entries are written to a hidden temp file in the same directory and renamed
//! onto the key path on commit, so readers only ever observe a missing entry or
//! a complete one. Entries are never modified or deleted afterwards.

use crate::key::CacheKey;
use crate::Result;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tempfile::TempPath;
use tokio::fs::{self, File};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Mode of committed entries on Unix.
#[cfg(unix)]
pub const ENTRY_MODE: u32 = 0o644;

#[derive(Clone, Debug)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// A missing root and a missing entry both read as "not cached".
    pub async fn exists(&self, key: &CacheKey) -> Result<bool> {
        match fs::metadata(self.entry_path(key)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Creates the root and any missing parents. No-op when already present.
    pub async fn ensure_root_exists(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    pub async fn open_for_read(&self, key: &CacheKey) -> Result<File> {
        Ok(File::open(self.entry_path(key)).await?)
    }

    /// Opens a writer for `key`. Nothing is visible under the key path until
    /// [`EntryWriter::commit`] succeeds.
    pub async fn open_for_write(&self, key: &CacheKey) -> Result<EntryWriter> {
        let target = self.entry_path(key);
        let tmp = tempfile::Builder::new()
            .prefix(&format!(".{}.", key))
            .suffix(".partial")
            .tempfile_in(&self.root)?;
        let (file, temp_path) = tmp.into_parts();
        debug!(target: "cache", temp = ?temp_path, "Opened cache entry for write");

        Ok(EntryWriter {
            file: File::from_std(file),
            temp_path,
            target,
            written: 0,
        })
    }
}

/// Pending cache entry. Dropping it without calling [`commit`](Self::commit)
/// removes the temp file.
pub struct EntryWriter {
    file: File,
    temp_path: TempPath,
    target: PathBuf,
    written: u64,
}

impl EntryWriter {
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Flushes and closes the file, then renames it onto the key path.
    /// Returns the final entry path.
    pub async fn commit(mut self) -> Result<PathBuf> {
        self.file.flush().await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            // tempfile creates 0600; entries are shared by every user of the cache
            self.file
                .set_permissions(std::fs::Permissions::from_mode(ENTRY_MODE))
                .await?;
        }
        self.file.sync_all().await?;

        let EntryWriter {
            file,
            temp_path,
            target,
            written,
        } = self;
        drop(file);

        temp_path.persist(&target).map_err(|e| e.error)?;
        debug!(target: "cache", path = ?target, bytes = written, "Committed cache entry");
        Ok(target)
    }
}

impl AsyncWrite for EntryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.file).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            this.written += *n as u64;
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().file).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().file).poll_shutdown(cx)
    }
}
