//! Blob stores holding offloaded heavy payloads.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::BlobStoreError;
use crate::ports::BlobStore;

/// Filesystem layout `<root>/<disk>/<bucket>/<key>`.
///
/// Without a bucket the key sits directly under the disk directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a blob is read from. Rejects segments that would leave the root.
    pub fn blob_path(
        &self,
        disk: &str,
        bucket: Option<&str>,
        key: &str,
    ) -> Result<PathBuf, BlobStoreError> {
        let mut path = self.root.join(safe_segment(disk)?);
        if let Some(bucket) = bucket.filter(|b| !b.is_empty()) {
            path.push(safe_segment(bucket)?);
        }
        path.push(safe_segment(key)?);
        Ok(path)
    }
}

fn safe_segment(segment: &str) -> Result<&str, BlobStoreError> {
    if segment.is_empty() || segment == "." || segment == ".." || segment.contains(['/', '\\']) {
        return Err(BlobStoreError::Backend(format!(
            "invalid path segment {segment:?}"
        )));
    }
    Ok(segment)
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get(
        &self,
        disk: &str,
        bucket: Option<&str>,
        key: &str,
    ) -> Result<Vec<u8>, BlobStoreError> {
        let path = self.blob_path(disk, bucket, key)?;
        debug!(path = %path.display(), "Reading offloaded payload");
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobStoreError::NotFound {
                disk: disk.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(BlobStoreError::Io(e)),
        }
    }
}

type BlobKey = (String, Option<String>, String);

/// [`BlobStore`] backed by a map, for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<BlobKey, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, disk: &str, bucket: Option<&str>, key: &str, bytes: impl Into<Vec<u8>>) {
        self.blobs.write().insert(
            (disk.to_string(), bucket.map(str::to_string), key.to_string()),
            bytes.into(),
        );
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get(
        &self,
        disk: &str,
        bucket: Option<&str>,
        key: &str,
    ) -> Result<Vec<u8>, BlobStoreError> {
        let lookup = (disk.to_string(), bucket.map(str::to_string), key.to_string());
        self.blobs
            .read()
            .get(&lookup)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound {
                disk: disk.to_string(),
                key: key.to_string(),
            })
    }
}
