//! Chunk store: placement, inventory, and merge.
//!
//! The store keeps finished artifacts flat in its root directory, named
//! `<fingerprint><ext>` so identical content lands at the same path no
//! matter what the file was called. In-flight chunks live under
//! `temp/<fingerprint>/`, one file per chunk named by its chunk id.
//!
//! All writes go through a temp-file-plus-rename so a crashed upload never
//! leaves a half-written chunk or artifact where a later request would
//! mistake it for a complete one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::chunk::{is_valid_chunk_id, parse_chunk_index, validate_filename, validate_fingerprint};
use crate::error::{Error, Result};
use crate::FINGERPRINT_HEX_LEN;

/// Subdirectory of the store root holding per-fingerprint chunk directories.
const TEMP_DIR_NAME: &str = "temp";

/// Extract the extension of `filename`, dot included.
///
/// Mirrors the usual basename semantics: `"photo.tar.gz"` yields `".gz"`,
/// a name with no dot (or only a leading dot) yields the empty string.
#[must_use]
pub fn extract_ext(filename: &str) -> String {
    match filename.rfind('.') {
        Some(pos) if pos > 0 => filename[pos..].to_string(),
        _ => String::new(),
    }
}

/// Filesystem-backed chunk store.
///
/// Cheap to share behind an [`Arc`]; merges for the same fingerprint are
/// serialized through an internal per-fingerprint lock so concurrent merge
/// requests cannot interleave writes to one artifact.
#[derive(Debug)]
pub struct ChunkStore {
    root: PathBuf,
    merge_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ChunkStore {
    /// Create a store rooted at `root`. Directories are created lazily on
    /// first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            merge_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the finished artifact for `fingerprint` with extension `ext`.
    #[must_use]
    pub fn artifact_path(&self, fingerprint: &str, ext: &str) -> PathBuf {
        self.root.join(format!("{fingerprint}{ext}"))
    }

    /// Resolve a download name of the form `<fingerprint><ext>` to the
    /// artifact path it denotes.
    ///
    /// Only finished artifacts match this shape, so chunk inventories under
    /// `temp/` and merge scratch files can never be resolved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilename`] or [`Error::InvalidFingerprint`]
    /// if `name` is not a fingerprint-prefixed artifact name.
    pub fn resolve_artifact(&self, name: &str) -> Result<PathBuf> {
        validate_filename(name)?;
        let prefix = name
            .get(..FINGERPRINT_HEX_LEN)
            .ok_or_else(|| Error::InvalidFilename(name.to_string()))?;
        validate_fingerprint(prefix)?;
        Ok(self.root.join(name))
    }

    fn chunk_dir(&self, fingerprint: &str) -> PathBuf {
        self.root.join(TEMP_DIR_NAME).join(fingerprint)
    }

    /// Whether the finished artifact for `fingerprint` already exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFingerprint`] on a malformed fingerprint.
    pub fn has_artifact(&self, fingerprint: &str, ext: &str) -> Result<bool> {
        validate_fingerprint(fingerprint)?;
        Ok(self.artifact_path(fingerprint, ext).exists())
    }

    /// List the chunk ids already placed for `fingerprint`, in ascending
    /// chunk-index order.
    ///
    /// A fingerprint with no chunk directory yields an empty list, which is
    /// exactly what a fresh upload looks like.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFingerprint`] on a malformed fingerprint, or
    /// an I/O error if the directory cannot be read.
    pub async fn list_chunks(&self, fingerprint: &str) -> Result<Vec<String>> {
        validate_fingerprint(fingerprint)?;

        let dir = self.chunk_dir(fingerprint);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_valid_chunk_id(fingerprint, &name) {
                names.push(name);
            }
        }

        names.sort_by_key(|name| parse_chunk_index(name));
        Ok(names)
    }

    /// Place one chunk. Idempotent: re-sending a chunk that is already on
    /// disk succeeds without rewriting it.
    ///
    /// The bytes land in a hidden temp file first and are renamed into place
    /// only after a successful flush, so the inventory never lists a partial
    /// chunk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFingerprint`] or [`Error::ChunkIdMismatch`]
    /// on malformed input, or an I/O error on write failure.
    pub async fn put_chunk(&self, fingerprint: &str, chunk_id: &str, data: &[u8]) -> Result<()> {
        validate_fingerprint(fingerprint)?;
        if !is_valid_chunk_id(fingerprint, chunk_id) {
            return Err(Error::ChunkIdMismatch {
                chunk_id: chunk_id.to_string(),
                fingerprint: fingerprint.to_string(),
            });
        }

        let dir = self.chunk_dir(fingerprint);
        fs::create_dir_all(&dir).await?;

        let final_path = dir.join(chunk_id);
        if final_path.exists() {
            debug!(chunk_id, "chunk already placed, skipping");
            return Ok(());
        }

        let tmp_path = dir.join(format!(".{chunk_id}.tmp"));
        let mut file = File::create(&tmp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &final_path).await?;
        debug!(chunk_id, bytes = data.len(), "chunk placed");
        Ok(())
    }

    /// Merge all placed chunks for `fingerprint` into the final artifact
    /// named after `filename`'s extension, then delete the chunk directory.
    ///
    /// Chunks are streamed in ascending index order through a temp file
    /// that is renamed into place at the end. Concurrent merges for the
    /// same fingerprint take turns; the later caller finds the artifact
    /// already present and returns its path without touching anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChunksNotFound`] if no chunk directory exists,
    /// [`Error::NoValidChunks`] if the directory holds no valid chunk
    /// files, or [`Error::MergeStream`] if streaming fails partway.
    pub async fn merge(&self, fingerprint: &str, filename: &str) -> Result<PathBuf> {
        validate_fingerprint(fingerprint)?;
        validate_filename(filename)?;

        let lock = self.merge_lock(fingerprint).await;
        let _guard = lock.lock().await;

        let ext = extract_ext(filename);
        let artifact = self.artifact_path(fingerprint, &ext);
        if artifact.exists() {
            debug!(fingerprint, "artifact already merged");
            drop(_guard);
            self.merge_locks.lock().await.remove(fingerprint);
            return Ok(artifact);
        }

        let dir = self.chunk_dir(fingerprint);
        if !dir.exists() {
            return Err(Error::ChunksNotFound(fingerprint.to_string()));
        }

        let chunks = self.list_chunks(fingerprint).await?;
        if chunks.is_empty() {
            return Err(Error::NoValidChunks(fingerprint.to_string()));
        }

        let tmp_path = self.root.join(format!(".{fingerprint}{ext}.part"));
        let stream_err = |source| Error::MergeStream {
            fingerprint: fingerprint.to_string(),
            source,
        };

        let mut out = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .await
            .map_err(stream_err)?;

        let mut total = 0u64;
        for chunk_id in &chunks {
            let mut input = File::open(dir.join(chunk_id)).await.map_err(stream_err)?;
            total += tokio::io::copy(&mut input, &mut out)
                .await
                .map_err(stream_err)?;
        }
        out.sync_all().await.map_err(stream_err)?;
        drop(out);

        fs::rename(&tmp_path, &artifact).await.map_err(stream_err)?;

        if let Err(e) = fs::remove_dir_all(&dir).await {
            warn!(fingerprint, error = %e, "failed to remove chunk directory");
        }

        info!(
            fingerprint,
            chunks = chunks.len(),
            bytes = total,
            path = %artifact.display(),
            "artifact merged"
        );

        // With the artifact in place, later callers short-circuit on the
        // existence check above; the lock entry has no further use.
        drop(_guard);
        self.merge_locks.lock().await.remove(fingerprint);
        Ok(artifact)
    }

    async fn merge_lock(&self, fingerprint: &str) -> Arc<Mutex<()>> {
        let mut locks = self.merge_locks.lock().await;
        locks
            .entry(fingerprint.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
