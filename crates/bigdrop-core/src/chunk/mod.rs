//! Chunk range computation and chunk id handling.
//!
//! A file of size `S` is split into `ceil(S / chunk_size)` fixed-size byte
//! ranges; only the final range may be shorter. Each range is addressed by a
//! chunk id of the form `"{fingerprint}-{index}"`, which is stable across
//! retries and resumed sessions: the same content always produces the same
//! fingerprint, and the index pins the byte range.

use crate::error::{Error, Result};
use crate::FINGERPRINT_HEX_LEN;

/// A fixed-size byte range of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    /// 0-based index of the range
    pub index: usize,
    /// Byte offset of the range start
    pub offset: u64,
    /// Length of the range in bytes
    pub len: u64,
}

/// Compute the chunk ranges covering `size` bytes.
///
/// Range `i` covers `[i * chunk_size, min(size, (i + 1) * chunk_size))`.
/// A zero-length input yields no ranges.
#[must_use]
pub fn chunk_ranges(size: u64, chunk_size: u64) -> Vec<ChunkRange> {
    assert!(chunk_size > 0, "chunk_size must be positive");

    let mut ranges = Vec::new();
    let mut offset = 0u64;
    while offset < size {
        let len = chunk_size.min(size - offset);
        ranges.push(ChunkRange {
            index: ranges.len(),
            offset,
            len,
        });
        offset += len;
    }
    ranges
}

/// Build the chunk id for `index` within a fingerprint's namespace.
#[must_use]
pub fn chunk_id(fingerprint: &str, index: usize) -> String {
    format!("{fingerprint}-{index}")
}

/// Extract the numeric index from a chunk id, if it has one.
///
/// Returns `None` for names whose suffix after the final `-` is not a
/// number. Stray directory entries (editor droppings, temp files) fail this
/// parse and are discarded by the merge path.
#[must_use]
pub fn parse_chunk_index(chunk_id: &str) -> Option<usize> {
    chunk_id.rsplit('-').next()?.parse().ok()
}

/// Check that `chunk_id` is scoped to `fingerprint` and carries a valid
/// numeric suffix.
#[must_use]
pub fn is_valid_chunk_id(fingerprint: &str, chunk_id: &str) -> bool {
    match chunk_id.strip_prefix(fingerprint) {
        Some(rest) => rest
            .strip_prefix('-')
            .is_some_and(|idx| idx.parse::<usize>().is_ok()),
        None => false,
    }
}

/// Validate that `fingerprint` matches the fixed-length lowercase hex format.
pub fn validate_fingerprint(fingerprint: &str) -> Result<()> {
    let ok = fingerprint.len() == FINGERPRINT_HEX_LEN
        && fingerprint
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidFingerprint(fingerprint.to_string()))
    }
}

/// Validate that `filename` is a bare file name.
///
/// Rejects path separators and parent-directory segments; this is the
/// path-traversal defense applied before any filesystem access.
pub fn validate_filename(filename: &str) -> Result<()> {
    if filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..")
    {
        return Err(Error::InvalidFilename(filename.to_string()));
    }
    Ok(())
}
