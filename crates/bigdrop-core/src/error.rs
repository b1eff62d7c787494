//! Error types for Bigdrop.
//!
//! This module provides a unified error type for all Bigdrop operations,
//! with specific error variants for different failure modes.

use std::io;

use thiserror::Error;

/// A specialized `Result` type for Bigdrop operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Bigdrop.
#[derive(Error, Debug)]
pub enum Error {
    /// Fingerprint does not match the fixed-length hex format
    #[error("invalid fingerprint '{0}': expected a 32-character hex string")]
    InvalidFingerprint(String),

    /// Filename contains a path separator or a parent-directory segment
    #[error("invalid filename '{0}': path separators and '..' are not allowed")]
    InvalidFilename(String),

    /// Chunk id is not scoped to the session's fingerprint
    #[error("chunk id '{chunk_id}' does not belong to fingerprint '{fingerprint}'")]
    ChunkIdMismatch {
        /// The offending chunk id
        chunk_id: String,
        /// The fingerprint the request claimed
        fingerprint: String,
    },

    /// I/O failure while reading the file during fingerprinting
    #[error("failed to read file for fingerprinting: {0}")]
    ReadFailure(#[source] io::Error),

    /// A single chunk transfer failed (retried by the scheduler)
    #[error("chunk '{chunk_id}' failed to upload after {attempts} attempts: {reason}")]
    ChunkTransferFailed {
        /// The chunk that exhausted its retry budget
        chunk_id: String,
        /// Attempts made before giving up
        attempts: u32,
        /// Last failure observed
        reason: String,
    },

    /// A chunk transfer exceeded its timeout
    #[error("chunk '{chunk_id}' timed out after {secs} seconds")]
    ChunkTimeout {
        /// The chunk that timed out
        chunk_id: String,
        /// The timeout that elapsed
        secs: u64,
    },

    /// Merge was requested but no chunk inventory exists for the fingerprint
    #[error("no chunks found for fingerprint '{0}'")]
    ChunksNotFound(String),

    /// The inventory exists but holds no entries that are valid chunk ids
    #[error("no valid chunks found for fingerprint '{0}'")]
    NoValidChunks(String),

    /// I/O failure while streaming chunks into the final artifact
    #[error("merge stream failed for fingerprint '{fingerprint}': {source}")]
    MergeStream {
        /// Fingerprint being merged
        fingerprint: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The store rejected a request (application-level error response)
    #[error("store rejected request: {0}")]
    Store(String),

    /// Transport-level HTTP failure talking to the store
    #[error("HTTP error: {0}")]
    Http(String),

    /// No upload session exists (no file selected yet)
    #[error("no file selected")]
    NoSession,

    /// Configuration file error
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns whether this error was caused by bad client input.
    ///
    /// Input errors are detected before any side effect and map to HTTP 400.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidFingerprint(_) | Self::InvalidFilename(_) | Self::ChunkIdMismatch { .. }
        )
    }

    /// Returns whether a single chunk failure with this error may be retried
    /// by the scheduler before failing the session.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Store(_) | Self::ChunkTimeout { .. } | Self::Io(_)
        )
    }
}
