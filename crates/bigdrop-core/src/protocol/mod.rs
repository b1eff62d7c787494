//! Wire types for the three-message transfer protocol.
//!
//! Every response body is an [`ApiResponse`] envelope whose `code` mirrors
//! the HTTP status, so clients behind proxies that rewrite statuses can
//! still tell success from failure. Field names go over the wire in
//! camelCase (`fileHash`, `shouldUpload`, `uploadedChunks`).

use serde::{Deserialize, Serialize};

/// Envelope wrapping every store response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Mirrors the HTTP status code (200, 400, 500).
    pub code: u16,
    /// Human-readable outcome description.
    pub message: String,
    /// Operation payload, absent on errors and payload-free successes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// A 200 response carrying `data`.
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            code: 200,
            message: message.into(),
            data: Some(data),
        }
    }

    /// A 200 response with no payload.
    pub fn ok_empty(message: impl Into<String>) -> Self {
        Self {
            code: 200,
            message: message.into(),
            data: None,
        }
    }

    /// An error response with the given envelope code.
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// `POST /verify` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// Original filename, used only for its extension.
    pub filename: String,
    /// Content fingerprint of the whole file.
    pub file_hash: String,
}

/// `POST /verify` response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyData {
    /// `false` when the artifact already exists (instant transfer).
    pub should_upload: bool,
    /// Chunk ids already placed for this fingerprint; the resumption set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_chunks: Option<Vec<String>>,
}

impl VerifyData {
    /// The artifact is already stored; nothing to upload.
    #[must_use]
    pub const fn already_stored() -> Self {
        Self {
            should_upload: false,
            uploaded_chunks: None,
        }
    }

    /// Upload needed; `uploaded` is the set of chunks to skip.
    #[must_use]
    pub const fn needs_upload(uploaded: Vec<String>) -> Self {
        Self {
            should_upload: true,
            uploaded_chunks: Some(uploaded),
        }
    }
}

/// `POST /merge` request body.
///
/// `size` is the sender's chunk size. The store accepts it for wire
/// compatibility but does not need it: chunks are streamed sequentially.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    /// Content fingerprint whose chunks should be assembled.
    pub file_hash: String,
    /// Original filename, used only for its extension.
    pub filename: String,
    /// Chunk size used by the sender. Unused by the store.
    #[serde(default)]
    pub size: u64,
}

/// `POST /merge` response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeData {
    /// Public URL of the assembled artifact.
    pub url: String,
}
