//! Store transport abstraction.
//!
//! [`StoreClient`] is the seam between the upload scheduler and the wire:
//! the scheduler only ever talks to this trait, so tests can swap in a
//! scripted client and exercise retry, pause, and resumption logic without
//! a network. [`HttpStoreClient`] is the production implementation speaking
//! the store's HTTP surface.

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::{MergeData, VerifyData};

#[cfg(feature = "http-client")]
pub use http::HttpStoreClient;

/// Transport to a chunk store.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Ask the store whether the file needs uploading and which chunks it
    /// already holds.
    async fn verify(&self, filename: &str, file_hash: &str) -> Result<VerifyData>;

    /// Send one chunk's bytes.
    async fn put_chunk(&self, file_hash: &str, chunk_id: &str, bytes: Vec<u8>) -> Result<()>;

    /// Ask the store to assemble the artifact from its placed chunks.
    async fn merge(&self, file_hash: &str, filename: &str, chunk_size: u64) -> Result<MergeData>;
}

#[cfg(feature = "http-client")]
mod http {
    use async_trait::async_trait;
    use reqwest::multipart::{Form, Part};
    use serde::de::DeserializeOwned;
    use tracing::debug;

    use crate::error::{Error, Result};
    use crate::protocol::{ApiResponse, MergeData, MergeRequest, VerifyData, VerifyRequest};

    use super::StoreClient;

    /// HTTP implementation of [`StoreClient`] backed by `reqwest`.
    ///
    /// No overall request timeout is configured: a chunk upload on a slow
    /// link can legitimately take minutes, and the scheduler applies its
    /// own per-chunk timeout.
    #[derive(Debug, Clone)]
    pub struct HttpStoreClient {
        base_url: String,
        http: reqwest::Client,
    }

    impl HttpStoreClient {
        /// Create a client for the store at `base_url`
        /// (e.g. `http://localhost:3000`).
        ///
        /// # Errors
        ///
        /// Returns [`Error::Http`] if the underlying client cannot be built.
        pub fn new(base_url: impl Into<String>) -> Result<Self> {
            let http = reqwest::Client::builder()
                .build()
                .map_err(|e| Error::Http(e.to_string()))?;
            Ok(Self {
                base_url: base_url.into().trim_end_matches('/').to_string(),
                http,
            })
        }

        fn url(&self, path: &str) -> String {
            format!("{}{path}", self.base_url)
        }

        /// Unwrap the response envelope, turning non-200 envelope codes
        /// into [`Error::Store`].
        async fn unwrap_envelope<T: DeserializeOwned>(
            response: reqwest::Response,
        ) -> Result<Option<T>> {
            let envelope: ApiResponse<T> = response
                .json()
                .await
                .map_err(|e| Error::Http(e.to_string()))?;
            if envelope.code == 200 {
                Ok(envelope.data)
            } else {
                Err(Error::Store(envelope.message))
            }
        }
    }

    #[async_trait]
    impl StoreClient for HttpStoreClient {
        async fn verify(&self, filename: &str, file_hash: &str) -> Result<VerifyData> {
            debug!(file_hash, "verifying with store");
            let response = self
                .http
                .post(self.url("/verify"))
                .json(&VerifyRequest {
                    filename: filename.to_string(),
                    file_hash: file_hash.to_string(),
                })
                .send()
                .await
                .map_err(|e| Error::Http(e.to_string()))?;

            Self::unwrap_envelope::<VerifyData>(response)
                .await?
                .ok_or_else(|| Error::Http("verify response missing data".to_string()))
        }

        async fn put_chunk(&self, file_hash: &str, chunk_id: &str, bytes: Vec<u8>) -> Result<()> {
            let form = Form::new()
                .text("hash", chunk_id.to_string())
                .text("fileHash", file_hash.to_string())
                .part("chunk", Part::bytes(bytes).file_name(chunk_id.to_string()));

            let response = self
                .http
                .post(self.url("/upload"))
                .multipart(form)
                .send()
                .await
                .map_err(|e| Error::Http(e.to_string()))?;

            Self::unwrap_envelope::<serde_json::Value>(response).await?;
            Ok(())
        }

        async fn merge(&self, file_hash: &str, filename: &str, chunk_size: u64) -> Result<MergeData> {
            debug!(file_hash, "requesting merge");
            let response = self
                .http
                .post(self.url("/merge"))
                .json(&MergeRequest {
                    file_hash: file_hash.to_string(),
                    filename: filename.to_string(),
                    size: chunk_size,
                })
                .send()
                .await
                .map_err(|e| Error::Http(e.to_string()))?;

            Self::unwrap_envelope::<MergeData>(response)
                .await?
                .ok_or_else(|| Error::Http("merge response missing data".to_string()))
        }
    }

}
