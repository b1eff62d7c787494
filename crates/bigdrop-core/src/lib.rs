//! # Bigdrop Core Library
//!
//! `bigdrop-core` provides the core functionality for Bigdrop, a resumable
//! chunked file upload system with content-addressed deduplication.
//!
//! ## How a transfer works
//!
//! 1. The file is fingerprinted with a fast sampling hash ([`fingerprint`]).
//! 2. The store is asked whether it already holds the content
//!    ([`client::StoreClient::verify`]); if so the upload is skipped entirely
//!    ("instant transfer").
//! 3. Otherwise the file is split into fixed-size chunks ([`chunk`]) and the
//!    chunks missing from the store's inventory are uploaded with bounded
//!    concurrency ([`upload`]).
//! 4. Once every chunk is stored, the store merges them into the final
//!    artifact ([`store`]) and returns its download URL.
//!
//! Interrupted uploads resume from the store's inventory: chunks already
//! placed are never sent again.
//!
//! ## Modules
//!
//! - [`chunk`] - Chunk range computation and chunk id handling
//! - [`client`] - Store client trait and HTTP implementation
//! - [`config`] - Configuration management
//! - [`fingerprint`] - Sampling content fingerprint
//! - [`protocol`] - Wire types for the verify/upload/merge handshake
//! - [`store`] - Store-side chunk inventory and merge
//! - [`upload`] - Sender-side upload scheduler
//! - [`web`] - HTTP surface of the store

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod chunk;
pub mod client;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod protocol;
pub mod store;
pub mod upload;

#[cfg(feature = "web")]
pub mod web;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default chunk size for uploads (10 MiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum parallel chunk uploads
pub const DEFAULT_PARALLEL_CHUNKS: usize = 4;

/// Upload attempts per chunk before the session is failed
pub const MAX_CHUNK_RETRIES: u32 = 3;

/// Sampling window read whole at the head and tail of a file (2 MiB)
pub const SAMPLE_WINDOW: u64 = 2 * 1024 * 1024;

/// Probe size taken at each stride between head and tail (2 KiB)
pub const SAMPLE_PROBE: u64 = 2 * 1024;

/// Length of a fingerprint rendered as lowercase hex
pub const FINGERPRINT_HEX_LEN: usize = 32;

/// Default port for the store server
pub const DEFAULT_SERVER_PORT: u16 = 3000;

/// Per-chunk upload timeout in seconds
pub const DEFAULT_CHUNK_TIMEOUT_SECS: u64 = 120;

/// Minimum interval between speed/ETA samples (milliseconds)
pub const PROGRESS_SAMPLE_INTERVAL_MS: u64 = 500;
