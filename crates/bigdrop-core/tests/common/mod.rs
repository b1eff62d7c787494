//! Shared helpers for integration tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use bigdrop_core::client::StoreClient;
use bigdrop_core::error::{Error, Result};
use bigdrop_core::protocol::{MergeData, VerifyData};

/// Scripted in-memory store for exercising the upload scheduler without a
/// network. Failure counts, artificial latency, and pre-stored chunks are
/// all configurable; every interaction is recorded for assertions.
#[derive(Default)]
pub struct MockStoreClient {
    /// Pretend the artifact already exists (instant transfer).
    pub artifact_exists: bool,
    /// Chunk ids verify reports as already placed.
    pub preplaced_chunks: Vec<String>,
    /// Per-chunk transient failure budget: fail this many times, then
    /// succeed.
    pub fail_times: Mutex<HashMap<String, u32>>,
    /// Chunk ids that fail every attempt.
    pub fail_always: HashSet<String>,
    /// Artificial latency per put_chunk call.
    pub latency: Option<Duration>,

    /// Chunk payloads received, keyed by chunk id.
    pub received: Mutex<HashMap<String, Vec<u8>>>,
    /// Every put_chunk call in arrival order, including failed attempts.
    pub put_calls: Mutex<Vec<String>>,
    /// Number of merge calls.
    pub merge_count: AtomicUsize,
    /// Currently executing put_chunk calls.
    pub in_flight: AtomicUsize,
    /// Highest number of concurrent put_chunk calls observed.
    pub max_in_flight: AtomicUsize,
}

impl MockStoreClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunk ids that were successfully received, in arrival order.
    pub fn received_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.received.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Reassemble received chunk payloads in ascending index order.
    pub fn assembled_bytes(&self) -> Vec<u8> {
        let received = self.received.lock().unwrap();
        let mut ids: Vec<&String> = received.keys().collect();
        ids.sort_by_key(|id| {
            id.rsplit('-')
                .next()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(usize::MAX)
        });
        ids.iter().flat_map(|id| received[*id].clone()).collect()
    }

    fn should_fail(&self, chunk_id: &str) -> bool {
        if self.fail_always.contains(chunk_id) {
            return true;
        }
        let mut budgets = self.fail_times.lock().unwrap();
        match budgets.get_mut(chunk_id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl StoreClient for MockStoreClient {
    async fn verify(&self, _filename: &str, _file_hash: &str) -> Result<VerifyData> {
        if self.artifact_exists {
            Ok(VerifyData::already_stored())
        } else {
            Ok(VerifyData::needs_upload(self.preplaced_chunks.clone()))
        }
    }

    async fn put_chunk(&self, _file_hash: &str, chunk_id: &str, bytes: Vec<u8>) -> Result<()> {
        self.put_calls.lock().unwrap().push(chunk_id.to_string());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.should_fail(chunk_id) {
            return Err(Error::Http(format!("injected failure for {chunk_id}")));
        }

        self.received
            .lock()
            .unwrap()
            .insert(chunk_id.to_string(), bytes);
        Ok(())
    }

    async fn merge(&self, file_hash: &str, filename: &str, _chunk_size: u64) -> Result<MergeData> {
        self.merge_count.fetch_add(1, Ordering::SeqCst);
        let ext = filename
            .rfind('.')
            .map(|pos| &filename[pos..])
            .unwrap_or("");
        Ok(MergeData {
            url: format!("/uploads/{file_hash}{ext}"),
        })
    }
}

/// Write a deterministic test file of `size` bytes.
pub fn write_test_file(dir: &Path, name: &str, size: usize) -> PathBuf {
    let path = dir.join(name);
    let bytes: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, bytes).expect("write test file");
    path
}
