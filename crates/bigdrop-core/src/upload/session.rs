//! Session state for an upload in progress.

use std::time::{Duration, Instant};

use crate::chunk::{chunk_id, chunk_ranges};
use crate::PROGRESS_SAMPLE_INTERVAL_MS;

/// Lifecycle of one chunk within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// Not yet dispatched, or reset after a retryable failure.
    Pending,
    /// Claimed by a worker, transfer in flight.
    Uploading,
    /// Acknowledged by the store. Never re-sent.
    Completed,
    /// Retry budget exhausted.
    Error,
}

/// One chunk's bookkeeping, stable across retries and resumption.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// Zero-based position in the file.
    pub index: usize,
    /// `<fingerprint>-<index>`, the store-side name of this chunk.
    pub chunk_id: String,
    /// Byte offset of this chunk in the source file.
    pub offset: u64,
    /// Length of this chunk in bytes.
    pub byte_length: u64,
    /// Current lifecycle state.
    pub state: ChunkState,
    /// Failures so far.
    pub retry_count: u32,
    /// Bytes acknowledged by the store (0 or `byte_length`).
    pub transferred: u64,
}

/// Overall session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No file selected.
    #[default]
    Idle,
    /// Fingerprinting the selected file.
    Hashing,
    /// Chunks in flight.
    Uploading,
    /// Dispatch suspended; in-flight chunks may still finish.
    Paused,
    /// All chunks placed, waiting for the store to assemble them.
    Merging,
    /// Artifact stored; `download_url` is set.
    Completed,
    /// Terminal failure. A fresh `upload()` call starts over.
    Error,
}

impl SessionState {
    /// Human-readable name, used in logs and status lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Hashing => "hashing",
            Self::Uploading => "uploading",
            Self::Paused => "paused",
            Self::Merging => "merging",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable snapshot published on every state or progress change.
#[derive(Debug, Clone, Default)]
pub struct UploadStatus {
    /// Current session state.
    pub state: SessionState,
    /// Aggregate transfer progress, 0-100.
    pub progress: u8,
    /// Fingerprinting progress, 0-100.
    pub hash_progress: u8,
    /// Recent throughput in bytes per second, when known.
    pub speed_bps: Option<f64>,
    /// Estimated seconds to completion, when known.
    pub eta_secs: Option<u64>,
    /// Human-readable status line.
    pub message: String,
    /// URL of the stored artifact, set on completion.
    pub download_url: Option<String>,
}

/// Sender-owned state for one file's transfer.
#[derive(Debug)]
pub struct UploadSession {
    /// Content fingerprint of the file.
    pub fingerprint: String,
    /// Original filename, sent for its extension.
    pub filename: String,
    /// Total file size in bytes.
    pub total_size: u64,
    /// Chunk records in ascending index order.
    pub chunks: Vec<ChunkRecord>,
}

impl UploadSession {
    /// Build a session over `total_size` bytes, marking chunks whose ids
    /// appear in `already_stored` as completed so they are never re-sent.
    #[must_use]
    pub fn new(
        fingerprint: String,
        filename: String,
        total_size: u64,
        chunk_size: u64,
        already_stored: &[String],
    ) -> Self {
        let chunks = chunk_ranges(total_size, chunk_size)
            .into_iter()
            .map(|range| {
                let id = chunk_id(&fingerprint, range.index);
                let stored = already_stored.iter().any(|s| s == &id);
                ChunkRecord {
                    index: range.index,
                    chunk_id: id,
                    offset: range.offset,
                    byte_length: range.len,
                    state: if stored {
                        ChunkState::Completed
                    } else {
                        ChunkState::Pending
                    },
                    retry_count: 0,
                    transferred: if stored { range.len } else { 0 },
                }
            })
            .collect();

        Self {
            fingerprint,
            filename,
            total_size,
            chunks,
        }
    }

    /// Bytes acknowledged so far across all chunks.
    #[must_use]
    pub fn bytes_transferred(&self) -> u64 {
        self.chunks.iter().map(|c| c.transferred).sum()
    }

    /// Aggregate progress percentage, recomputed from the chunk set.
    #[must_use]
    pub fn progress(&self) -> u8 {
        if self.total_size == 0 {
            return 100;
        }
        #[allow(clippy::cast_possible_truncation)]
        let pct = (self.bytes_transferred() * 100 / self.total_size) as u8;
        pct.min(100)
    }

    /// Whether every chunk has been acknowledged.
    #[must_use]
    pub fn all_completed(&self) -> bool {
        self.chunks.iter().all(|c| c.state == ChunkState::Completed)
    }

    /// Whether any chunk has exhausted its retry budget.
    #[must_use]
    pub fn any_failed(&self) -> bool {
        self.chunks.iter().any(|c| c.state == ChunkState::Error)
    }

    /// Whether any chunk is still waiting for a worker.
    #[must_use]
    pub fn any_pending(&self) -> bool {
        self.chunks.iter().any(|c| c.state == ChunkState::Pending)
    }

    /// Claim the lowest-index pending chunk, marking it uploading.
    pub fn claim_next_pending(&mut self) -> Option<ChunkRecord> {
        let record = self
            .chunks
            .iter_mut()
            .find(|c| c.state == ChunkState::Pending)?;
        record.state = ChunkState::Uploading;
        Some(record.clone())
    }
}

/// Throughput and ETA accounting, sampled at most once per
/// [`PROGRESS_SAMPLE_INTERVAL_MS`] so observers are not flooded.
#[derive(Debug)]
pub struct ThroughputMeter {
    baseline_at: Instant,
    baseline_bytes: u64,
    last_sample_at: Option<Instant>,
    /// Most recent speed estimate, bytes per second.
    pub speed_bps: Option<f64>,
    /// Most recent ETA estimate, seconds.
    pub eta_secs: Option<u64>,
}

impl ThroughputMeter {
    /// Start a meter with `baseline_bytes` already transferred, so resumed
    /// uploads do not count previously stored chunks as fresh throughput.
    #[must_use]
    pub fn new(baseline_bytes: u64) -> Self {
        Self {
            baseline_at: Instant::now(),
            baseline_bytes,
            last_sample_at: None,
            speed_bps: None,
            eta_secs: None,
        }
    }

    /// Update speed and ETA from the current byte count. Returns `true`
    /// when new estimates were produced.
    pub fn sample(&mut self, loaded: u64, total: u64) -> bool {
        self.sample_at(Instant::now(), loaded, total)
    }

    fn sample_at(&mut self, now: Instant, loaded: u64, total: u64) -> bool {
        if let Some(last) = self.last_sample_at {
            if now.duration_since(last) < Duration::from_millis(PROGRESS_SAMPLE_INTERVAL_MS) {
                return false;
            }
        }
        self.last_sample_at = Some(now);

        let elapsed = now.duration_since(self.baseline_at).as_secs_f64();
        #[allow(clippy::cast_precision_loss)]
        let gained = loaded.saturating_sub(self.baseline_bytes) as f64;
        let speed = gained / elapsed;
        if !speed.is_finite() || speed <= 0.0 {
            self.speed_bps = None;
            self.eta_secs = None;
            return true;
        }

        self.speed_bps = Some(speed);
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            let remaining = total.saturating_sub(loaded) as f64;
            self.eta_secs = Some((remaining / speed).ceil() as u64);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FP: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn new_session_marks_stored_chunks_completed() {
        let stored = vec![format!("{FP}-1")];
        let session = UploadSession::new(FP.into(), "a.bin".into(), 25, 10, &stored);

        assert_eq!(session.chunks.len(), 3);
        assert_eq!(session.chunks[0].state, ChunkState::Pending);
        assert_eq!(session.chunks[1].state, ChunkState::Completed);
        assert_eq!(session.chunks[1].transferred, 10);
        assert_eq!(session.chunks[2].state, ChunkState::Pending);
        assert_eq!(session.progress(), 40);
    }

    #[test]
    fn claim_takes_lowest_pending_index() {
        let mut session = UploadSession::new(FP.into(), "a.bin".into(), 25, 10, &[]);
        session.chunks[0].state = ChunkState::Completed;

        let claimed = session.claim_next_pending().expect("pending chunk");
        assert_eq!(claimed.index, 1);
        assert_eq!(session.chunks[1].state, ChunkState::Uploading);
    }

    #[test]
    fn claim_returns_none_when_drained() {
        let mut session = UploadSession::new(FP.into(), "a.bin".into(), 5, 10, &[]);
        session.chunks[0].state = ChunkState::Completed;
        assert!(session.claim_next_pending().is_none());
        assert!(session.all_completed());
    }

    #[test]
    fn progress_of_empty_file_is_complete() {
        let session = UploadSession::new(FP.into(), "a.bin".into(), 0, 10, &[]);
        assert!(session.chunks.is_empty());
        assert_eq!(session.progress(), 100);
        assert!(session.all_completed());
    }

    #[test]
    fn meter_computes_speed_and_eta() {
        let mut meter = ThroughputMeter::new(0);
        let later = meter.baseline_at + Duration::from_secs(2);

        assert!(meter.sample_at(later, 200, 1000));
        let speed = meter.speed_bps.expect("speed");
        assert!((speed - 100.0).abs() < 1e-6);
        assert_eq!(meter.eta_secs, Some(8));
    }

    #[test]
    fn meter_throttles_rapid_samples() {
        let mut meter = ThroughputMeter::new(0);
        let t1 = meter.baseline_at + Duration::from_secs(1);
        let t2 = t1 + Duration::from_millis(100);

        assert!(meter.sample_at(t1, 100, 1000));
        assert!(!meter.sample_at(t2, 200, 1000));
    }

    #[test]
    fn meter_reports_unknown_for_zero_speed() {
        let mut meter = ThroughputMeter::new(500);
        let later = meter.baseline_at + Duration::from_secs(1);

        assert!(meter.sample_at(later, 500, 1000));
        assert_eq!(meter.speed_bps, None);
        assert_eq!(meter.eta_secs, None);
    }
}
