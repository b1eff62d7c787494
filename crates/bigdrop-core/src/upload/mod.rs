//! Sender-side upload scheduling.
//!
//! [`Uploader`] drives a file through the whole transfer: fingerprint,
//! verify, chunked upload with bounded concurrency, then merge. Dispatch
//! uses a fixed pool of workers that each claim the lowest-index pending
//! chunk, upload it, and loop. The pool size caps in-flight transfers
//! structurally, so the concurrency bound holds by construction.
//!
//! A failed chunk goes back to pending while it has retry budget left; the
//! worker that reset it picks it (or another pending chunk) up on its next
//! loop, so no chunk is stranded. Pause is cooperative: workers stop
//! claiming new chunks but in-flight transfers run to completion, bounded
//! by the per-chunk timeout. Observers watch an [`UploadStatus`] channel
//! for state, progress, throughput, and the final download URL.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio::sync::{watch, Notify};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::StoreClient;
use crate::error::{Error, Result};
use crate::fingerprint::fingerprint_file;
use crate::{
    DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_TIMEOUT_SECS, DEFAULT_PARALLEL_CHUNKS, MAX_CHUNK_RETRIES,
};

mod session;

pub use session::{
    ChunkRecord, ChunkState, SessionState, ThroughputMeter, UploadSession, UploadStatus,
};

/// Tunables for the upload scheduler.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Bytes per chunk.
    pub chunk_size: u64,
    /// Worker pool size; the cap on concurrent chunk transfers.
    pub parallel_chunks: usize,
    /// Failures allowed per chunk before the session fails.
    pub max_retries: u32,
    /// Per-chunk transfer timeout.
    pub chunk_timeout: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallel_chunks: DEFAULT_PARALLEL_CHUNKS,
            max_retries: MAX_CHUNK_RETRIES,
            chunk_timeout: Duration::from_secs(DEFAULT_CHUNK_TIMEOUT_SECS),
        }
    }
}

/// State shared between the scheduler and its workers.
#[derive(Debug)]
struct Shared {
    session: Mutex<Option<UploadSession>>,
    selected: Mutex<Option<PathBuf>>,
    paused: AtomicBool,
    failed: AtomicBool,
    resuming: AtomicBool,
    /// Workers still running from the current (or a previous) pool.
    active_workers: AtomicUsize,
    /// Signalled when `active_workers` drops to zero.
    pool_idle: Notify,
    last_error: Mutex<Option<String>>,
    status: watch::Sender<UploadStatus>,
    cancel: Mutex<CancellationToken>,
}

impl Shared {
    fn set_state(&self, state: SessionState, message: impl Into<String>) {
        let message = message.into();
        self.status.send_modify(|s| {
            s.state = state;
            s.message = message;
        });
    }

    /// Claim the lowest-index pending chunk for a worker.
    fn claim_chunk(&self) -> Option<ChunkRecord> {
        let mut guard = self.session.lock().ok()?;
        guard.as_mut()?.claim_next_pending()
    }

    fn mark_completed(&self, index: usize) {
        if let Ok(mut guard) = self.session.lock() {
            if let Some(session) = guard.as_mut() {
                if let Some(chunk) = session.chunks.get_mut(index) {
                    chunk.state = ChunkState::Completed;
                    chunk.transferred = chunk.byte_length;
                }
            }
        }
    }

    /// Record a chunk failure. Resets the chunk to pending while budget
    /// remains; otherwise marks it (and the session) failed.
    fn mark_failure(&self, index: usize, error: &Error, max_retries: u32) {
        if let Ok(mut guard) = self.session.lock() {
            if let Some(session) = guard.as_mut() {
                if let Some(chunk) = session.chunks.get_mut(index) {
                    chunk.retry_count += 1;
                    if chunk.retry_count >= max_retries || !error.is_retryable() {
                        warn!(
                            chunk_id = %chunk.chunk_id,
                            attempts = chunk.retry_count,
                            error = %error,
                            "chunk failed permanently"
                        );
                        chunk.state = ChunkState::Error;
                        self.failed.store(true, Ordering::SeqCst);
                        if let Ok(mut last) = self.last_error.lock() {
                            *last = Some(error.to_string());
                        }
                    } else {
                        debug!(
                            chunk_id = %chunk.chunk_id,
                            attempt = chunk.retry_count,
                            error = %error,
                            "chunk failed, will retry"
                        );
                        chunk.state = ChunkState::Pending;
                    }
                }
            }
        }
    }

    /// Return a claimed chunk to pending without spending retry budget.
    fn release_chunk(&self, index: usize) {
        if let Ok(mut guard) = self.session.lock() {
            if let Some(session) = guard.as_mut() {
                if let Some(chunk) = session.chunks.get_mut(index) {
                    if chunk.state == ChunkState::Uploading {
                        chunk.state = ChunkState::Pending;
                    }
                }
            }
        }
    }

    /// Recompute aggregate progress and throughput, publishing both.
    fn publish_progress(&self, meter: &Mutex<ThroughputMeter>) {
        let snapshot = self.session.lock().ok().and_then(|guard| {
            guard
                .as_ref()
                .map(|s| (s.progress(), s.bytes_transferred(), s.total_size))
        });
        let Some((progress, loaded, total)) = snapshot else {
            return;
        };

        let (speed, eta) = match meter.lock() {
            Ok(mut m) => {
                m.sample(loaded, total);
                (m.speed_bps, m.eta_secs)
            }
            Err(_) => (None, None),
        };

        self.status.send_modify(|s| {
            s.progress = progress;
            s.speed_bps = speed;
            s.eta_secs = eta;
        });
    }
}

/// Everything one worker needs to pull and push chunks.
struct WorkerCtx {
    shared: Arc<Shared>,
    client: Arc<dyn StoreClient>,
    path: PathBuf,
    fingerprint: String,
    chunk_timeout: Duration,
    max_retries: u32,
    cancel: CancellationToken,
    meter: Arc<Mutex<ThroughputMeter>>,
}

/// Drives one file at a time through fingerprint, verify, chunked upload,
/// and merge against a [`StoreClient`].
pub struct Uploader {
    client: Arc<dyn StoreClient>,
    config: UploadConfig,
    shared: Arc<Shared>,
}

impl Uploader {
    /// Create an uploader talking to `client`.
    #[must_use]
    pub fn new(client: Arc<dyn StoreClient>, config: UploadConfig) -> Self {
        let (status, _) = watch::channel(UploadStatus::default());
        Self {
            client,
            config,
            shared: Arc::new(Shared {
                session: Mutex::new(None),
                selected: Mutex::new(None),
                paused: AtomicBool::new(false),
                failed: AtomicBool::new(false),
                resuming: AtomicBool::new(false),
                active_workers: AtomicUsize::new(0),
                pool_idle: Notify::new(),
                last_error: Mutex::new(None),
                status,
                cancel: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    /// Watch session state, progress, and throughput.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<UploadStatus> {
        self.shared.status.subscribe()
    }

    /// Select the file to upload, discarding any previous session.
    pub fn select_file(&self, path: impl Into<PathBuf>) {
        self.reset();
        if let Ok(mut selected) = self.shared.selected.lock() {
            *selected = Some(path.into());
        }
        self.shared
            .status
            .send_modify(|s| s.message = "file selected".to_string());
    }

    /// Discard the session: cancel in-flight transfers, clear state, and
    /// return the status to idle.
    pub fn reset(&self) {
        if let Ok(mut cancel) = self.shared.cancel.lock() {
            cancel.cancel();
            *cancel = CancellationToken::new();
        }
        if let Ok(mut session) = self.shared.session.lock() {
            *session = None;
        }
        if let Ok(mut selected) = self.shared.selected.lock() {
            *selected = None;
        }
        if let Ok(mut last) = self.shared.last_error.lock() {
            *last = None;
        }
        self.shared.paused.store(false, Ordering::SeqCst);
        self.shared.failed.store(false, Ordering::SeqCst);
        self.shared.status.send_replace(UploadStatus::default());
    }

    /// Suspend dispatch. In-flight chunk transfers run to completion;
    /// nothing new is claimed until [`Self::resume`].
    pub fn pause(&self) {
        if self.shared.status.borrow().state != SessionState::Uploading {
            return;
        }
        self.shared.paused.store(true, Ordering::SeqCst);
        self.shared.set_state(SessionState::Paused, "paused");
        info!("upload paused");
    }

    /// Resume a paused session from its persisted chunk states. Chunks
    /// already completed are never re-sent.
    ///
    /// Waits for any workers still draining from the paused pool before
    /// spawning a fresh one, so the concurrent-transfer cap holds across
    /// pause and resume.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSession`] if nothing is paused, or the terminal
    /// transfer error if the resumed session fails.
    pub async fn resume(&self) -> Result<()> {
        if self.shared.status.borrow().state != SessionState::Paused {
            return Ok(());
        }
        if self.shared.resuming.swap(true, Ordering::SeqCst) {
            // Another resume call is already in flight.
            return Ok(());
        }
        let result = self.resume_inner().await;
        self.shared.resuming.store(false, Ordering::SeqCst);
        result
    }

    async fn resume_inner(&self) -> Result<()> {
        let path = self.selected_path()?;
        let (fingerprint, baseline) = {
            let guard = self
                .shared
                .session
                .lock()
                .map_err(|_| Error::Internal("session lock poisoned".to_string()))?;
            let session = guard.as_ref().ok_or(Error::NoSession)?;
            (session.fingerprint.clone(), session.bytes_transferred())
        };

        // The previous pool's workers observe the pause flag only between
        // transfers. Wait them out before lifting it, otherwise their
        // in-flight chunks would stack on top of the new pool's.
        self.wait_for_pool_drain().await;

        self.shared.paused.store(false, Ordering::SeqCst);
        self.shared.set_state(SessionState::Uploading, "resuming upload");
        info!(%fingerprint, "upload resumed");

        let meter = Arc::new(Mutex::new(ThroughputMeter::new(baseline)));
        let cancel = self.run_workers(&path, &fingerprint, &meter).await;
        self.finish(&cancel).await
    }

    /// Run the full transfer for the selected file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSession`] if no file is selected, a fingerprint
    /// or verify error, or the terminal transfer error. The status channel
    /// reflects the same failure.
    pub async fn upload(&self) -> Result<()> {
        let path = self.selected_path()?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidFilename(path.display().to_string()))?;

        self.shared.failed.store(false, Ordering::SeqCst);
        self.shared.paused.store(false, Ordering::SeqCst);
        self.shared.set_state(SessionState::Hashing, "computing fingerprint");

        let total_size = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) => return Err(self.fail(Error::ReadFailure(e))),
        };

        let shared = Arc::clone(&self.shared);
        let fingerprint = match fingerprint_file(&path, move |pct| {
            shared.status.send_modify(|s| s.hash_progress = pct);
        })
        .await
        {
            Ok(fp) => fp,
            Err(e) => return Err(self.fail(e)),
        };
        info!(%fingerprint, size = total_size, "file fingerprinted");

        let verify = match self.client.verify(&filename, &fingerprint).await {
            Ok(v) => v,
            Err(e) => return Err(self.fail(e)),
        };

        if !verify.should_upload {
            info!(%fingerprint, "already stored, skipping upload");
            self.shared
                .status
                .send_modify(|s| s.progress = 100);
            return self.merge_once(&fingerprint, &filename, "instant transfer complete").await;
        }

        let already_stored = verify.uploaded_chunks.unwrap_or_default();
        let session = UploadSession::new(
            fingerprint.clone(),
            filename,
            total_size,
            self.config.chunk_size,
            &already_stored,
        );
        let baseline = session.bytes_transferred();
        debug!(
            chunks = session.chunks.len(),
            resumed = already_stored.len(),
            "session created"
        );
        {
            let mut guard = self
                .shared
                .session
                .lock()
                .map_err(|_| Error::Internal("session lock poisoned".to_string()))?;
            *guard = Some(session);
        }

        self.shared.set_state(SessionState::Uploading, "uploading chunks");
        let meter = Arc::new(Mutex::new(ThroughputMeter::new(baseline)));
        let cancel = self.run_workers(&path, &fingerprint, &meter).await;
        self.finish(&cancel).await
    }

    fn selected_path(&self) -> Result<PathBuf> {
        self.shared
            .selected
            .lock()
            .map_err(|_| Error::Internal("selected lock poisoned".to_string()))?
            .clone()
            .ok_or(Error::NoSession)
    }

    /// Mark the session failed and pass the error through.
    fn fail(&self, error: Error) -> Error {
        self.shared.set_state(SessionState::Error, error.to_string());
        error
    }

    async fn wait_for_pool_drain(&self) {
        let idle = self.shared.pool_idle.notified();
        tokio::pin!(idle);
        loop {
            // Register before checking, so a notification landing between
            // the load and the await is not lost.
            idle.as_mut().enable();
            if self.shared.active_workers.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.as_mut().await;
            idle.set(self.shared.pool_idle.notified());
        }
    }

    /// Spawn the worker pool, drain it, and hand back the cancellation
    /// token that governed it.
    async fn run_workers(
        &self,
        path: &Path,
        fingerprint: &str,
        meter: &Arc<Mutex<ThroughputMeter>>,
    ) -> CancellationToken {
        let cancel = self
            .shared
            .cancel
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default();

        self.shared
            .active_workers
            .fetch_add(self.config.parallel_chunks, Ordering::SeqCst);

        let mut workers = JoinSet::new();
        for id in 0..self.config.parallel_chunks {
            let ctx = WorkerCtx {
                shared: Arc::clone(&self.shared),
                client: Arc::clone(&self.client),
                path: path.to_path_buf(),
                fingerprint: fingerprint.to_string(),
                chunk_timeout: self.config.chunk_timeout,
                max_retries: self.config.max_retries,
                cancel: cancel.clone(),
                meter: Arc::clone(meter),
            };
            workers.spawn(worker_loop(id, ctx));
        }
        while workers.join_next().await.is_some() {
            if self.shared.active_workers.fetch_sub(1, Ordering::SeqCst) == 1 {
                self.shared.pool_idle.notify_waiters();
            }
        }
        cancel
    }

    /// Inspect the session once all workers have returned and take the
    /// terminal step: merge, stay paused, or fail.
    ///
    /// `cancel` is the token the finished pool ran under. A reset swaps in
    /// a fresh token, so the shared one cannot tell whether this pool was
    /// cancelled.
    async fn finish(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let (fingerprint, filename, failed_chunk, all_completed) = {
            let guard = self
                .shared
                .session
                .lock()
                .map_err(|_| Error::Internal("session lock poisoned".to_string()))?;
            let session = guard.as_ref().ok_or(Error::NoSession)?;
            let failed = session
                .chunks
                .iter()
                .find(|c| c.state == ChunkState::Error)
                .map(|c| (c.chunk_id.clone(), c.retry_count));
            (
                session.fingerprint.clone(),
                session.filename.clone(),
                failed,
                session.all_completed(),
            )
        };

        if let Some((chunk_id, attempts)) = failed_chunk {
            let reason = self
                .shared
                .last_error
                .lock()
                .ok()
                .and_then(|g| g.clone())
                .unwrap_or_else(|| "unknown failure".to_string());
            return Err(self.fail(Error::ChunkTransferFailed {
                chunk_id,
                attempts,
                reason,
            }));
        }

        if !all_completed {
            // Paused with work remaining; resume() picks it back up.
            return Ok(());
        }

        self.merge_once(&fingerprint, &filename, "upload complete")
            .await
    }

    /// Request the merge exactly once per convergence, guarding against a
    /// re-entrant call while already merging or completed.
    async fn merge_once(&self, fingerprint: &str, filename: &str, done_message: &str) -> Result<()> {
        {
            let state = self.shared.status.borrow().state;
            if state == SessionState::Merging || state == SessionState::Completed {
                return Ok(());
            }
        }

        self.shared.set_state(SessionState::Merging, "merging chunks");
        match self
            .client
            .merge(fingerprint, filename, self.config.chunk_size)
            .await
        {
            Ok(data) => {
                info!(fingerprint, url = %data.url, "transfer complete");
                let message = done_message.to_string();
                self.shared.status.send_modify(|s| {
                    s.state = SessionState::Completed;
                    s.progress = 100;
                    s.message = message;
                    s.download_url = Some(data.url);
                });
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }
}

/// One worker: claim, read, send, repeat until drained, paused, failed, or
/// cancelled.
async fn worker_loop(id: usize, ctx: WorkerCtx) {
    loop {
        if ctx.cancel.is_cancelled()
            || ctx.shared.paused.load(Ordering::SeqCst)
            || ctx.shared.failed.load(Ordering::SeqCst)
        {
            break;
        }

        let Some(chunk) = ctx.shared.claim_chunk() else {
            break;
        };

        let bytes = match read_chunk(&ctx.path, chunk.offset, chunk.byte_length).await {
            Ok(b) => b,
            Err(e) => {
                ctx.shared.mark_failure(chunk.index, &e, ctx.max_retries);
                continue;
            }
        };

        let outcome = tokio::select! {
            () = ctx.cancel.cancelled() => {
                ctx.shared.release_chunk(chunk.index);
                break;
            }
            result = tokio::time::timeout(
                ctx.chunk_timeout,
                ctx.client.put_chunk(&ctx.fingerprint, &chunk.chunk_id, bytes),
            ) => result,
        };

        match outcome {
            Ok(Ok(())) => {
                debug!(worker = id, chunk_id = %chunk.chunk_id, "chunk uploaded");
                ctx.shared.mark_completed(chunk.index);
                ctx.shared.publish_progress(&ctx.meter);
            }
            Ok(Err(e)) => {
                ctx.shared.mark_failure(chunk.index, &e, ctx.max_retries);
            }
            Err(_) => {
                let e = Error::ChunkTimeout {
                    chunk_id: chunk.chunk_id.clone(),
                    secs: ctx.chunk_timeout.as_secs(),
                };
                ctx.shared.mark_failure(chunk.index, &e, ctx.max_retries);
            }
        }
    }
}

/// Read one chunk's byte range from the source file.
async fn read_chunk(path: &Path, offset: u64, len: u64) -> Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await.map_err(Error::ReadFailure)?;
    file.seek(SeekFrom::Start(offset))
        .await
        .map_err(Error::ReadFailure)?;

    let len = usize::try_from(len)
        .map_err(|_| Error::Internal("chunk length exceeds addressable memory".to_string()))?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf).await.map_err(Error::ReadFailure)?;
    Ok(buf)
}
