//! Sampling content fingerprint.
//!
//! Hashing an entire multi-gigabyte file before uploading it would dominate
//! the transfer time, so the fingerprint trades a tiny collision risk for
//! speed: it hashes the first [`SAMPLE_WINDOW`] bytes, a small
//! [`SAMPLE_PROBE`] at every `SAMPLE_WINDOW` stride through the middle, and
//! the last `SAMPLE_WINDOW` bytes, in that fixed order. Identical byte
//! content yields an identical fingerprint regardless of filename, which is
//! what makes deduplication and resumption work.
//!
//! The sampled regions are streamed through an xxHash3-128 hasher, so memory
//! use stays bounded no matter how large the file is.

use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use xxhash_rust::xxh3::Xxh3;

use crate::error::{Error, Result};
use crate::{SAMPLE_PROBE, SAMPLE_WINDOW};

/// A byte range scheduled for sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sample {
    offset: u64,
    len: u64,
}

/// Build the ordered sample plan for a file of `size` bytes.
///
/// Overlap between the head and tail windows on small files is harmless:
/// the plan is deterministic for a given size, which is all the fingerprint
/// requires.
fn sample_plan(size: u64) -> Vec<Sample> {
    let mut plan = Vec::new();

    // Head window.
    plan.push(Sample {
        offset: 0,
        len: SAMPLE_WINDOW.min(size),
    });

    // Probes every SAMPLE_WINDOW stride, stopping once the next stride
    // would land within SAMPLE_WINDOW of the end.
    let mut cur = SAMPLE_WINDOW;
    while cur < size {
        if cur + SAMPLE_WINDOW >= size {
            break;
        }
        plan.push(Sample {
            offset: cur,
            len: SAMPLE_PROBE.min(size - cur),
        });
        cur += SAMPLE_WINDOW;
    }

    // Tail window.
    plan.push(Sample {
        offset: size.saturating_sub(SAMPLE_WINDOW),
        len: SAMPLE_WINDOW.min(size),
    });

    plan
}

/// Compute the sampling fingerprint of the file at `path`.
///
/// `on_progress` receives a 0-100 percentage as sampled bytes are hashed.
///
/// # Errors
///
/// Returns [`Error::ReadFailure`] if the file cannot be opened or read.
pub async fn fingerprint_file<F>(path: &Path, mut on_progress: F) -> Result<String>
where
    F: FnMut(u8),
{
    let mut file = File::open(path).await.map_err(Error::ReadFailure)?;
    let size = file
        .metadata()
        .await
        .map_err(Error::ReadFailure)?
        .len();

    let plan = sample_plan(size);
    let total: u64 = plan.iter().map(|s| s.len).sum();

    let mut hasher = Xxh3::new();
    let mut hashed = 0u64;
    let mut buf = vec![0u8; 256 * 1024];

    for sample in plan {
        file.seek(SeekFrom::Start(sample.offset))
            .await
            .map_err(Error::ReadFailure)?;

        let mut remaining = sample.len;
        while remaining > 0 {
            let want = buf.len().min(usize::try_from(remaining).unwrap_or(buf.len()));
            let n = file
                .read(&mut buf[..want])
                .await
                .map_err(Error::ReadFailure)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            remaining -= n as u64;
            hashed += n as u64;
            if total > 0 {
                #[allow(clippy::cast_possible_truncation)]
                on_progress((hashed * 100 / total) as u8);
            }
        }
    }

    if total == 0 {
        on_progress(100);
    }

    Ok(format!("{:032x}", hasher.digest128()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::FINGERPRINT_HEX_LEN;

    async fn fingerprint(path: &Path) -> String {
        fingerprint_file(path, |_| {}).await.expect("fingerprint")
    }

    #[test]
    fn plan_for_small_file_is_head_and_tail() {
        let plan = sample_plan(1024);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0], Sample { offset: 0, len: 1024 });
        assert_eq!(plan[1], Sample { offset: 0, len: 1024 });
    }

    #[test]
    fn plan_strides_through_large_file() {
        let size = 10 * SAMPLE_WINDOW;
        let plan = sample_plan(size);

        assert_eq!(plan.first().unwrap().len, SAMPLE_WINDOW);
        assert_eq!(
            *plan.last().unwrap(),
            Sample {
                offset: size - SAMPLE_WINDOW,
                len: SAMPLE_WINDOW
            }
        );

        // Probes at strides 1..=8 (stride 9 lands within a window of the end).
        let probes = &plan[1..plan.len() - 1];
        assert_eq!(probes.len(), 8);
        for (i, probe) in probes.iter().enumerate() {
            assert_eq!(probe.offset, (i as u64 + 1) * SAMPLE_WINDOW);
            assert_eq!(probe.len, SAMPLE_PROBE);
        }
    }

    #[tokio::test]
    async fn fingerprint_is_fixed_length_hex() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("a.bin");
        std::fs::write(&path, b"hello bigdrop").expect("write");

        let fp = fingerprint(&path).await;
        assert_eq!(fp.len(), FINGERPRINT_HEX_LEN);
        assert!(fp.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn identical_content_different_names_match() {
        let temp = TempDir::new().expect("temp dir");
        let content: Vec<u8> = (0..100_000u32).flat_map(u32::to_le_bytes).collect();

        let a = temp.path().join("first.bin");
        let b = temp.path().join("second.dat");
        std::fs::write(&a, &content).expect("write a");
        std::fs::write(&b, &content).expect("write b");

        assert_eq!(fingerprint(&a).await, fingerprint(&b).await);
    }

    #[tokio::test]
    async fn different_content_diverges() {
        let temp = TempDir::new().expect("temp dir");
        let a = temp.path().join("a.bin");
        let b = temp.path().join("b.bin");
        std::fs::write(&a, b"content one").expect("write a");
        std::fs::write(&b, b"content two").expect("write b");

        assert_ne!(fingerprint(&a).await, fingerprint(&b).await);
    }

    #[tokio::test]
    async fn empty_file_still_fingerprints() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("empty");
        std::fs::write(&path, b"").expect("write");

        let mut last = 0;
        let fp = fingerprint_file(&path, |p| last = p).await.expect("fingerprint");
        assert_eq!(fp.len(), FINGERPRINT_HEX_LEN);
        assert_eq!(last, 100);
    }

    #[tokio::test]
    async fn progress_reaches_completion() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("data.bin");
        std::fs::write(&path, vec![7u8; 300_000]).expect("write");

        let mut last = 0;
        fingerprint_file(&path, |p| last = p).await.expect("fingerprint");
        assert_eq!(last, 100);
    }
}
