//! Download Worker
//!
//! Fetches one resolved item and streams it to its destination path. Every
//! network request holds a slot of the shared [`ConcurrencyGate`] for its
//! whole lifetime, so at most `capacity` downloads are in flight at once.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::StreamExt;
use indicatif::ProgressBar;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, instrument, warn};

use crate::booru::item_resolver::ResolvedItem;

/// Item-level failures. These never leave the worker; they become a failed
/// [`DownloadOutcome`].
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Server returned status {0}")]
    Status(u16),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result of one download task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub identifier: String,
    pub success: bool,
}

/// Counting gate bounding simultaneous downloads.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

/// A held gate slot. Released exactly once, on drop.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a free slot. `None` once the semaphore is closed.
    pub async fn acquire(&self) -> Option<GatePermit> {
        let permit = self.semaphore.clone().acquire_owned().await.ok()?;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        Some(GatePermit {
            _permit: permit,
            in_flight: self.in_flight.clone(),
        })
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of slots ever held at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Downloads resolved items. Cheap to clone; clones share the client, the
/// gate and the completion counter.
#[derive(Clone)]
pub struct DownloadWorker {
    client: Client,
    gate: ConcurrencyGate,
    timeout: Duration,
    target: usize,
    completed: Arc<AtomicUsize>,
    progress: ProgressBar,
}

impl DownloadWorker {
    pub fn new(
        client: Client,
        gate: ConcurrencyGate,
        timeout: Duration,
        target: usize,
        progress: ProgressBar,
    ) -> Self {
        Self {
            client,
            gate,
            timeout,
            target,
            completed: Arc::new(AtomicUsize::new(0)),
            progress,
        }
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Download one item and report whether its file was written.
    ///
    /// A failed download may leave an empty or partial file behind; nothing
    /// is cleaned up.
    pub async fn download(&self, item: ResolvedItem) -> DownloadOutcome {
        let result = match self.gate.acquire().await {
            Some(permit) => self.try_download(&item, permit).await.map_err(|e| e.to_string()),
            None => Err("concurrency gate closed".to_string()),
        };
        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;

        // Item lines are written with the bar hidden so it redraws cleanly
        let outcome = match result {
            Ok(bytes) => {
                self.progress.suspend(|| {
                    info!(
                        identifier = %item.identifier,
                        bytes,
                        "[{}/{}] {} downloaded successfully.",
                        done, self.target, item.identifier
                    )
                });
                DownloadOutcome {
                    identifier: item.identifier,
                    success: true,
                }
            }
            Err(e) => {
                self.progress.suspend(|| {
                    warn!(
                        identifier = %item.identifier,
                        error = %e,
                        "[{}/{}] {} download failed.",
                        done, self.target, item.identifier
                    )
                });
                DownloadOutcome {
                    identifier: item.identifier,
                    success: false,
                }
            }
        };
        self.progress.inc(1);

        outcome
    }

    /// The permit is held until the body is on disk.
    #[instrument(skip(self, item, _permit), fields(url = %item.source_url))]
    async fn try_download(&self, item: &ResolvedItem, _permit: GatePermit) -> Result<u64, DownloadError> {
        debug!(in_flight = self.gate.in_flight(), "Gate slot acquired");

        let response = self
            .client
            .get(&item.source_url)
            .timeout(self.timeout)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(DownloadError::Status(response.status().as_u16()));
        }

        let mut file = File::create(&item.destination_path).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        debug!(path = %item.destination_path.display(), written, "File written");

        Ok(written)
    }
}
