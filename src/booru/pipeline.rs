//! Pipeline Coordinator
//!
//! Drives the page cursor, dispatches one download task per usable record
//! and joins every task of a page before asking for the next one. The run
//! counters live here and are only touched between those join points.

use std::path::PathBuf;
use std::time::Duration;

use futures::future::join_all;
use indicatif::ProgressBar;
use reqwest::Client;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::booru::config_loader::AppConfig;
use crate::booru::download_worker::{ConcurrencyGate, DownloadOutcome, DownloadWorker};
use crate::booru::item_resolver::{resolve, ItemRecord};
use crate::booru::page_fetcher::{FetchError, PageFetcher, PageOutcome};

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Target count must be at least 1")]
    ZeroTarget,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// What the operator asked for. Fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    tags: String,
    target: usize,
}

impl FetchRequest {
    pub fn new(tags: &str, target: usize) -> Result<Self, RequestError> {
        if target == 0 {
            return Err(RequestError::ZeroTarget);
        }
        Ok(Self {
            tags: tags.trim().to_string(),
            target,
        })
    }

    pub fn tags(&self) -> &str {
        &self.tags
    }

    pub fn target(&self) -> usize {
        self.target
    }
}

/// `required`: tasks dispatched. `downloaded`: outcomes collected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub required: usize,
    pub downloaded: usize,
}

/// Why the run ended.
#[derive(Debug)]
pub enum StopReason {
    TargetReached,
    EndOfData,
    PageLimit,
    Halted(FetchError),
}

impl StopReason {
    pub fn is_error(&self) -> bool {
        matches!(self, StopReason::Halted(_))
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub counters: RunCounters,
    pub succeeded: usize,
    pub failed: usize,
    pub pages_fetched: usize,
    pub peak_in_flight: usize,
    pub stop: StopReason,
}

pub struct Pipeline {
    request: FetchRequest,
    fetcher: PageFetcher,
    worker: DownloadWorker,
    run_folder: PathBuf,
    max_pages: usize,
}

impl Pipeline {
    pub fn new(
        request: FetchRequest,
        fetcher: PageFetcher,
        worker: DownloadWorker,
        run_folder: PathBuf,
        max_pages: usize,
    ) -> Self {
        Self {
            request,
            fetcher,
            worker,
            run_folder,
            max_pages,
        }
    }

    /// Build the fetcher, the gate and the worker from the app config. One
    /// HTTP client is shared by all of them.
    pub fn from_config(
        config: &AppConfig,
        request: FetchRequest,
        run_folder: PathBuf,
        progress: ProgressBar,
    ) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .user_agent(&config.api.user_agent)
            .timeout(Duration::from_secs(config.api.request_timeout_secs))
            .gzip(true)
            .build()?;

        let fetcher = PageFetcher::new(
            client.clone(),
            &config.api.base_url,
            request.tags(),
            config.api.page_size,
        );

        let worker = DownloadWorker::new(
            client,
            ConcurrencyGate::new(config.download.max_concurrent_downloads),
            Duration::from_secs(config.download.timeout_secs),
            request.target(),
            progress,
        );

        Ok(Self::new(request, fetcher, worker, run_folder, config.api.max_pages))
    }

    /// Run until the target is reached, the index runs dry, the page limit
    /// is hit or a page fetch fails.
    #[instrument(skip(self), fields(tags = %self.request.tags(), target = self.request.target()))]
    pub async fn run(self) -> RunSummary {
        let target = self.request.target();
        let mut counters = RunCounters::default();
        let mut cursor = 0;
        let mut succeeded = 0;
        let mut pages_fetched = 0;

        let stop = loop {
            if counters.required == target {
                break StopReason::TargetReached;
            }
            if cursor >= self.max_pages {
                warn!(cursor, "Reached the page limit");
                break StopReason::PageLimit;
            }

            let records = match self.fetcher.fetch_page(cursor).await {
                PageOutcome::Records(records) => records,
                PageOutcome::EndOfData => break StopReason::EndOfData,
                PageOutcome::Halted(e) => break StopReason::Halted(e),
            };
            pages_fetched += 1;

            let handles = self.dispatch(&records, &mut counters);
            debug!(cursor, dispatched = handles.len(), "Waiting for page downloads");

            for joined in join_all(handles).await {
                counters.downloaded += 1;
                match joined {
                    Ok(DownloadOutcome { success: true, .. }) => succeeded += 1,
                    Ok(_) => {}
                    Err(e) => error!("Download task did not finish: {}", e),
                }
            }

            cursor += 1;
        };

        let summary = RunSummary {
            counters,
            succeeded,
            failed: counters.downloaded - succeeded,
            pages_fetched,
            peak_in_flight: self.worker.gate().peak(),
            stop,
        };

        match &summary.stop {
            StopReason::Halted(e) => error!("Run halted: {}", e),
            reason => debug!(?reason, "Run finished"),
        }

        summary
    }

    /// Spawn one download per usable record, in page order, stopping as
    /// soon as the target is reached.
    fn dispatch(&self, records: &[ItemRecord], counters: &mut RunCounters) -> Vec<JoinHandle<DownloadOutcome>> {
        let mut handles = Vec::with_capacity(records.len());

        for record in records {
            if counters.required == self.request.target() {
                break;
            }

            let Some(item) = resolve(record, &self.run_folder) else {
                continue;
            };

            counters.required += 1;
            let worker = self.worker.clone();
            handles.push(tokio::spawn(async move { worker.download(item).await }));
        }

        handles
    }
}
