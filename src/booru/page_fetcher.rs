use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::booru::item_resolver::ItemRecord;

/// Page-level failures. Every variant halts the run.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Access denied (403). The IP may be blocked or the request needs authorization")]
    AccessDenied,

    #[error("Server returned status {0}")]
    UpstreamStatus(u16),

    #[error("Expected JSON but got content type '{0}'")]
    UnexpectedContentType(String),

    #[error("Unexpected response format: expected a JSON list")]
    UnexpectedFormat,

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to decode page: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result of asking the index for one page.
#[derive(Debug)]
pub enum PageOutcome {
    /// A non-empty page, records in index order.
    Records(Vec<ItemRecord>),
    /// The query is exhausted. Normal termination.
    EndOfData,
    /// The page could not be used. Fatal to the run.
    Halted(FetchError),
}

/// Issues index queries for a fixed tag string. Headers and timeouts come
/// from the client it is given.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
    base_url: String,
    tags: String,
    page_size: usize,
}

impl PageFetcher {
    pub fn new(client: Client, base_url: &str, tags: &str, page_size: usize) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            tags: tags.to_string(),
            page_size,
        }
    }

    /// Fetch the page at `cursor`. Never retries.
    #[instrument(skip(self), fields(tags = %self.tags))]
    pub async fn fetch_page(&self, cursor: usize) -> PageOutcome {
        match self.try_fetch_page(cursor).await {
            Ok(records) if records.is_empty() => {
                info!("No more posts to process.");
                PageOutcome::EndOfData
            }
            Ok(records) => {
                debug!(count = records.len(), "Fetched page");
                PageOutcome::Records(records)
            }
            Err(e) => {
                error!("Page fetch failed: {}", e);
                PageOutcome::Halted(e)
            }
        }
    }

    async fn try_fetch_page(&self, cursor: usize) -> Result<Vec<ItemRecord>, FetchError> {
        let limit = self.page_size.to_string();
        let pid = cursor.to_string();

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("page", "dapi"),
                ("s", "post"),
                ("q", "index"),
                ("json", "1"),
                ("limit", limit.as_str()),
                ("tags", self.tags.as_str()),
                ("pid", pid.as_str()),
            ])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::FORBIDDEN => {
                warn!("Access forbidden (403) on index query");
                return Err(FetchError::AccessDenied);
            }
            status => return Err(FetchError::UpstreamStatus(status.as_u16())),
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let body = response.text().await?;

        // An exhausted query answers with an empty body
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        if !is_json_media_type(&content_type) {
            return Err(FetchError::UnexpectedContentType(content_type));
        }

        parse_page(&body)
    }
}

/// Decode a page body into records. Only a JSON list is accepted.
pub fn parse_page(body: &str) -> Result<Vec<ItemRecord>, FetchError> {
    match serde_json::from_str::<serde_json::Value>(body)? {
        serde_json::Value::Array(values) => Ok(values.into_iter().map(ItemRecord::from_value).collect()),
        _ => Err(FetchError::UnexpectedFormat),
    }
}

fn is_json_media_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}
