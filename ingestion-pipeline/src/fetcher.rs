use std::time::Duration;

use common::{error::AppError, utils::config::AppConfig};
use reqwest::{header::RETRY_AFTER, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tokio::time::sleep;
use tokio_retry::strategy::jitter;
use tracing::{debug, error, warn};

use crate::types::{Page, SpaceInfo};

/// Backoff waits never exceed this, whatever the attempt count says.
const MAX_BACKOFF: Duration = Duration::from_secs(60);
/// Uniform random jitter added to every wait to avoid thundering-herd
/// resynchronization against the rate limiter.
const JITTER_BOUND: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} failed with status {status}")]
    Status { status: u16, url: String },
    #[error("rate limited after {attempts} attempts: {url}")]
    RateLimitExhausted { attempts: u32, url: String },
    #[error("network failure after {attempts} attempts: {source}")]
    NetworkExhausted {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected response from {url}: {reason}")]
    Shape { url: String, reason: String },
}

impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        AppError::Processing(err.to_string())
    }
}

/// HTTP client for the paginated wiki REST API. A single GET survives rate
/// limiting (HTTP 429, `Retry-After`-aware) and transient network failures
/// with capped exponential backoff; anything else fails fast and the caller
/// decides whether to skip the item or abort the surrounding loop.
pub struct ContentApiClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    page_limit: usize,
    max_retries: u32,
    base_backoff: Duration,
}

impl ContentApiClient {
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        page_limit: usize,
        max_retries: u32,
        base_backoff: Duration,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            page_limit: page_limit.max(1),
            max_retries: max_retries.max(1),
            base_backoff,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(
            &config.api_base_url,
            &config.api_username,
            &config.api_password,
            config.fetch_page_limit,
            config.fetch_max_retries,
            Duration::from_millis(config.fetch_base_backoff_ms),
            Duration::from_secs(config.http_timeout_secs),
        )
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt);
        self.base_backoff
            .saturating_mul(multiplier)
            .min(MAX_BACKOFF)
    }

    /// One GET with retry semantics. 429 responses honor `Retry-After` when
    /// it parses as integer seconds, falling back to exponential backoff;
    /// other 4xx/5xx statuses fail immediately; network errors retry on the
    /// same backoff schedule with their own counter.
    pub async fn fetch_page(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Value, FetchError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut rate_limit_attempts: u32 = 0;
        let mut network_attempts: u32 = 0;

        loop {
            let request = self
                .http
                .get(&url)
                .basic_auth(&self.username, Some(&self.password))
                .query(params);

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        rate_limit_attempts = rate_limit_attempts.saturating_add(1);
                        if rate_limit_attempts >= self.max_retries {
                            return Err(FetchError::RateLimitExhausted {
                                attempts: rate_limit_attempts,
                                url,
                            });
                        }

                        let wait = retry_after_seconds(&response)
                            .unwrap_or_else(|| {
                                self.backoff_delay(rate_limit_attempts.saturating_sub(1))
                            })
                            .saturating_add(jitter(JITTER_BOUND));
                        warn!(
                            %url,
                            attempt = rate_limit_attempts,
                            wait_ms = wait.as_millis() as u64,
                            "rate limited (429); backing off"
                        );
                        sleep(wait).await;
                        continue;
                    }

                    if !status.is_success() {
                        error!(%url, status = status.as_u16(), "request failed; not retrying");
                        return Err(FetchError::Status {
                            status: status.as_u16(),
                            url,
                        });
                    }

                    return response.json::<Value>().await.map_err(|err| {
                        FetchError::Shape {
                            url: url.clone(),
                            reason: err.to_string(),
                        }
                    });
                }
                Err(err) => {
                    network_attempts = network_attempts.saturating_add(1);
                    if network_attempts >= self.max_retries {
                        return Err(FetchError::NetworkExhausted {
                            attempts: network_attempts,
                            source: err,
                        });
                    }

                    let wait = self
                        .backoff_delay(network_attempts.saturating_sub(1))
                        .saturating_add(jitter(JITTER_BOUND));
                    warn!(
                        %url,
                        attempt = network_attempts,
                        error = %err,
                        wait_ms = wait.as_millis() as u64,
                        "network error; backing off"
                    );
                    sleep(wait).await;
                }
            }
        }
    }

    /// Paginates a collection endpoint to exhaustion: `start` advances by
    /// the returned page length until a page shorter than the requested
    /// limit signals the end.
    pub async fn fetch_all(
        &self,
        path: &str,
        base_params: &[(&str, String)],
    ) -> Result<Vec<Value>, FetchError> {
        let mut items = Vec::new();
        let mut start: usize = 0;

        loop {
            let mut params: Vec<(&str, String)> = base_params.to_vec();
            params.push(("start", start.to_string()));
            params.push(("limit", self.page_limit.to_string()));

            let page = self.fetch_page(path, &params).await?;
            let batch = page
                .get("results")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            let batch_len = batch.len();
            items.extend(batch);

            debug!(path, start, batch_len, total = items.len(), "fetched page");

            if batch_len < self.page_limit {
                break;
            }
            start = start.saturating_add(batch_len);
        }

        Ok(items)
    }

    /// Lists all spaces, excluding personal (`~`-prefixed) ones.
    pub async fn fetch_spaces(&self) -> Result<Vec<SpaceInfo>, FetchError> {
        let raw = self.fetch_all("space", &[]).await?;

        let spaces = raw
            .iter()
            .filter_map(|space| {
                let key = space.get("key")?.as_str()?;
                if key.starts_with('~') {
                    return None;
                }
                Some(SpaceInfo {
                    key: key.to_string(),
                    name: space
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or(key)
                        .to_string(),
                })
            })
            .collect();

        Ok(spaces)
    }

    /// Fetches page metadata for a space (no bodies), with version and
    /// ancestor expansions for sampling and path reconstruction.
    pub async fn fetch_page_metadata(&self, space_key: &str) -> Result<Vec<Page>, FetchError> {
        let params = [
            ("type", "page".to_string()),
            ("spaceKey", space_key.to_string()),
            ("expand", "version,ancestors".to_string()),
        ];
        let raw = self.fetch_all("content", &params).await?;

        let pages = raw
            .iter()
            .filter_map(|page| {
                let id = page.get("id")?.as_str()?.to_string();
                let ancestors = page
                    .get("ancestors")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();

                Some(Page {
                    id,
                    title: page
                        .get("title")
                        .and_then(Value::as_str)
                        .unwrap_or("Untitled")
                        .to_string(),
                    body: String::new(),
                    updated: page
                        .pointer("/version/when")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    update_count: page
                        .pointer("/version/number")
                        .and_then(Value::as_u64)
                        .unwrap_or(0),
                    // The last ancestor is the direct parent.
                    parent_id: ancestors
                        .last()
                        .and_then(|a| a.get("id"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    level: ancestors.len(),
                })
            })
            .collect();

        Ok(pages)
    }

    /// Fetches the raw HTML body of a single page. A page without a body
    /// yields an empty string, which the orchestrator treats as a skip.
    pub async fn fetch_page_body(&self, page_id: &str) -> Result<String, FetchError> {
        let params = [("expand", "body.storage".to_string())];
        let page = self
            .fetch_page(&format!("content/{page_id}"), &params)
            .await?;

        Ok(page
            .pointer("/body/storage/value")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }
}

fn retry_after_seconds(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
