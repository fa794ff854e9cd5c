use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::StatusCode;
use tracing::warn;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const POLITE_DELAY_MS: u64 = 500;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;

/// Result of fetching one catalogue page.
pub enum FetchOutcome {
    Page(String),
    NotFound,
}

/// HTTP client for the catalogue with explicit construction and polite,
/// sequential pacing. One instance is built per command run and passed down
/// into the import pipelines.
pub struct Fetcher {
    http: reqwest::Client,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("vivc_scraper/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http })
    }

    /// Fetch one page. 404 maps to [`FetchOutcome::NotFound`]; 429 and 5xx
    /// responses (and connect/timeout errors) are retried a few times with
    /// exponential backoff before failing loud. Every request is followed by
    /// a short delay so batch runs stay polite to the catalogue.
    pub async fn get(&self, url: &str) -> Result<FetchOutcome> {
        let mut attempt = 0u32;
        loop {
            let result = self.http.get(url).send().await;
            tokio::time::sleep(Duration::from_millis(POLITE_DELAY_MS)).await;

            match result {
                Ok(resp) => {
                    let status = resp.status();
                    if status == StatusCode::NOT_FOUND {
                        return Ok(FetchOutcome::NotFound);
                    }
                    if status.is_success() {
                        let body = resp
                            .text()
                            .await
                            .with_context(|| format!("failed to read body of {url}"))?;
                        return Ok(FetchOutcome::Page(body));
                    }
                    let transient =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if !transient || attempt == MAX_RETRIES {
                        bail!("GET {url} returned {status}");
                    }
                    warn!(
                        "GET {} returned {} (attempt {}/{})",
                        url,
                        status,
                        attempt + 1,
                        MAX_RETRIES
                    );
                }
                Err(e) => {
                    let transient = e.is_timeout() || e.is_connect();
                    if !transient || attempt == MAX_RETRIES {
                        return Err(e).with_context(|| format!("GET {url} failed"));
                    }
                    warn!(
                        "GET {} failed: {} (attempt {}/{})",
                        url,
                        e,
                        attempt + 1,
                        MAX_RETRIES
                    );
                }
            }

            let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

}
