use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{
    errors::Error,
    feed::{
        schema::{decode_batch, FeedRecord},
        window::QueryWindow,
    },
    Result,
};

pub const DEFAULT_BASE_URL: &str = "https://services.nvd.nist.gov/rest/json/cves/2.0";

#[derive(Clone, Debug)]
pub struct FeedSettings {
    pub base_url: String,
    pub api_key: String,
    pub user_agent: String,
    pub results_per_page: u32,
    /// Total number of HTTP attempts for retryable failures.
    pub retries: u32,
    /// Delay before the second attempt; doubled for each further one.
    pub backoff_base: Duration,
    pub request_timeout: Duration,
}

impl FeedSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            user_agent: concat!("cvewatch/", env!("CARGO_PKG_VERSION")).to_string(),
            results_per_page: 500,
            retries: 3,
            backoff_base: Duration::from_secs(1),
            request_timeout: Duration::from_secs(45),
        }
    }
}

/// Result of one `fetch` call, after retries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    Success(Vec<FeedRecord>),
    /// The feed answered 403 on every attempt.
    RateLimited { attempts: u32 },
    /// Every attempt timed out (or a mix of timeouts and 403s ending in a timeout).
    Transient { attempts: u32 },
    /// Not worth retrying: unexpected status, transport error, bad body.
    Fatal { reason: String },
}

/// Port for anything that can answer a windowed feed query.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, window: QueryWindow) -> FetchOutcome;
}

#[derive(Clone, Copy, Debug)]
enum RetryCause {
    RateLimited,
    Timeout,
}

enum Attempt {
    Done(FetchOutcome),
    Retry(RetryCause),
}

/// NVD CVE API 2.0 client.
#[derive(Clone, Debug)]
pub struct NvdClient {
    settings: FeedSettings,
    http: reqwest::Client,
}

impl NvdClient {
    pub fn new(settings: FeedSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| Error::External(format!("http client build failed: {e}")))?;
        Ok(Self { settings, http })
    }

    pub fn settings(&self) -> &FeedSettings {
        &self.settings
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.settings
            .backoff_base
            .saturating_mul(1u32 << attempt.min(16))
    }

    async fn attempt(&self, window: &QueryWindow, attempt: u32, retries: u32) -> Attempt {
        let res = self
            .http
            .get(&self.settings.base_url)
            .query(&[
                ("pubStartDate", window.start_param()),
                ("pubEndDate", window.end_param()),
                ("resultsPerPage", self.settings.results_per_page.to_string()),
            ])
            .header("apikey", &self.settings.api_key)
            .send()
            .await;

        let resp = match res {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                warn!(attempt = attempt + 1, retries, "feed request timed out");
                return Attempt::Retry(RetryCause::Timeout);
            }
            Err(e) => {
                error!(endpoint = %self.settings.base_url, "feed request failed: {e}");
                return Attempt::Done(FetchOutcome::Fatal {
                    reason: format!("request error: {e}"),
                });
            }
        };

        let status = resp.status();
        info!(status = status.as_u16(), url = %resp.url(), "feed response");

        match status {
            StatusCode::OK => match resp.bytes().await {
                Ok(body) => match decode_batch(&body) {
                    Ok(batch) => Attempt::Done(FetchOutcome::Success(batch)),
                    Err(e) => {
                        error!(endpoint = %self.settings.base_url, "feed body rejected: {e}");
                        Attempt::Done(FetchOutcome::Fatal {
                            reason: format!("invalid response body: {e}"),
                        })
                    }
                },
                Err(e) if e.is_timeout() => {
                    warn!(attempt = attempt + 1, retries, "feed body read timed out");
                    Attempt::Retry(RetryCause::Timeout)
                }
                Err(e) => Attempt::Done(FetchOutcome::Fatal {
                    reason: format!("body read error: {e}"),
                }),
            },
            StatusCode::FORBIDDEN => {
                warn!(attempt = attempt + 1, retries, "feed answered 403 Forbidden");
                Attempt::Retry(RetryCause::RateLimited)
            }
            other => {
                error!(
                    endpoint = %self.settings.base_url,
                    status = other.as_u16(),
                    "unexpected feed status"
                );
                Attempt::Done(FetchOutcome::Fatal {
                    reason: format!("HTTP {other}"),
                })
            }
        }
    }
}

#[async_trait]
impl FeedSource for NvdClient {
    async fn fetch(&self, window: QueryWindow) -> FetchOutcome {
        let retries = self.settings.retries.max(1);
        let mut cause = RetryCause::RateLimited;

        for attempt in 0..retries {
            match self.attempt(&window, attempt, retries).await {
                Attempt::Done(outcome) => return outcome,
                Attempt::Retry(c) => {
                    cause = c;
                    if attempt + 1 < retries {
                        let delay = self.backoff(attempt);
                        info!("retrying feed request in {delay:?}");
                        sleep(delay).await;
                    }
                }
            }
        }

        error!(%window, attempts = retries, ?cause, "max feed retries reached, giving up");
        match cause {
            RetryCause::RateLimited => FetchOutcome::RateLimited { attempts: retries },
            RetryCause::Timeout => FetchOutcome::Transient { attempts: retries },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let client = NvdClient::new(FeedSettings::new("k")).unwrap();
        assert_eq!(client.backoff(0), Duration::from_secs(1));
        assert_eq!(client.backoff(1), Duration::from_secs(2));
        assert_eq!(client.backoff(2), Duration::from_secs(4));
    }

    #[test]
    fn defaults_match_nvd_usage() {
        let s = FeedSettings::new("k");
        assert_eq!(s.base_url, DEFAULT_BASE_URL);
        assert_eq!(s.results_per_page, 500);
        assert_eq!(s.retries, 3);
        assert_eq!(s.request_timeout, Duration::from_secs(45));
        assert!(s.user_agent.starts_with("cvewatch/"));
    }
}
