//! The polling loop: fetch, detect, deliver, advance the watermark, sleep.
//!
//! Delivery is at-least-once: the watermark moves only after the transport
//! accepted a message, one record at a time, so a crash or a failed send
//! never skips a record.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    config::Config,
    domain::RecipientId,
    errors::{CycleError, Error},
    feed::FeedSource,
    formatting::{render, truncate_message},
    messaging::port::MessagingPort,
    novelty,
    watermark::WatermarkStore,
};

const GREETING: &str = "Hello! This is a test message from cvewatch.";

#[derive(Clone, Debug)]
pub struct PollerSettings {
    pub recipient: RecipientId,
    /// Sleep after a completed cycle.
    pub check_interval: Duration,
    /// Sleep after a failed cycle.
    pub retry_interval: Duration,
    pub startup_greeting: bool,
}

impl PollerSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            recipient: cfg.recipient(),
            check_interval: cfg.check_interval,
            retry_interval: cfg.retry_interval,
            startup_greeting: cfg.startup_greeting,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollerState {
    AwaitingSessionReady,
    Cycling,
    /// The transport rejected our credentials; nothing is fetched or sent.
    Degraded,
}

/// What one successful cycle delivered, in delivery order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub delivered: Vec<String>,
}

pub struct Poller {
    settings: PollerSettings,
    feed: Arc<dyn FeedSource>,
    messenger: Arc<dyn MessagingPort>,
    store: WatermarkStore,
    watermark: Option<String>,
    state: PollerState,
}

impl Poller {
    /// Build the poller, seeding the in-memory watermark from `store`.
    pub fn new(
        settings: PollerSettings,
        feed: Arc<dyn FeedSource>,
        messenger: Arc<dyn MessagingPort>,
        store: WatermarkStore,
    ) -> Self {
        let watermark = match store.load() {
            Ok(v) => v,
            Err(e) => {
                error!(
                    path = %store.path().display(),
                    "failed to read watermark, starting without one: {e}"
                );
                None
            }
        };
        if let Some(id) = &watermark {
            info!(%id, "resuming after last delivered CVE");
        }

        Self {
            settings,
            feed,
            messenger,
            store,
            watermark,
            state: PollerState::AwaitingSessionReady,
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn watermark(&self) -> Option<&str> {
        self.watermark.as_deref()
    }

    /// Drive the loop until `cancel` fires.
    pub async fn run(&mut self, cancel: CancellationToken) {
        if !self.await_session(&cancel).await {
            return;
        }

        if self.state == PollerState::Degraded {
            cancel.cancelled().await;
            return;
        }

        if self.settings.startup_greeting {
            match self
                .messenger
                .send_text(&self.settings.recipient, GREETING)
                .await
            {
                Ok(()) => info!("startup greeting sent"),
                Err(e) => error!(recipient = %self.settings.recipient, "could not send greeting: {e}"),
            }
        }

        loop {
            let delay = match self.run_cycle().await {
                Ok(report) => {
                    if !report.delivered.is_empty() {
                        info!(count = report.delivered.len(), "cycle delivered new CVEs");
                    }
                    self.settings.check_interval
                }
                Err(e) => {
                    error!("cycle failed, retrying in {:?}: {e}", self.settings.retry_interval);
                    self.settings.retry_interval
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }
        info!("poller stopped");
    }

    /// Wait for the transport. Returns `false` if shutdown came first.
    async fn await_session(&mut self, cancel: &CancellationToken) -> bool {
        self.state = PollerState::AwaitingSessionReady;
        loop {
            let ready = tokio::select! {
                _ = cancel.cancelled() => return false,
                r = self.messenger.wait_until_ready() => r,
            };

            match ready {
                Ok(()) => {
                    info!("messaging session ready");
                    self.state = PollerState::Cycling;
                    return true;
                }
                Err(Error::Unauthorized(msg)) => {
                    error!("transport rejected credentials, polling disabled: {msg}");
                    self.state = PollerState::Degraded;
                    return true;
                }
                Err(e) => {
                    warn!("messaging session not ready: {e}");
                    tokio::select! {
                        _ = cancel.cancelled() => return false,
                        _ = sleep(self.settings.retry_interval) => {}
                    }
                }
            }
        }
    }

    /// One fetch → detect → deliver pass.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        let detection =
            novelty::detect(self.feed.as_ref(), self.watermark.as_deref(), Utc::now).await?;

        let max_len = self.messenger.capabilities().max_message_len;
        let mut report = CycleReport::default();

        for record in detection.items {
            let text = truncate_message(&render(&record, detection.kind), max_len);

            if let Err(source) = self
                .messenger
                .send_text(&self.settings.recipient, &text)
                .await
            {
                // Stop here; the rest is picked up again next cycle.
                return Err(CycleError::Delivery {
                    id: record.id,
                    source,
                });
            }
            info!(id = %record.id, kind = ?detection.kind, "delivered");

            self.watermark = Some(record.id.clone());
            if let Err(source) = self.store.save(&record.id) {
                let e = CycleError::Storage { source };
                error!(
                    id = %record.id,
                    "{e}; this CVE may be delivered again after a restart"
                );
            }
            report.delivered.push(record.id);
        }

        Ok(report)
    }
}
