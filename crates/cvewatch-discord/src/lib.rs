//! Discord adapter (REST over reqwest).
//!
//! Direct messages go through two calls: open (or reuse) the DM channel with
//! the recipient, then post into it. Channel ids are cached per recipient.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use cvewatch_core::{
    domain::RecipientId,
    errors::Error,
    messaging::{port::MessagingPort, types::MessagingCapabilities},
    Result,
};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

const MAX_MESSAGE_LEN: usize = 2000;

#[derive(Clone, Debug)]
pub struct DiscordSettings {
    pub api_base: String,
    pub token: String,
    /// Pause between readiness probes while the API is unreachable.
    pub ready_retry: Duration,
    pub request_timeout: Duration,
    /// Upper bound on a 429 `retry_after` wait.
    pub max_retry_after: Duration,
}

impl DiscordSettings {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.into(),
            ready_retry: Duration::from_secs(5),
            request_timeout: Duration::from_secs(15),
            max_retry_after: Duration::from_secs(60),
        }
    }
}

#[derive(Deserialize)]
struct CurrentUser {
    #[serde(default)]
    username: String,
}

#[derive(Deserialize)]
struct Channel {
    id: String,
}

#[derive(Deserialize)]
struct RateLimited {
    #[serde(default)]
    retry_after: f64,
}

/// Wait before retrying a 429. Missing or nonsensical values wait one
/// second; everything is capped at `cap`, clamped before conversion.
fn retry_delay(retry_after: Option<f64>, cap: Duration) -> Duration {
    let fallback = Duration::from_secs(1).min(cap);
    match retry_after {
        Some(secs) if secs.is_finite() && secs > 0.0 => {
            Duration::try_from_secs_f64(secs.min(cap.as_secs_f64())).unwrap_or(cap)
        }
        _ => fallback,
    }
}

pub struct DiscordMessenger {
    settings: DiscordSettings,
    http: reqwest::Client,
    dm_channels: Mutex<HashMap<String, String>>,
}

impl DiscordMessenger {
    pub fn new(settings: DiscordSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| Error::External(format!("discord client build error: {e}")))?;
        Ok(Self {
            settings,
            http,
            dm_channels: Mutex::new(HashMap::new()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.settings.api_base.trim_end_matches('/'))
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.settings.token)
    }

    /// POSTs a JSON body, honoring a single 429 `retry_after`.
    async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<reqwest::Response> {
        let url = self.url(path);
        let mut retried = false;
        loop {
            let resp = self
                .http
                .post(&url)
                .header(reqwest::header::AUTHORIZATION, self.auth())
                .json(body)
                .send()
                .await
                .map_err(|e| Error::External(format!("discord request error: {e}")))?;

            let status = resp.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS && !retried {
                retried = true;
                let retry_after = resp.json::<RateLimited>().await.ok().map(|r| r.retry_after);
                let wait = retry_delay(retry_after, self.settings.max_retry_after);
                warn!(?wait, path, "discord rate limited; retrying once");
                tokio::time::sleep(wait).await;
                continue;
            }
            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(Error::Unauthorized(
                    "discord rejected the bot token".to_string(),
                ));
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::External(format!(
                    "discord request to {path} failed: {status} {}",
                    body.chars().take(200).collect::<String>()
                )));
            }
            return Ok(resp);
        }
    }

    async fn dm_channel(&self, recipient: &RecipientId) -> Result<String> {
        if let Some(id) = self.dm_channels.lock().await.get(&recipient.0) {
            return Ok(id.clone());
        }

        let channel: Channel = self
            .post_json("/users/@me/channels", &json!({ "recipient_id": recipient.0 }))
            .await?
            .json()
            .await
            .map_err(|e| Error::External(format!("discord channel json error: {e}")))?;
        debug!(recipient = %recipient, channel = %channel.id, "opened DM channel");

        self.dm_channels
            .lock()
            .await
            .insert(recipient.0.clone(), channel.id.clone());
        Ok(channel.id)
    }
}

#[async_trait]
impl MessagingPort for DiscordMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: MAX_MESSAGE_LEN,
        }
    }

    async fn wait_until_ready(&self) -> Result<()> {
        loop {
            let probe = self
                .http
                .get(self.url("/users/@me"))
                .header(reqwest::header::AUTHORIZATION, self.auth())
                .send()
                .await;

            match probe {
                Ok(resp) if resp.status() == reqwest::StatusCode::UNAUTHORIZED => {
                    return Err(Error::Unauthorized(
                        "discord rejected the bot token".to_string(),
                    ));
                }
                Ok(resp) if resp.status().is_success() => {
                    let me = resp.json::<CurrentUser>().await.ok();
                    info!(
                        "logged in to Discord as {}",
                        me.map(|m| m.username).unwrap_or_default()
                    );
                    return Ok(());
                }
                Ok(resp) => warn!(status = %resp.status(), "discord not ready yet"),
                Err(e) => warn!("discord not reachable yet: {e}"),
            }
            tokio::time::sleep(self.settings.ready_retry).await;
        }
    }

    async fn send_text(&self, recipient: &RecipientId, text: &str) -> Result<()> {
        let channel = self.dm_channel(recipient).await?;
        self.post_json(
            &format!("/channels/{channel}/messages"),
            &json!({ "content": text }),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_is_clamped() {
        let cap = Duration::from_secs(60);
        assert_eq!(retry_delay(Some(0.5), cap), Duration::from_millis(500));
        assert_eq!(retry_delay(Some(1e30), cap), cap);
        assert_eq!(retry_delay(Some(f64::INFINITY), cap), Duration::from_secs(1));
        assert_eq!(retry_delay(Some(-3.0), cap), Duration::from_secs(1));
        assert_eq!(retry_delay(None, cap), Duration::from_secs(1));
        assert_eq!(
            retry_delay(None, Duration::from_millis(20)),
            Duration::from_millis(20)
        );
    }

    #[test]
    fn url_joins_without_double_slash() {
        let m = DiscordMessenger::new(DiscordSettings {
            api_base: "http://localhost:1234/api/".to_string(),
            ..DiscordSettings::new("t")
        })
        .unwrap();
        assert_eq!(m.url("/users/@me"), "http://localhost:1234/api/users/@me");
        assert_eq!(m.auth(), "Bot t");
        assert_eq!(m.capabilities().max_message_len, 2000);
    }
}
